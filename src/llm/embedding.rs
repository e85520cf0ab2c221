//! 嵌入 API：供知识库向量化使用，调用 OpenAI 兼容的 /embeddings 端点
//!
//! 输入在送出前会被压平换行，并在超过 token 预算时截断到最大长度。

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::openai::{classify_error, openai_config};
use crate::llm::{with_retry, LlmError, RetryConfig};
use crate::memory::TokenEstimator;

/// 嵌入提供方：将文本编码为向量
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// 准备嵌入输入：换行替换为空格；估算 token 超出 max_tokens 时按字符截断
pub fn prepare_embedding_input(text: &str, max_tokens: usize) -> String {
    let flat = text.replace('\n', " ");
    if TokenEstimator::estimate(&flat) > max_tokens {
        flat.chars().take(max_tokens).collect()
    } else {
        flat
    }
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    max_input_tokens: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
        max_input_tokens: usize,
    ) -> Self {
        Self {
            client: Client::with_config(openai_config(base_url, api_key)),
            model: model.to_string(),
            max_input_tokens,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let input = prepare_embedding_input(text, self.max_input_tokens);
        if input.trim().is_empty() {
            return Ok(vec![]);
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(input))
            .build()
            .map_err(classify_error)?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(classify_error)?;
        Ok(response
            .data
            .first()
            .map(|e| e.embedding.clone())
            .unwrap_or_default())
    }
}

/// 为任意嵌入提供方加上退避重试（与 RetryingLlmClient 同一策略）
pub struct RetryingEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    config: RetryConfig,
}

impl RetryingEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl EmbeddingProvider for RetryingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        with_retry(&self.config, "embedding", || self.inner.embed(text)).await
    }
}
