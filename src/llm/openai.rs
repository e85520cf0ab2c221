//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；
//! 调用失败时把 OpenAIError 归类为 LlmError，供重试策略判断是否为瞬时错误。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message, Role};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// 构造 async_openai 配置：api_key 由调用方（配置层）解析后传入
pub(crate) fn openai_config(base_url: Option<&str>, api_key: &str) -> OpenAIConfig {
    match base_url {
        Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
        None => OpenAIConfig::new().with_api_key(api_key),
    }
}

/// 把 async_openai 的错误映射为 LlmError（限流 / 超时 / 连接 / 服务不可用 / 其它）
pub(crate) fn classify_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) => {
            if e.is_timeout() {
                LlmError::Timeout
            } else if e.is_connect() {
                LlmError::Connection(e.to_string())
            } else if let Some(status) = e.status() {
                classify_status(status.as_u16(), e.to_string())
            } else {
                LlmError::Connection(e.to_string())
            }
        }
        OpenAIError::ApiError(api) => {
            let kind = api
                .r#type
                .clone()
                .or_else(|| api.code.clone())
                .unwrap_or_default()
                .to_lowercase();
            let message = api.message.clone();
            let lower = message.to_lowercase();
            if kind.contains("rate_limit") || lower.contains("rate limit") {
                LlmError::RateLimited { retry_after_ms: 0 }
            } else if kind.contains("server_error")
                || kind.contains("unavailable")
                || lower.contains("overloaded")
                || lower.contains("unavailable")
            {
                LlmError::ServiceUnavailable(message)
            } else if kind.contains("invalid_request") {
                LlmError::InvalidRequest(message)
            } else {
                LlmError::Api(message)
            }
        }
        OpenAIError::InvalidArgument(msg) => LlmError::InvalidRequest(msg),
        other => LlmError::Api(other.to_string()),
    }
}

fn classify_status(status: u16, detail: String) -> LlmError {
    match status {
        429 => LlmError::RateLimited { retry_after_ms: 0 },
        408 | 504 => LlmError::Timeout,
        500..=599 => LlmError::ServiceUnavailable(detail),
        400..=499 => LlmError::InvalidRequest(detail),
        _ => LlmError::Api(detail),
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名，complete 时转 Message 为 API 格式并取首条 content
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    timeout: Option<std::time::Duration>,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        Self {
            client: Client::with_config(openai_config(base_url, api_key)),
            model: model.to_string(),
            temperature: 0.0,
            timeout: None,
            usage: TokenUsage::new(),
        }
    }

    /// 单次请求超时；超时记为 LlmError::Timeout，可被重试
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| std::time::Duration::from_secs(secs));
        self
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        messages
            .iter()
            .map(|m| {
                let msg = match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::Assistant),
                };
                msg.map_err(classify_error)
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(self.to_openai_messages(messages)?)
            .build()
            .map_err(classify_error)?;

        let chat = self.client.chat();
        let call = chat.create(request);
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| LlmError::Timeout)?,
            None => call.await,
        }
        .map_err(classify_error)?;

        if let Some(usage) = &response.usage {
            self.usage.add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
            let (prompt, completion, total) = self.usage.get();
            tracing::debug!(prompt, completion, total, "Cumulative token usage");
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            classify_status(429, String::new()),
            LlmError::RateLimited { retry_after_ms: 0 }
        );
        assert_eq!(classify_status(504, String::new()), LlmError::Timeout);
        assert!(matches!(classify_status(503, "x".into()), LlmError::ServiceUnavailable(_)));
        assert!(matches!(classify_status(400, "x".into()), LlmError::InvalidRequest(_)));
    }

    #[test]
    fn test_invalid_argument_is_not_retryable() {
        let err = classify_error(OpenAIError::InvalidArgument("missing model".into()));
        assert!(!err.is_retryable());
    }
}
