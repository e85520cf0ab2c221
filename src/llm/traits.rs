//! LLM 客户端抽象与重试策略
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient::complete；
//! RetryingLlmClient 在限流、超时、连接失败、服务不可用时做指数退避重试（延迟有上限），其余错误立即返回。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::Message;

/// LLM / 嵌入服务调用错误；前四类为瞬时错误，可重试
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Rate limited (retry after {retry_after_ms}ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl LlmError {
    /// 是否属于需要退避重试的瞬时错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::Timeout
                | LlmError::Connection(_)
                | LlmError::ServiceUnavailable(_)
        )
    }
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首条回复内容
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;
}

/// 指数退避配置：第 n 次重试等待 initial_delay * multiplier^n，封顶 max_delay
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// 最多重试次数（不含首次调用）
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(50),
            multiplier: 2.0,
            max_retries: 8,
        }
    }
}

impl RetryConfig {
    /// 计算第 attempt 次重试前的等待时长
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

/// 以退避策略执行 op；仅对 is_retryable 的错误重试，重试耗尽后返回最后一次错误
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut op: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let mut delay = config.delay_for(attempt);
                if let LlmError::RateLimited { retry_after_ms } = &e {
                    delay = delay.max(Duration::from_millis(*retry_after_ms)).min(config.max_delay);
                }
                tracing::warn!(
                    call = label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient provider failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// 为任意 LlmClient 加上退避重试
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        with_retry(&self.config, "chat_completion", || self.inner.complete(messages)).await
    }
}
