//! LLM 层：客户端抽象、重试策略与实现（OpenAI 兼容 / Mock），以及嵌入提供方

pub mod embedding;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

pub use embedding::{prepare_embedding_input, EmbeddingProvider, OpenAiEmbedder, RetryingEmbedder};
pub use message::{Message, Role};
pub use mock::{MockEmbedder, MockLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{with_retry, LlmClient, LlmError, RetryConfig, RetryingLlmClient};
