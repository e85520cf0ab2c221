//! 记忆层：知识库（向量检索 + 问答）、会话持久化、token 估算

pub mod persistence;
pub mod rag;
pub mod token_budget;

pub use persistence::{sanitize_dir_name, task_dir_name, SessionPersistence};
pub use rag::{Document, KnowledgeStore, QueryMode, QueryResponse};
pub use token_budget::TokenEstimator;
