//! 核心层：错误与恢复、任务路由、会话状态，以及研究循环的构建器

pub mod builder;
pub mod error;
pub mod recovery;
pub mod state;
pub mod task;

pub use builder::{create_research_builder, ResearchBuilder};
pub use error::{AgentError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use state::{
    CallAnnotation, DocStore, DocStoreEntry, KeyResult, LoopPhase, ResultRecord, SessionState,
    ToolCache, DATETIME_FORMAT, REQUIRED_STATE_KEYS,
};
pub use task::{Task, TaskOrigin, TaskRoute};
