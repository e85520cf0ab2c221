//! 研究层：任务生成、任务选择、综合查询与主循环

pub mod events;
pub mod loop_;
pub mod planner;
pub mod selector;
pub mod synthesis;

pub use events::ResearchEvent;
pub use loop_::{LoopOutcome, LoopSettings, StopReason, TaskLoop};
pub use planner::{extract_json, LlmTaskGenerator, TaskContext, TaskGenerator};
pub use selector::{
    drain_events, FifoSelector, FlushingSelector, InteractiveSelector, SharedEvents, TaskSelector,
};
pub use synthesis::{render_key_result, synthesis_queries, synthesize};
