//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定跳过当前任务（SkipTask）还是终止循环（Abort）。

use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;

/// 研究循环中可能出现的错误（LLM、解析、工具、存储、会话状态等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    /// 任务带有形如工具标签的前缀，但没有对应的工具
    #[error("Unknown tool tag: {0}")]
    UnknownTool(String),

    #[error("Invalid parameters for {tool}: {reason}")]
    InvalidToolParams { tool: String, reason: String },

    #[error("Duplicate document id: {0}")]
    DuplicateDocument(String),

    #[error("Missing key '{key}' in JSON file at path '{}'", .path.display())]
    MissingStateKey { key: String, path: PathBuf },

    #[error("Corrupted session state at '{}': {reason}", .path.display())]
    CorruptedState { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 记录失败、跳过当前任务，继续下一个任务
    SkipTask(String),
    /// 把当前任务放回队首、持久化后终止循环
    Abort,
}
