//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供研究循环决定是跳过当前任务还是终止。
//! 工具、参数、解析类错误只影响单个任务；重试耗尽的瞬时错误与存储/状态错误会终止循环。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::ToolExecutionFailed(msg) => {
                RecoveryAction::SkipTask(format!("tool call did not run successfully: {msg}"))
            }
            AgentError::UnknownTool(tag) => {
                RecoveryAction::SkipTask(format!("no tool registered for tag '{tag}'"))
            }
            AgentError::InvalidToolParams { tool, reason } => {
                RecoveryAction::SkipTask(format!("invalid {tool} parameters: {reason}"))
            }
            AgentError::JsonParseError(raw) => {
                RecoveryAction::SkipTask(format!("could not parse generator output: {raw}"))
            }
            AgentError::LlmError(e) if !e.is_retryable() => {
                RecoveryAction::SkipTask(format!("language model rejected the request: {e}"))
            }
            _ => RecoveryAction::Abort,
        }
    }
}
