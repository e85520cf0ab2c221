//! 任务：队列中的一条工作项，可带工具标签（如 `MYGENE: ...`）
//!
//! 标签解析只在这里做一次，循环拿到的是封闭的 TaskRoute，不再做字符串匹配。

use crate::core::AgentError;
use crate::tools::ToolKind;

/// 任务来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOrigin {
    /// 由任务生成器产生（或启动时给定）
    Generated,
    /// 用户在交互模式下手写
    User,
}

/// 任务执行路线
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRoute {
    Tool(ToolKind),
    /// 自由推理：不调用工具，直接基于知识库 / LLM 作答
    Reasoning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub text: String,
    pub origin: TaskOrigin,
}

impl Task {
    pub fn generated(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: TaskOrigin::Generated,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: TaskOrigin::User,
        }
    }

    /// 决定执行路线；形如工具标签但无对应工具时返回 UnknownTool
    pub fn route(&self) -> Result<TaskRoute, AgentError> {
        if self.origin == TaskOrigin::User {
            return Ok(TaskRoute::Reasoning);
        }
        match tool_tag(&self.text) {
            None => Ok(TaskRoute::Reasoning),
            Some(tag) => ToolKind::from_tag(tag)
                .map(TaskRoute::Tool)
                .ok_or_else(|| AgentError::UnknownTool(tag.to_string())),
        }
    }

    /// 标签之后的描述部分（无标签时为全文）
    pub fn body(&self) -> &str {
        match tool_tag(&self.text) {
            Some(_) => self
                .text
                .split_once(':')
                .map(|(_, rest)| rest.trim())
                .unwrap_or(self.text.as_str()),
            None => self.text.trim(),
        }
    }
}

/// 取第一个冒号前的全大写前缀作为工具标签
fn tool_tag(text: &str) -> Option<&str> {
    let (head, _) = text.split_once(':')?;
    let head = head.trim();
    let looks_like_tag = !head.is_empty()
        && head
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        && head.chars().any(|c| c.is_ascii_uppercase());
    looks_like_tag.then_some(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_routes() {
        let task = Task::generated("MYGENE: query_term='BRCA1'");
        assert_eq!(task.route().unwrap(), TaskRoute::Tool(ToolKind::MyGene));
        assert_eq!(task.body(), "query_term='BRCA1'");

        let task = Task::generated("PUBMED: BRCA1 homologous recombination reviews");
        assert_eq!(task.route().unwrap(), TaskRoute::Tool(ToolKind::PubMed));

        let task = Task::generated("MYVARIANT: rs80357906");
        assert_eq!(task.route().unwrap(), TaskRoute::Tool(ToolKind::MyVariant));
    }

    #[test]
    fn test_untagged_is_reasoning() {
        let task = Task::generated("Compare the pathways found so far");
        assert_eq!(task.route().unwrap(), TaskRoute::Reasoning);
        let task = Task::generated("Summary: what do we know about PALB2?");
        assert_eq!(task.route().unwrap(), TaskRoute::Reasoning);
        let task = Task::generated(": empty tag");
        assert_eq!(task.route().unwrap(), TaskRoute::Reasoning);
    }

    #[test]
    fn test_user_task_is_reasoning_even_if_tagged() {
        let task = Task::user("MYGENE: TP53");
        assert_eq!(task.route().unwrap(), TaskRoute::Reasoning);
    }

    #[test]
    fn test_unknown_tag_fails_loudly() {
        let task = Task::generated("CLINVAR: BRCA2 variants");
        match task.route() {
            Err(AgentError::UnknownTool(tag)) => assert_eq!(tag, "CLINVAR"),
            other => panic!("Expected UnknownTool, got {other:?}"),
        }
    }
}
