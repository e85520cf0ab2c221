//! 工具注册表
//!
//! 三个数据源工具实现 Tool trait（kind / description / call），由 ToolRegistry 按 ToolKind 注册与查找，
//! ToolDispatcher 在调用时加超时并把结果归类为 Results / Empty / Failed。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{parameters_schema, ToolParams};

/// 封闭的工具集合；任务前缀标签与之一一对应
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolKind {
    MyGene,
    MyVariant,
    PubMed,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [ToolKind::MyGene, ToolKind::MyVariant, ToolKind::PubMed];

    /// 任务前缀与缓存键
    pub fn tag(&self) -> &'static str {
        match self {
            ToolKind::MyGene => "MYGENE",
            ToolKind::MyVariant => "MYVARIANT",
            ToolKind::PubMed => "PUBMED",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// 工具原始输出：JSON（mygene / myvariant）或文本（PubMed XML）
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Json(Value),
    Text(String),
}

impl ToolOutput {
    /// 去掉列表中的空项；判断是否为「成功但无结果」
    pub fn normalized(self) -> Self {
        match self {
            ToolOutput::Json(Value::Array(items)) => ToolOutput::Json(Value::Array(
                items.into_iter().filter(|v| !is_empty_value(v)).collect(),
            )),
            other => other,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ToolOutput::Json(v) => is_empty_value(v),
            ToolOutput::Text(s) => s.trim().is_empty(),
        }
    }
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// 工具 trait：类型、描述（供 LLM 理解）、参数 schema、异步调用
#[async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（供 LLM 生成正确的参数格式）
    fn parameters_schema(&self) -> Value {
        parameters_schema(self.kind())
    }

    /// 执行调用；params 已通过校验且与 kind 一致
    async fn call(&self, params: &ToolParams) -> Result<ToolOutput, String>;
}

/// 工具注册表：ToolKind -> Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<ToolKind, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.kind(), Arc::new(tool));
    }

    pub async fn execute(&self, params: &ToolParams) -> Result<ToolOutput, String> {
        let kind = params.kind();
        let tool = self
            .tools
            .get(&kind)
            .ok_or_else(|| format!("No wrapper registered for {kind}"))?;
        tool.call(params).await
    }

    pub fn kinds(&self) -> Vec<ToolKind> {
        let mut kinds: Vec<ToolKind> = self.tools.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// 单个工具的说明段落（描述 + 参数 schema），拼入参数生成提示词
    pub fn describe(&self, kind: ToolKind) -> Option<String> {
        self.tools.get(&kind).map(|tool| {
            let schema = serde_json::to_string_pretty(&tool.parameters_schema())
                .unwrap_or_else(|_| "{}".to_string());
            format!(
                "Tool {}: {}\nParameters JSON Schema:\n```json\n{}\n```",
                kind.tag(),
                tool.description(),
                schema
            )
        })
    }

    /// 返回 (tag, description) 列表，用于任务生成提示词中的 Available tools 段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.kinds()
            .into_iter()
            .filter_map(|k| {
                self.tools
                    .get(&k)
                    .map(|t| (k.tag().to_string(), t.description().to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tag_round_trip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ToolKind::from_tag("mygene"), None);
    }

    #[test]
    fn test_normalized_drops_empty_items() {
        let out = ToolOutput::Json(json!([null, {}, {"symbol": "BRCA1"}])).normalized();
        assert_eq!(out, ToolOutput::Json(json!([{"symbol": "BRCA1"}])));
        assert!(!out.is_empty());
        assert!(ToolOutput::Json(json!([null, []])).normalized().is_empty());
        assert!(ToolOutput::Text("  ".to_string()).is_empty());
    }
}
