//! 结果处理：把三类工具原始输出统一成 (正文, 引用元数据) 列表
//!
//! process() 永不失败：无法识别的输出原样作为单个文档返回，并记录引用缺失的警告。

pub mod gene;
pub mod literature;
pub mod variant;
pub mod xml;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::tools::{ToolKind, ToolOutput};

/// 引用数据的元数据键；不参与嵌入，也不进入 LLM 上下文
pub const CITATION_KEY: &str = "citation_data";

/// 一条规范化后的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedResult {
    pub text: String,
    pub citation_data: String,
}

impl ProcessedResult {
    pub fn new(text: impl Into<String>, citation_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citation_data: citation_data.into(),
        }
    }

    pub fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(CITATION_KEY.to_string(), self.citation_data.clone())])
    }
}

/// 按工具类型处理原始输出
pub fn process(kind: ToolKind, output: &ToolOutput) -> Vec<ProcessedResult> {
    let processed = match (kind, output) {
        (ToolKind::MyGene, ToolOutput::Json(v)) => gene::process(v),
        (ToolKind::MyVariant, ToolOutput::Json(v)) => variant::process(v),
        (ToolKind::PubMed, ToolOutput::Text(xml)) => literature::process(xml),
        _ => None,
    };
    processed.unwrap_or_else(|| {
        tracing::warn!(
            tool = %kind,
            "Unrecognised tool output, storing raw payload without citations"
        );
        vec![raw(output)]
    })
}

/// 原样透传
pub(crate) fn raw(output: &ToolOutput) -> ProcessedResult {
    let text = match output {
        ToolOutput::Json(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
        ToolOutput::Text(s) => s.clone(),
    };
    ProcessedResult::new(text, String::new())
}

/// 单条记录与记录列表统一为列表
pub(crate) fn as_records(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// 标量转显示文本；null、空串与非标量返回 None
pub(crate) fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mismatched_output_falls_back_to_raw() {
        let out = process(ToolKind::PubMed, &ToolOutput::Json(json!([{"x": 1}])));
        assert_eq!(out.len(), 1);
        assert!(out[0].text.contains("\"x\": 1"));
        assert!(out[0].citation_data.is_empty());
    }

    #[test]
    fn test_metadata_uses_citation_key() {
        let r = ProcessedResult::new("body", "Pubmed ID: 1");
        assert_eq!(r.metadata().get(CITATION_KEY).map(String::as_str), Some("Pubmed ID: 1"));
    }
}
