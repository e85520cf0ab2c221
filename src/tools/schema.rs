//! 工具参数：类型化的参数记录与 JSON Schema（schemars 自动生成）
//!
//! 任务生成器输出的是参数 JSON 而非可执行代码；这里按工具 schema 校验并绑定为 ToolParams，
//! 其 pretty JSON 即持久化到 api_call.txt 与调用缓存中的「调用代码」。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::ToolKind;

/// size / retmax 的上限
pub const MAX_PAGE_SIZE: u32 = 1000;

fn default_size() -> u32 {
    10
}

fn default_retmax() -> u32 {
    5
}

/// mygene.info 基因查询参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MyGeneParams {
    /// 查询语句，如 `BRCA1`、`symbol:TP53`、`pathway.kegg.name:"DNA repair"`
    pub query_term: String,
    /// 返回的基因条数
    #[serde(default = "default_size")]
    pub size: u32,
    /// 分页起点
    #[serde(default, rename = "from")]
    pub from: u32,
}

/// myvariant.info 变异查询参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MyVariantParams {
    /// 查询语句，如 `rs80357906`、`dbnsfp.genename:BRCA1`
    pub query_term: String,
}

/// PubMed E-utilities 文献检索参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PubMedParams {
    /// PubMed 检索式
    pub query_term: String,
    /// 返回的文章数
    #[serde(default = "default_retmax")]
    pub retmax: u32,
    /// 分页起点
    #[serde(default)]
    pub retstart: u32,
}

/// 已校验的工具参数
#[derive(Debug, Clone, PartialEq)]
pub enum ToolParams {
    MyGene(MyGeneParams),
    MyVariant(MyVariantParams),
    PubMed(PubMedParams),
}

impl ToolParams {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolParams::MyGene(_) => ToolKind::MyGene,
            ToolParams::MyVariant(_) => ToolKind::MyVariant,
            ToolParams::PubMed(_) => ToolKind::PubMed,
        }
    }

    /// 按 kind 的 schema 绑定生成器输出，并做取值校验
    pub fn parse(kind: ToolKind, value: Value) -> Result<Self, AgentError> {
        let invalid = |reason: String| AgentError::InvalidToolParams {
            tool: kind.tag().to_string(),
            reason,
        };
        let params = match kind {
            ToolKind::MyGene => ToolParams::MyGene(
                serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?,
            ),
            ToolKind::MyVariant => ToolParams::MyVariant(
                serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?,
            ),
            ToolKind::PubMed => ToolParams::PubMed(
                serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?,
            ),
        };
        params.validate().map_err(invalid)?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), String> {
        if self.query_term().trim().is_empty() {
            return Err("query_term must not be empty".to_string());
        }
        let page = match self {
            ToolParams::MyGene(p) => Some(("size", p.size)),
            ToolParams::PubMed(p) => Some(("retmax", p.retmax)),
            ToolParams::MyVariant(_) => None,
        };
        if let Some((name, n)) = page {
            if n == 0 || n > MAX_PAGE_SIZE {
                return Err(format!("{name} must be between 1 and {MAX_PAGE_SIZE}, got {n}"));
            }
        }
        Ok(())
    }

    pub fn query_term(&self) -> &str {
        match self {
            ToolParams::MyGene(p) => &p.query_term,
            ToolParams::MyVariant(p) => &p.query_term,
            ToolParams::PubMed(p) => &p.query_term,
        }
    }

    pub fn to_value(&self) -> Value {
        let value = match self {
            ToolParams::MyGene(p) => serde_json::to_value(p),
            ToolParams::MyVariant(p) => serde_json::to_value(p),
            ToolParams::PubMed(p) => serde_json::to_value(p),
        };
        value.unwrap_or(Value::Null)
    }

    /// 参数的文本形式（api_call.txt / 调用缓存）
    pub fn to_call_text(&self) -> String {
        serde_json::to_string_pretty(&self.to_value()).unwrap_or_default()
    }
}

/// 返回某个工具参数记录的 JSON Schema
pub fn parameters_schema(kind: ToolKind) -> Value {
    let schema = match kind {
        ToolKind::MyGene => schema_for!(MyGeneParams),
        ToolKind::MyVariant => schema_for!(MyVariantParams),
        ToolKind::PubMed => schema_for!(PubMedParams),
    };
    serde_json::to_value(&schema).unwrap_or(Value::Null)
}
