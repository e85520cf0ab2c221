//! mygene.info 基因查询工具
//!
//! GET {base}/query?q=..&size=..&from=..&fields=..，返回 hits 数组（每个元素为一条基因记录）。

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::tools::{http_client, Tool, ToolKind, ToolOutput, ToolParams};

/// 后处理需要的字段（摘要、RefSeq、GeneRIF、通路等）
const GENE_FIELDS: &str =
    "name,symbol,taxid,type_of_gene,genomic_pos_hg19,refseq,summary,generif,pathway";

pub struct MyGeneTool {
    client: Client,
    base_url: String,
}

impl MyGeneTool {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Tool for MyGeneTool {
    fn kind(&self) -> ToolKind {
        ToolKind::MyGene
    }

    fn description(&self) -> &str {
        "Query mygene.info for gene annotations (name, symbol, RefSeq, summary, GeneRIF notes, pathways). \
         Use for questions about what a gene does or which pathways it belongs to."
    }

    async fn call(&self, params: &ToolParams) -> Result<ToolOutput, String> {
        let ToolParams::MyGene(p) = params else {
            return Err(format!("{} cannot handle {} parameters", self.kind(), params.kind()));
        };
        let resp = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(&[
                ("q", p.query_term.clone()),
                ("size", p.size.to_string()),
                ("from", p.from.to_string()),
                ("fields", GENE_FIELDS.to_string()),
            ])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| format!("Invalid JSON from mygene.info: {}", e))?;
        Ok(ToolOutput::Json(
            body.get("hits").cloned().unwrap_or(Value::Array(vec![])),
        ))
    }
}
