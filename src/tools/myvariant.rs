//! myvariant.info 变异查询工具

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::tools::{http_client, Tool, ToolKind, ToolOutput, ToolParams};

const VARIANT_FIELDS: &str = "_id,cadd.gene.genename,cadd.consequence,cadd.phred,dbsnp.rsid";

pub struct MyVariantTool {
    client: Client,
    base_url: String,
}

impl MyVariantTool {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Tool for MyVariantTool {
    fn kind(&self) -> ToolKind {
        ToolKind::MyVariant
    }

    fn description(&self) -> &str {
        "Query myvariant.info for variant annotations (affected gene, consequence, CADD score, dbSNP rsID)."
    }

    async fn call(&self, params: &ToolParams) -> Result<ToolOutput, String> {
        let ToolParams::MyVariant(p) = params else {
            return Err(format!("{} cannot handle {} parameters", self.kind(), params.kind()));
        };
        let resp = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(&[("q", p.query_term.as_str()), ("fields", VARIANT_FIELDS)])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| format!("Invalid JSON from myvariant.info: {}", e))?;
        Ok(ToolOutput::Json(
            body.get("hits").cloned().unwrap_or(Value::Array(vec![])),
        ))
    }
}
