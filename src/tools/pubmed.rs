//! PubMed 文献检索工具（NCBI E-utilities）
//!
//! 先 esearch（JSON）取 PMID 列表，再 efetch（XML）取文章详情；无 PMID 时返回空列表。

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::tools::{http_client, Tool, ToolKind, ToolOutput, ToolParams};

pub struct PubMedTool {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl PubMedTool {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn with_key(&self, mut query: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(key) = &self.api_key {
            query.push(("api_key", key.clone()));
        }
        query
    }

    async fn search_ids(
        &self,
        term: &str,
        retmax: u32,
        retstart: u32,
    ) -> Result<Vec<String>, String> {
        let query = self.with_key(vec![
            ("db", "pubmed".to_string()),
            ("term", term.to_string()),
            ("retmax", retmax.to_string()),
            ("retstart", retstart.to_string()),
            ("retmode", "json".to_string()),
        ]);
        let resp = self
            .client
            .get(format!("{}/esearch.fcgi", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(|e| format!("esearch request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("esearch HTTP {}", resp.status()));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| format!("Invalid JSON from esearch: {}", e))?;
        Ok(body["esearchresult"]["idlist"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl Tool for PubMedTool {
    fn kind(&self) -> ToolKind {
        ToolKind::PubMed
    }

    fn description(&self) -> &str {
        "Search PubMed and fetch article titles, abstracts, authors, journal and DOI. \
         Use for literature evidence about genes, variants and pathways."
    }

    async fn call(&self, params: &ToolParams) -> Result<ToolOutput, String> {
        let ToolParams::PubMed(p) = params else {
            return Err(format!("{} cannot handle {} parameters", self.kind(), params.kind()));
        };
        let ids = self.search_ids(&p.query_term, p.retmax, p.retstart).await?;
        if ids.is_empty() {
            return Ok(ToolOutput::Json(Value::Array(vec![])));
        }
        let query = self.with_key(vec![
            ("db", "pubmed".to_string()),
            ("id", ids.join(",")),
            ("retmode", "xml".to_string()),
        ]);
        let resp = self
            .client
            .get(format!("{}/efetch.fcgi", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(|e| format!("efetch request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("efetch HTTP {}", resp.status()));
        }
        let xml = resp
            .text()
            .await
            .map_err(|e| format!("Failed to read efetch body: {}", e))?;
        Ok(ToolOutput::Text(xml))
    }
}
