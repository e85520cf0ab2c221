//! 综合查询：对整个知识库运行一组固定问题，渲染为 Markdown 形式的关键结论

use crate::core::KeyResult;
use crate::memory::{KnowledgeStore, QueryMode};

/// 固定的综合问题；最后一条为面向目标的问题
pub fn synthesis_queries(objective: &str) -> Vec<String> {
    vec![
        "Give a brief high level summary of all the data.".to_string(),
        "Briefly list all the main points that the data covers.".to_string(),
        "Generate several creative hypotheses given the data.".to_string(),
        "What are some high level research directions to explore further given the data?".to_string(),
        format!("Do your best to answer the objective: {objective} given the information."),
    ]
}

pub fn render_key_result(query: &str, answer: &str, citations: &str) -> KeyResult {
    KeyResult {
        heading: format!("## {query}\n\n"),
        body: format!("{answer}\n\n### Citations\n\n{citations}\n\n"),
    }
}

/// 运行全部综合问题；单个问题失败只记录警告。
/// 知识库不超过 exhaustive_max_docs 篇时，面向目标的问题使用全量遍历模式
pub async fn synthesize(
    store: &KnowledgeStore,
    objective: &str,
    top_k: usize,
    exhaustive_max_docs: usize,
) -> Vec<KeyResult> {
    if store.is_empty() {
        tracing::warn!("No tasks returned results, nothing to synthesize. Consider rewording the objective");
        return Vec::new();
    }

    let queries = synthesis_queries(objective);
    let last = queries.len() - 1;
    let mut results = Vec::new();
    for (i, query) in queries.iter().enumerate() {
        let mode = if i == last && store.len() <= exhaustive_max_docs {
            QueryMode::Exhaustive
        } else {
            QueryMode::TopK
        };
        tracing::info!(query = %query, ?mode, "Compiling key result");
        match store.query(query, top_k, mode).await {
            Ok(Some(response)) if !response.answer.is_empty() => {
                results.push(render_key_result(query, &response.answer, &response.citations));
            }
            Ok(_) => tracing::warn!(query = %query, "Key result query returned nothing"),
            Err(e) => tracing::warn!(query = %query, error = %e, "Key result query failed"),
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockEmbedder, MockLlmClient};
    use crate::processor::CITATION_KEY;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_empty_store_yields_nothing() {
        let llm = Arc::new(MockLlmClient::new());
        let store = KnowledgeStore::new(Arc::new(MockEmbedder::default()), llm.clone());
        assert!(synthesize(&store, "objective", 20, 10).await.is_empty());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_five_rendered_results() {
        let llm = Arc::new(MockLlmClient::new());
        let mut store = KnowledgeStore::new(Arc::new(MockEmbedder::default()), llm.clone());
        let metadata = BTreeMap::from([(CITATION_KEY.to_string(), "Pubmed ID: 9".to_string())]);
        store.insert("a", "BRCA1 repairs DNA", metadata, None).await.unwrap();
        store.insert("b", "TP53 apoptosis", BTreeMap::new(), None).await.unwrap();

        let results = synthesize(&store, "find BRCA1 partners", 20, 10).await;
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].heading, "## Give a brief high level summary of all the data.\n\n");
        assert!(results[0].body.contains("### Citations\n\nPubmed ID: 9"));
        assert!(results[4].heading.contains("find BRCA1 partners"));
        // 4 次树形汇总各 1 次调用 + 全量遍历 2 篇文档 2 次调用
        assert_eq!(llm.calls(), 6);
    }
}
