//! 知识库：向量存储 + 检索增强问答
//!
//! 文档插入时计算嵌入（元数据中的排除键不参与嵌入，也不进入 LLM 上下文），按 id 唯一存储。
//! 查询有两种模式：
//! - TopK：余弦相似度取前 k 篇，树形汇总（按 token 预算分组作答，再逐层合并答案）
//! - Exhaustive：按插入顺序遍历全部文档，逐篇精炼答案（仅用于小语料）
//!
//! 库为空时查询直接返回 None，不调用嵌入或 LLM 服务。

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::{prepare_embedding_input, EmbeddingProvider, LlmClient, Message};
use crate::memory::TokenEstimator;
use crate::processor::CITATION_KEY;

/// 快照文件名（位于 index 目录下）
pub const DOCSTORE_FILE: &str = "docstore.json";

const SYSTEM_PROMPT: &str = "You are a biomedical research assistant. Answer only from the provided context. Be terse and factual.";

/// 已入库文档；插入后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// 相似度检索 + 树形汇总
    #[default]
    TopK,
    /// 全量顺序遍历 + 逐篇精炼
    Exhaustive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub answer: String,
    /// 参与作答文档的引用数据，去重后以空行连接
    pub citations: String,
    pub source_ids: Vec<String>,
}

pub struct KnowledgeStore {
    documents: Vec<Document>,
    ids: HashSet<String>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmClient>,
    excluded_metadata_keys: Vec<String>,
    max_embedding_tokens: usize,
    context_token_budget: usize,
}

impl KnowledgeStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            documents: Vec::new(),
            ids: HashSet::new(),
            embedder,
            llm,
            excluded_metadata_keys: vec![CITATION_KEY.to_string()],
            max_embedding_tokens: 8191,
            context_token_budget: 6000,
        }
    }

    pub fn with_max_embedding_tokens(mut self, tokens: usize) -> Self {
        self.max_embedding_tokens = tokens.max(1);
        self
    }

    /// 单次汇总调用的上下文预算；过小的值会被抬到 64
    pub fn with_context_token_budget(mut self, tokens: usize) -> Self {
        self.context_token_budget = tokens.max(64);
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// 未被排除的元数据，渲染为 `key: value` 行
    fn visible_metadata(&self, metadata: &BTreeMap<String, String>) -> String {
        metadata
            .iter()
            .filter(|(k, _)| !self.excluded_metadata_keys.contains(k))
            .map(|(k, v)| format!("{k}: {v}\n"))
            .collect()
    }

    fn render(&self, text: &str, metadata: &BTreeMap<String, String>) -> String {
        let visible = self.visible_metadata(metadata);
        if visible.is_empty() {
            text.to_string()
        } else {
            format!("{visible}\n{text}")
        }
    }

    /// 计算文档嵌入；输入为可见元数据 + 正文，超出预算时截断
    pub async fn embed(
        &self,
        text: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Vec<f32>, AgentError> {
        let rendered = self.render(text, metadata);
        let input = prepare_embedding_input(&rendered, self.max_embedding_tokens);
        Ok(self.embedder.embed(&input).await?)
    }

    /// 插入文档，返回实际使用的嵌入；id 重复时报错
    pub async fn insert(
        &mut self,
        id: impl Into<String>,
        text: impl Into<String>,
        metadata: BTreeMap<String, String>,
        embedding: Option<Vec<f32>>,
    ) -> Result<Vec<f32>, AgentError> {
        let id = id.into();
        if self.ids.contains(&id) {
            return Err(AgentError::DuplicateDocument(id));
        }
        let text = text.into();
        let embedding = match embedding {
            Some(e) if !e.is_empty() => e,
            _ => self.embed(&text, &metadata).await?,
        };
        if embedding.is_empty() {
            return Err(AgentError::LlmError(crate::llm::LlmError::Api(format!(
                "empty embedding for document {id}"
            ))));
        }
        self.ids.insert(id.clone());
        self.documents.push(Document {
            id,
            text,
            metadata,
            embedding: embedding.clone(),
        });
        Ok(embedding)
    }

    /// 从快照恢复文档（不重新计算嵌入）
    pub fn restore(&mut self, documents: Vec<Document>) -> Result<(), AgentError> {
        for doc in documents {
            if !self.ids.insert(doc.id.clone()) {
                return Err(AgentError::DuplicateDocument(doc.id));
            }
            self.documents.push(doc);
        }
        Ok(())
    }

    pub async fn query(
        &self,
        question: &str,
        top_k: usize,
        mode: QueryMode,
    ) -> Result<Option<QueryResponse>, AgentError> {
        if self.is_empty() {
            tracing::warn!("Knowledge base is empty, skipping query");
            return Ok(None);
        }

        let sources: Vec<&Document> = match mode {
            QueryMode::TopK => self.retrieve(question, top_k).await?,
            QueryMode::Exhaustive => self.documents.iter().collect(),
        };
        let answer = match mode {
            QueryMode::TopK => {
                let contexts = sources.iter().map(|d| self.render(&d.text, &d.metadata)).collect();
                self.tree_summarize(question, contexts).await?
            }
            QueryMode::Exhaustive => self.refine(question, &sources).await?,
        };

        Ok(Some(QueryResponse {
            answer,
            citations: collect_citations(&sources),
            source_ids: sources.iter().map(|d| d.id.clone()).collect(),
        }))
    }

    async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<&Document>, AgentError> {
        let query_embedding = self
            .embedder
            .embed(&prepare_embedding_input(question, self.max_embedding_tokens))
            .await?;

        let mut scored: Vec<(f32, &Document)> = self
            .documents
            .iter()
            .map(|d| (cosine_similarity(&query_embedding, &d.embedding), d))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored.into_iter().take(top_k.max(1)).map(|(_, d)| d).collect())
    }

    async fn ask(&self, prompt: String) -> Result<String, AgentError> {
        let messages = [Message::system(SYSTEM_PROMPT), Message::user(prompt)];
        Ok(self.llm.complete(&messages).await?.trim().to_string())
    }

    /// 树形汇总：每段上下文不超过预算的一半，因此每组至少容纳两段，层数必然收敛
    async fn tree_summarize(
        &self,
        question: &str,
        contexts: Vec<String>,
    ) -> Result<String, AgentError> {
        let item_budget = self.context_token_budget / 2;
        let mut level: Vec<String> = contexts
            .iter()
            .map(|c| TokenEstimator::truncate(c, item_budget).to_string())
            .collect();

        loop {
            let groups = pack_groups(&level, self.context_token_budget);
            let mut answers = Vec::with_capacity(groups.len());
            for group in groups {
                answers.push(self.ask(qa_prompt(question, &group.join("\n\n"))).await?);
            }
            if answers.len() <= 1 {
                return Ok(answers.pop().unwrap_or_default());
            }
            tracing::debug!(answers = answers.len(), "Combining intermediate answers");
            level = answers
                .iter()
                .map(|a| TokenEstimator::truncate(a, item_budget).to_string())
                .collect();
        }
    }

    async fn refine(&self, question: &str, sources: &[&Document]) -> Result<String, AgentError> {
        let mut answer: Option<String> = None;
        for doc in sources {
            let context = self.render(&doc.text, &doc.metadata);
            let context = TokenEstimator::truncate(&context, self.context_token_budget / 2);
            let prompt = match &answer {
                None => qa_prompt(question, context),
                Some(existing) => refine_prompt(question, existing, context),
            };
            answer = Some(self.ask(prompt).await?);
        }
        Ok(answer.unwrap_or_default())
    }

    /// 写出快照 `<index_dir>/docstore.json`
    pub fn persist(&self, index_dir: &Path) -> Result<(), AgentError> {
        std::fs::create_dir_all(index_dir)?;
        let data = serde_json::to_string(&self.documents)
            .map_err(|e| AgentError::JsonParseError(e.to_string()))?;
        std::fs::write(index_dir.join(DOCSTORE_FILE), data)?;
        Ok(())
    }

    /// 读取快照；文件不存在时返回空列表
    pub fn load_documents(index_dir: &Path) -> Result<Vec<Document>, AgentError> {
        let path = index_dir.join(DOCSTORE_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&path)?;
        serde_json::from_str(&data).map_err(|e| AgentError::CorruptedState {
            path,
            reason: e.to_string(),
        })
    }
}

fn qa_prompt(question: &str, context: &str) -> String {
    format!(
        "Context information is below.\n---------------------\n{context}\n---------------------\n\
         Given the context information and not prior knowledge, answer the question: {question}\n"
    )
}

fn refine_prompt(question: &str, existing: &str, context: &str) -> String {
    format!(
        "The original question is as follows: {question}\n\
         We have provided an existing answer: {existing}\n\
         We have the opportunity to refine the existing answer (only if needed) with some more context below.\n\
         ------------\n{context}\n------------\n\
         Given the new context, refine the original answer to better answer the question. \
         If the context isn't useful, return the original answer."
    )
}

/// 按预算贪心分组；每组至少一段
fn pack_groups(items: &[String], budget: usize) -> Vec<Vec<&str>> {
    let mut groups: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut used = 0;
    for item in items {
        let cost = TokenEstimator::estimate(item);
        if !current.is_empty() && used + cost > budget {
            groups.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(item);
        used += cost;
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn collect_citations(sources: &[&Document]) -> String {
    let mut seen = HashSet::new();
    sources
        .iter()
        .filter_map(|d| d.metadata.get(CITATION_KEY))
        .map(|c| c.trim())
        .filter(|c| !c.is_empty() && seen.insert(c.to_string()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 余弦相似度
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockEmbedder, MockLlmClient};

    fn store() -> (KnowledgeStore, Arc<MockEmbedder>, Arc<MockLlmClient>) {
        let embedder = Arc::new(MockEmbedder::default());
        let llm = Arc::new(MockLlmClient::new());
        let store = KnowledgeStore::new(embedder.clone(), llm.clone());
        (store, embedder, llm)
    }

    fn cited(citation: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(CITATION_KEY.to_string(), citation.to_string())])
    }

    #[tokio::test]
    async fn test_empty_store_returns_none_without_service_calls() {
        let (store, embedder, llm) = store();
        let res = store.query("anything", 5, QueryMode::TopK).await.unwrap();
        assert!(res.is_none());
        let res = store.query("anything", 5, QueryMode::Exhaustive).await.unwrap();
        assert!(res.is_none());
        assert_eq!(embedder.calls(), 0);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let (mut store, _, _) = store();
        store.insert("doc_id_0_1_0", "BRCA1", BTreeMap::new(), None).await.unwrap();
        let err = store
            .insert("doc_id_0_1_0", "BRCA2", BTreeMap::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::DuplicateDocument(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_citation_excluded_from_embedding_and_context() {
        let (mut store, _, _) = store();
        let metadata = BTreeMap::from([
            (CITATION_KEY.to_string(), "Pubmed ID: 42".to_string()),
            ("source".to_string(), "mygene".to_string()),
        ]);
        let with = store.embed("BRCA1 repair", &metadata).await.unwrap();
        let plain = store
            .embed("BRCA1 repair", &BTreeMap::from([("source".to_string(), "mygene".to_string())]))
            .await
            .unwrap();
        assert_eq!(with, plain);
        assert_eq!(store.render("body", &metadata), "source: mygene\n\nbody");

        store.insert("a", "body", metadata, None).await.unwrap();
        assert_eq!(store.documents()[0].metadata.len(), 2);
    }

    #[tokio::test]
    async fn test_supplied_embedding_is_kept() {
        let (mut store, embedder, _) = store();
        let used = store
            .insert("a", "text", BTreeMap::new(), Some(vec![1.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(used, vec![1.0, 0.0]);
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_query_collects_deduplicated_citations() {
        let (mut store, _, llm) = store();
        store.insert("a", "BRCA1 DNA repair", cited("Pubmed ID: 1"), None).await.unwrap();
        store
            .insert("b", "BRCA1 homologous recombination", cited("Pubmed ID: 1"), None)
            .await
            .unwrap();
        store.insert("c", "TP53 apoptosis", cited("Pubmed ID: 2"), None).await.unwrap();
        store.insert("d", "no citation", cited(""), None).await.unwrap();

        let res = store
            .query("What does BRCA1 do?", 10, QueryMode::TopK)
            .await
            .unwrap()
            .unwrap();
        assert!(res.answer.starts_with("Mock answer"));
        assert_eq!(res.source_ids.len(), 4);
        let mut parts: Vec<&str> = res.citations.split("\n\n").collect();
        parts.sort();
        assert_eq!(parts, vec!["Pubmed ID: 1", "Pubmed ID: 2"]);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_top_k_limits_sources() {
        let (mut store, _, _) = store();
        for i in 0..5 {
            store
                .insert(format!("d{i}"), format!("gene {i}"), BTreeMap::new(), None)
                .await
                .unwrap();
        }
        let res = store.query("gene", 2, QueryMode::TopK).await.unwrap().unwrap();
        assert_eq!(res.source_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_exhaustive_visits_every_document_in_order() {
        let (mut store, _, llm) = store();
        for i in 0..3 {
            store
                .insert(format!("d{i}"), format!("fact {i}"), BTreeMap::new(), None)
                .await
                .unwrap();
        }
        let res = store
            .query("objective", 1, QueryMode::Exhaustive)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(res.source_ids, vec!["d0", "d1", "d2"]);
        assert_eq!(llm.calls(), 3);
    }

    #[tokio::test]
    async fn test_tree_summarize_converges_under_small_budget() {
        let (store, _, llm) = store();
        let store = store.with_context_token_budget(64);
        let contexts: Vec<String> = (0..9).map(|i| format!("{i} {}", "x".repeat(400))).collect();
        let answer = store.tree_summarize("q", contexts).await.unwrap();
        assert!(answer.starts_with("Mock answer"));
        assert!(llm.calls() > 1);
    }

    #[test]
    fn test_pack_groups() {
        let items: Vec<String> = vec!["a".repeat(40), "b".repeat(40), "c".repeat(40)];
        let groups = pack_groups(&items, 20);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let index_dir = dir.path().join("index");
        assert!(KnowledgeStore::load_documents(&index_dir).unwrap().is_empty());

        let (mut store, _, _) = store();
        store
            .restore(vec![Document {
                id: "doc_id_0_1_0".into(),
                text: "BRCA1".into(),
                metadata: cited("Pubmed ID: 7"),
                embedding: vec![0.5, 0.5],
            }])
            .unwrap();
        store.persist(&index_dir).unwrap();

        let docs = KnowledgeStore::load_documents(&index_dir).unwrap();
        assert_eq!(docs, store.documents());
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }
}
