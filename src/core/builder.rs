//! 研究循环构建器：把 AppConfig 显式传给每个协作者
//!
//! LLM 与嵌入按 provider 选择 OpenAI 兼容实现（外加退避重试）或 Mock；
//! 工具注册表、调度器、知识库、任务生成器与循环参数都从同一份配置构造。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentError, SessionState};
use crate::llm::{
    EmbeddingProvider, LlmClient, MockEmbedder, MockLlmClient, OpenAiClient, OpenAiEmbedder,
    RetryingEmbedder, RetryingLlmClient,
};
use crate::memory::{KnowledgeStore, SessionPersistence};
use crate::research::{LlmTaskGenerator, LoopSettings, TaskGenerator, TaskLoop};
use crate::tools::{MyGeneTool, MyVariantTool, PubMedTool, ToolDispatcher, ToolRegistry};

pub struct ResearchBuilder {
    config: AppConfig,
}

impl ResearchBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// 使用真实服务时返回 API Key；provider 为 mock 或缺少 Key 时返回 None
    fn api_key(&self) -> Option<String> {
        if self.config.llm.provider.eq_ignore_ascii_case("mock") {
            return None;
        }
        let key = self.config.llm.resolve_api_key();
        if key.is_none() {
            tracing::warn!("No API key configured (llm.api_key / OPENAI_API_KEY), falling back to mock LLM");
        }
        key
    }

    /// 构建 LLM 客户端
    pub fn build_llm(&self) -> Arc<dyn LlmClient> {
        let llm = &self.config.llm;
        match self.api_key() {
            Some(key) => {
                let client = OpenAiClient::new(llm.base_url.as_deref(), &llm.model, &key)
                    .with_timeout(llm.timeout_secs);
                Arc::new(RetryingLlmClient::new(Arc::new(client), llm.retry.to_retry_config()))
            }
            None => Arc::new(MockLlmClient::new()),
        }
    }

    /// 构建嵌入提供方
    pub fn build_embedder(&self) -> Arc<dyn EmbeddingProvider> {
        let llm = &self.config.llm;
        match self.api_key() {
            Some(key) => {
                let embedder = OpenAiEmbedder::new(
                    llm.base_url.as_deref(),
                    &llm.embedding_model,
                    &key,
                    llm.max_embedding_tokens,
                );
                Arc::new(RetryingEmbedder::new(Arc::new(embedder), llm.retry.to_retry_config()))
            }
            None => Arc::new(MockEmbedder::default()),
        }
    }

    /// 注册三个数据源工具
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let tools = &self.config.tools;
        let mut registry = ToolRegistry::new();
        registry.register(MyGeneTool::new(&tools.mygene_base_url, tools.timeout_secs));
        registry.register(MyVariantTool::new(&tools.myvariant_base_url, tools.timeout_secs));
        registry.register(PubMedTool::new(
            &tools.pubmed_base_url,
            tools.pubmed_api_key.clone(),
            tools.timeout_secs,
        ));
        registry
    }

    pub fn build_dispatcher(&self, registry: ToolRegistry) -> ToolDispatcher {
        ToolDispatcher::new(registry, self.config.tools.timeout_secs)
    }

    pub fn build_store(
        &self,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmClient>,
    ) -> KnowledgeStore {
        KnowledgeStore::new(embedder, llm)
            .with_max_embedding_tokens(self.config.llm.max_embedding_tokens)
            .with_context_token_budget(self.config.llm.context_token_budget)
    }

    pub fn build_generator(
        &self,
        llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
    ) -> Arc<dyn TaskGenerator> {
        Arc::new(LlmTaskGenerator::new(llm, registry))
    }

    pub fn loop_settings(&self) -> LoopSettings {
        self.config.app.loop_settings()
    }

    pub fn persistence(&self) -> SessionPersistence {
        SessionPersistence::new(&self.config.app.out_dir)
    }

    fn assemble(
        &self,
        state: SessionState,
        store: KnowledgeStore,
        llm: Arc<dyn LlmClient>,
    ) -> TaskLoop {
        let registry = self.build_tool_registry();
        let generator = self.build_generator(llm, registry.clone());
        TaskLoop::new(state, store, self.build_dispatcher(registry), generator)
            .with_settings(self.loop_settings())
            .with_persistence(self.persistence())
    }

    /// 新会话；initial_tasks 为空时由调用方通过 TaskLoop::seed_tasks 生成
    pub fn start(&self, objective: &str, initial_tasks: Vec<String>) -> TaskLoop {
        let llm = self.build_llm();
        let store = self.build_store(self.build_embedder(), llm.clone());
        let state = SessionState::new(objective, initial_tasks);
        tracing::info!(objective, queued = state.task_list.len(), "Starting new research session");
        self.assemble(state, store, llm)
    }

    /// 恢复会话目录；reload_count + 1，知识库从快照重建
    pub fn resume(&self, path: &Path) -> Result<TaskLoop, AgentError> {
        let (state, documents) = SessionPersistence::load(path)?;
        let llm = self.build_llm();
        let mut store = self.build_store(self.build_embedder(), llm.clone());
        store.restore(documents)?;
        Ok(self.assemble(state, store, llm))
    }
}

/// 便捷函数：加载配置失败时退回默认值
pub fn create_research_builder(config_path: Option<PathBuf>) -> ResearchBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    ResearchBuilder::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolKind;

    fn mock_config(out_dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.provider = "mock".to_string();
        config.app.out_dir = out_dir.to_path_buf();
        config
    }

    #[test]
    fn test_registry_has_all_tools() {
        let builder = ResearchBuilder::new(AppConfig::default());
        assert_eq!(builder.build_tool_registry().kinds(), ToolKind::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_resume_restores_store_and_bumps_reload() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ResearchBuilder::new(mock_config(dir.path()));

        let mut first = builder.start("BRCA1 partners", vec!["what is BRCA1?".to_string()]);
        let outcome = first.run().await.unwrap();
        let session = outcome.session_dir.unwrap();
        let docs = first.store().len();
        assert!(docs > 0);

        let resumed = builder.resume(&session).unwrap();
        assert_eq!(resumed.state().reload_count, 1);
        assert_eq!(resumed.store().len(), docs);
        assert_eq!(resumed.state().task_id_counter, first.state().task_id_counter);
    }
}
