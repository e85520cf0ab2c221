//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BIOBEE__*` 覆盖（双下划线表示嵌套，如 `BIOBEE__LLM__PROVIDER=mock`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::RetryConfig;
use crate::research::LoopSettings;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
}

/// [app] 段：输出目录与研究循环参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 会话目录的父目录
    pub out_dir: PathBuf,
    /// 本次运行最多执行的任务数；未设置时直到队列为空
    pub max_iterations: Option<usize>,
    pub synthesis_interval: usize,
    pub result_cutoff: usize,
    pub key_result_top_k: usize,
    pub exhaustive_max_docs: usize,
    pub interactive: bool,
    pub max_new_tasks: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        let loop_defaults = LoopSettings::default();
        Self {
            out_dir: PathBuf::from("out"),
            max_iterations: None,
            synthesis_interval: loop_defaults.synthesis_interval,
            result_cutoff: loop_defaults.result_cutoff,
            key_result_top_k: loop_defaults.key_result_top_k,
            exhaustive_max_docs: loop_defaults.exhaustive_max_docs,
            interactive: false,
            max_new_tasks: loop_defaults.max_new_tasks,
        }
    }
}

impl AppSection {
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            synthesis_interval: self.synthesis_interval,
            result_cutoff: self.result_cutoff,
            key_result_top_k: self.key_result_top_k,
            exhaustive_max_docs: self.exhaustive_max_docs,
            max_iterations: self.max_iterations,
            max_new_tasks: self.max_new_tasks,
        }
    }
}

/// [llm] 段：后端选择、模型、嵌入与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock；openai 无 API Key 时退回 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读取 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub embedding_model: String,
    pub max_embedding_tokens: usize,
    /// 单次汇总调用的上下文 token 预算
    pub context_token_budget: usize,
    pub timeout_secs: u64,
    pub retry: RetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            embedding_model: "text-embedding-3-small".to_string(),
            max_embedding_tokens: 8191,
            context_token_budget: 6000,
            timeout_secs: 120,
            retry: RetrySection::default(),
        }
    }
}

impl LlmSection {
    /// 配置中的 Key 优先，其次环境变量 OPENAI_API_KEY；空串视为未设置
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// [llm.retry] 段：指数退避
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub initial_delay_ms: u64,
    /// 单次等待的上限（秒）
    pub max_delay_secs: u64,
    pub multiplier: f64,
    pub max_retries: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_secs: 50,
            multiplier: 2.0,
            max_retries: 8,
        }
    }
}

impl RetrySection {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            initial_delay: std::time::Duration::from_millis(self.initial_delay_ms),
            max_delay: std::time::Duration::from_secs(self.max_delay_secs),
            multiplier: self.multiplier,
            max_retries: self.max_retries,
        }
    }
}

/// [tools] 段：三个数据源的地址与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub timeout_secs: u64,
    pub mygene_base_url: String,
    pub myvariant_base_url: String,
    pub pubmed_base_url: String,
    /// NCBI API Key（可选，提高限流额度）
    pub pubmed_api_key: Option<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            mygene_base_url: "https://mygene.info/v3".to_string(),
            myvariant_base_url: "https://myvariant.info/v1".to_string(),
            pubmed_base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            pubmed_api_key: None,
        }
    }
}

/// 从 config 目录加载配置，环境变量 BIOBEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BIOBEE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, ignoring");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BIOBEE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.out_dir, PathBuf::from("out"));
        assert_eq!(cfg.app.synthesis_interval, 5);
        assert_eq!(cfg.app.result_cutoff, 20_000);
        assert_eq!(cfg.llm.max_embedding_tokens, 8191);
        assert_eq!(cfg.llm.retry.to_retry_config().max_delay.as_secs(), 50);
        assert_eq!(cfg.tools.timeout_secs, 60);
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[app]\nsynthesis_interval = 2\nmax_iterations = 7\n\n[llm]\nprovider = \"mock\"\n\n[llm.retry]\nmax_retries = 1\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.app.synthesis_interval, 2);
        assert_eq!(cfg.app.loop_settings().max_iterations, Some(7));
        assert_eq!(cfg.app.result_cutoff, 20_000);
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.llm.retry.max_retries, 1);
        assert_eq!(cfg.llm.retry.max_delay_secs, 50);
    }
}
