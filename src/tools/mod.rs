//! 工具箱：三个生物医学数据源（mygene / myvariant / PubMed）、参数 schema、注册表与调度器

pub mod executor;
pub mod mygene;
pub mod myvariant;
pub mod pubmed;
pub mod registry;
pub mod schema;

pub use executor::{DispatchOutcome, ToolDispatcher};
pub use mygene::MyGeneTool;
pub use myvariant::MyVariantTool;
pub use pubmed::PubMedTool;
pub use registry::{Tool, ToolKind, ToolOutput, ToolRegistry};
pub use schema::{parameters_schema, MyGeneParams, MyVariantParams, PubMedParams, ToolParams};

const USER_AGENT: &str = concat!("biobee/", env!("CARGO_PKG_VERSION"));

/// 数据源共用的 HTTP 客户端：超时 + User-Agent
pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}
