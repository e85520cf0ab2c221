//! BioBee - Rust 生物医学研究智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、任务路由、会话状态、构建器
//! - **llm**: LLM 客户端与嵌入抽象（OpenAI 兼容 / Mock）及退避重试
//! - **memory**: 知识库（向量检索 + 汇总）、token 预算、会话持久化
//! - **observability**: tracing 日志初始化
//! - **processor**: 工具结果 → 带引用的文本文档
//! - **research**: 任务生成、任务选择、综合查询与主循环
//! - **tools**: mygene / myvariant / PubMed 数据源与调度器

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod processor;
pub mod research;
pub mod tools;
