//! 工具调度器
//!
//! 持有 ToolRegistry 与统一超时，dispatch(params) 在超时内调用对应工具，
//! 结果归类为 Results / Empty / Failed；失败不会向上抛出，由研究循环记录后继续下一个任务。
//! 每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::tools::{ToolOutput, ToolParams, ToolRegistry};

/// 一次调度的结果
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// 成功且有结果（已去除空项）
    Results(ToolOutput),
    /// 成功但结果为空
    Empty,
    /// 执行失败或超时
    Failed(String),
}

/// 工具调度器：对每次调用施加超时，并记录审计日志
pub struct ToolDispatcher {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub async fn dispatch(&self, params: &ToolParams) -> DispatchOutcome {
        let start = Instant::now();
        let result = timeout(self.timeout, self.registry.execute(params)).await;

        let outcome = match result {
            Ok(Ok(output)) => {
                let output = output.normalized();
                if output.is_empty() {
                    DispatchOutcome::Empty
                } else {
                    DispatchOutcome::Results(output)
                }
            }
            Ok(Err(e)) => DispatchOutcome::Failed(e),
            Err(_) => DispatchOutcome::Failed(format!(
                "{} call timed out after {}s",
                params.kind(),
                self.timeout.as_secs()
            )),
        };

        let label = match &outcome {
            DispatchOutcome::Results(_) => "ok",
            DispatchOutcome::Empty => "empty",
            DispatchOutcome::Failed(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": params.kind().tag(),
            "outcome": label,
            "duration_ms": start.elapsed().as_millis() as u64,
            "params_preview": params_preview(params),
        });
        tracing::info!(audit = %audit.to_string(), "tool");
        if let DispatchOutcome::Failed(reason) = &outcome {
            tracing::warn!(tool = %params.kind(), %reason, "tool call did not run successfully");
        }

        outcome
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

fn params_preview(params: &ToolParams) -> String {
    let s = params.to_value().to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{MyVariantParams, Tool, ToolKind};
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedTool(Result<ToolOutput, String>);

    #[async_trait]
    impl Tool for FixedTool {
        fn kind(&self) -> ToolKind {
            ToolKind::MyVariant
        }

        fn description(&self) -> &str {
            "fixed"
        }

        async fn call(&self, _params: &ToolParams) -> Result<ToolOutput, String> {
            self.0.clone()
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn kind(&self) -> ToolKind {
            ToolKind::MyVariant
        }

        fn description(&self) -> &str {
            "slow"
        }

        async fn call(&self, _params: &ToolParams) -> Result<ToolOutput, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolOutput::Text("late".into()))
        }
    }

    fn params() -> ToolParams {
        ToolParams::MyVariant(MyVariantParams {
            query_term: "rs80357906".to_string(),
        })
    }

    fn dispatcher(tool: impl Tool + 'static, timeout_secs: u64) -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        ToolDispatcher::new(registry, timeout_secs)
    }

    #[tokio::test]
    async fn test_empty_list_is_distinguished_from_failure() {
        let d = dispatcher(FixedTool(Ok(ToolOutput::Json(json!([null])))), 5);
        assert_eq!(d.dispatch(&params()).await, DispatchOutcome::Empty);

        let d = dispatcher(FixedTool(Err("HTTP 500".into())), 5);
        assert_eq!(
            d.dispatch(&params()).await,
            DispatchOutcome::Failed("HTTP 500".into())
        );
    }

    #[tokio::test]
    async fn test_results_pass_through() {
        let d = dispatcher(FixedTool(Ok(ToolOutput::Json(json!([{"_id": "x"}])))), 5);
        assert_eq!(
            d.dispatch(&params()).await,
            DispatchOutcome::Results(ToolOutput::Json(json!([{"_id": "x"}])))
        );
    }

    #[tokio::test]
    async fn test_missing_wrapper_fails() {
        let d = ToolDispatcher::new(ToolRegistry::new(), 5);
        assert!(matches!(d.dispatch(&params()).await, DispatchOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_timeout_fails() {
        let d = ToolDispatcher {
            registry: {
                let mut r = ToolRegistry::new();
                r.register(SlowTool);
                r
            },
            timeout: Duration::from_millis(20),
        };
        match d.dispatch(&params()).await {
            DispatchOutcome::Failed(reason) => assert!(reason.contains("timed out")),
            other => panic!("Expected Failed, got {other:?}"),
        }
    }
}
