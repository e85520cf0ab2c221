//! 任务生成：后续任务、工具参数、自由推理与执行摘要
//!
//! TaskGenerator 是对外部语言模型服务的抽象；LlmTaskGenerator 用提示词调用 LlmClient，
//! 并用 extract_json 从回复中取出 JSON（```json 代码块或首个 `{`/`[` 到最后一个 `}`/`]`）。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::{LlmClient, Message};
use crate::memory::TokenEstimator;
use crate::tools::{ToolKind, ToolRegistry};

const PLANNER_SYSTEM_PROMPT: &str = "You are an autonomous biomedical research assistant. \
    You break a research objective into small tasks that can be answered with gene, variant \
    and literature databases.";

/// 摘要提示词中结果部分的 token 上限
const SUMMARY_INPUT_TOKENS: usize = 6000;

/// 生成后续任务时提供给生成器的上下文
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    pub objective: String,
    pub last_task: Option<String>,
    /// 上一个任务的执行摘要或结果说明
    pub last_result: Option<String>,
    /// 附加提示，如「该调用无结果，不要重复」
    pub notes: Vec<String>,
    pub queued: Vec<String>,
    pub completed: Vec<String>,
    /// (tag, description)
    pub tools: Vec<(String, String)>,
    pub max_new_tasks: usize,
}

#[async_trait]
pub trait TaskGenerator: Send + Sync {
    /// 根据目标与当前进度提出新任务
    async fn generate_tasks(&self, ctx: &TaskContext) -> Result<Vec<String>, AgentError>;

    /// 为工具任务生成参数 JSON；previous_calls 为该工具的历次调用记录
    async fn generate_params(
        &self,
        task: &str,
        kind: ToolKind,
        previous_calls: &[String],
    ) -> Result<Value, AgentError>;

    /// 知识库为空时直接作答自由推理任务
    async fn reason(&self, objective: &str, task: &str) -> Result<String, AgentError>;

    /// 任务执行摘要
    async fn summarize(&self, task: &str, outputs: &[String]) -> Result<String, AgentError>;
}

/// 从 LLM 文本中提取 JSON 值
pub fn extract_json(output: &str) -> Result<Value, AgentError> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else {
        let start = match (trimmed.find('{'), trimmed.find('[')) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let end = match (trimmed.rfind('}'), trimmed.rfind(']')) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        match (start, end) {
            (Some(s), Some(e)) if s < e => &trimmed[s..=e],
            _ => {
                return Err(AgentError::JsonParseError(format!(
                    "no JSON found in: {}",
                    trimmed.chars().take(200).collect::<String>()
                )))
            }
        }
    };

    serde_json::from_str(json_str)
        .map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, json_str)))
}

/// 接受 `{"tasks": [...]}` 或裸数组
fn parse_task_list(value: Value) -> Result<Vec<String>, AgentError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("tasks") {
            Some(Value::Array(items)) => items,
            _ => return Err(AgentError::JsonParseError("expected a \"tasks\" array".to_string())),
        },
        other => {
            return Err(AgentError::JsonParseError(format!(
                "expected a task list, got {other}"
            )))
        }
    };
    Ok(items
        .into_iter()
        .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .collect())
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "(none)\n".to_string();
    }
    items.iter().map(|i| format!("- {i}\n")).collect()
}

/// 基于 LlmClient 的任务生成器
pub struct LlmTaskGenerator {
    llm: Arc<dyn LlmClient>,
    registry: ToolRegistry,
}

impl LlmTaskGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, registry: ToolRegistry) -> Self {
        Self { llm, registry }
    }

    async fn ask(&self, prompt: String) -> Result<String, AgentError> {
        let messages = [Message::system(PLANNER_SYSTEM_PROMPT), Message::user(prompt)];
        Ok(self.llm.complete(&messages).await?)
    }

    fn task_prompt(ctx: &TaskContext) -> String {
        let mut prompt = format!("Objective: {}\n\n", ctx.objective);
        prompt.push_str("Available tools (prefix a task with the tool name and a colon to use it, e.g. `PUBMED: BRCA1 and homologous recombination`):\n");
        for (tag, description) in &ctx.tools {
            prompt.push_str(&format!("- {tag}: {description}\n"));
        }
        prompt.push_str("Tasks without a tool prefix are answered by reasoning over the collected data.\n\n");
        prompt.push_str("Completed tasks:\n");
        prompt.push_str(&bullet_list(&ctx.completed));
        prompt.push_str("\nQueued tasks:\n");
        prompt.push_str(&bullet_list(&ctx.queued));
        if let Some(task) = &ctx.last_task {
            prompt.push_str(&format!("\nLast task: {task}\n"));
        }
        if let Some(result) = &ctx.last_result {
            prompt.push_str(&format!("Result of the last task:\n{result}\n"));
        }
        for note in &ctx.notes {
            prompt.push_str(&format!("Note: {note}\n"));
        }
        prompt.push_str(&format!(
            "\nPropose at most {} new tasks that move the objective forward and are not already completed or queued. \
             Respond with JSON only: {{\"tasks\": [\"...\"]}}. Respond with {{\"tasks\": []}} if nothing is left to do.",
            ctx.max_new_tasks
        ));
        prompt
    }
}

#[async_trait]
impl TaskGenerator for LlmTaskGenerator {
    async fn generate_tasks(&self, ctx: &TaskContext) -> Result<Vec<String>, AgentError> {
        let output = self.ask(Self::task_prompt(ctx)).await?;
        parse_task_list(extract_json(&output)?)
    }

    async fn generate_params(
        &self,
        task: &str,
        kind: ToolKind,
        previous_calls: &[String],
    ) -> Result<Value, AgentError> {
        let tool = self
            .registry
            .describe(kind)
            .ok_or_else(|| AgentError::UnknownTool(kind.tag().to_string()))?;
        let mut prompt = format!("{tool}\n\nTask: {task}\n\n");
        if !previous_calls.is_empty() {
            prompt.push_str("Previous calls to this tool (do not repeat a call that returned no results or failed):\n");
            for call in previous_calls {
                prompt.push_str(call);
            }
            prompt.push('\n');
        }
        prompt.push_str("Respond with only the JSON parameter object for this task.");
        let output = self.ask(prompt).await?;
        extract_json(&output)
    }

    async fn reason(&self, objective: &str, task: &str) -> Result<String, AgentError> {
        let prompt = format!(
            "Objective: {objective}\nTask: {task}\n\nComplete the task from your own knowledge. Be terse and factual."
        );
        Ok(self.ask(prompt).await?.trim().to_string())
    }

    async fn summarize(&self, task: &str, outputs: &[String]) -> Result<String, AgentError> {
        let joined = outputs.join("\n---\n");
        let results = TokenEstimator::truncate(&joined, SUMMARY_INPUT_TOKENS);
        let prompt = format!(
            "Task: {task}\n\nResults:\n{results}\n\nWrite a terse executive summary of what these results show. No filler words."
        );
        Ok(self.ask(prompt).await?.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::tools::{MyGeneTool, ToolRegistry};
    use std::sync::Mutex;

    #[test]
    fn test_extract_json_fenced() {
        let v = extract_json("Sure!\n```json\n{\"query_term\": \"BRCA1\"}\n```\nDone").unwrap();
        assert_eq!(v["query_term"], "BRCA1");
    }

    #[test]
    fn test_extract_json_bare_array() {
        let v = extract_json("Tasks: [\"PUBMED: BRCA1\", \"MYGENE: TP53\"] ok").unwrap();
        assert_eq!(v.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_extract_json_missing() {
        assert!(matches!(
            extract_json("no json here"),
            Err(AgentError::JsonParseError(_))
        ));
    }

    #[test]
    fn test_parse_task_list_shapes() {
        let tasks = parse_task_list(serde_json::json!({"tasks": ["a", " ", 3, "b"]})).unwrap();
        assert_eq!(tasks, vec!["a", "b"]);
        assert!(parse_task_list(serde_json::json!({"other": []})).is_err());
    }

    struct Scripted {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for Scripted {
        async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
            if let Some(last) = messages.last() {
                self.prompts.lock().unwrap().push(last.content.clone());
            }
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn test_generate_params_includes_schema_and_history() {
        let llm = Arc::new(Scripted {
            reply: "```json\n{\"query_term\": \"BRCA1\", \"size\": 3}\n```".to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let mut registry = ToolRegistry::new();
        registry.register(MyGeneTool::new("http://localhost:1", 1));
        let generator = LlmTaskGenerator::new(llm.clone(), registry);

        let previous =
            vec!["---\nNote: This call returned no results\n{\"query_term\": \"BRCA\"}\n---\n".to_string()];
        let value = generator
            .generate_params("MYGENE: BRCA1", ToolKind::MyGene, &previous)
            .await
            .unwrap();
        assert_eq!(value["size"], 3);

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("Tool MYGENE"));
        assert!(prompts[0].contains("query_term"));
        assert!(prompts[0].contains("returned no results"));
    }

    #[tokio::test]
    async fn test_generate_params_unregistered_tool() {
        let llm = Arc::new(Scripted {
            reply: "{}".to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let generator = LlmTaskGenerator::new(llm, ToolRegistry::new());
        let err = generator
            .generate_params("PUBMED: x", ToolKind::PubMed, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(_)));
    }
}
