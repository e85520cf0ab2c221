//! 会话状态：任务队列、已完成任务、工具调用缓存、任务计数器与重载代数
//!
//! SessionState 整体序列化为 state.json；DocStore 记录每个任务的调用参数、执行摘要与结果，
//! 以报告目录形式落盘。

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::tools::ToolKind;

/// state.json 中必须存在的键
pub const REQUIRED_STATE_KEYS: [&str; 8] = [
    "summaries",
    "reload_count",
    "task_id_counter",
    "task_list",
    "completed_tasks",
    "cache",
    "current_datetime",
    "objective",
];

/// 会话目录与报告中使用的时间格式
pub const DATETIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// 研究循环阶段（用于事件与日志）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    SelectTask,
    Dispatch,
    ProcessResult,
    Store,
    Synthesize,
    Persist,
    Done,
}

/// 一次工具调用的结果标注
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallAnnotation {
    Ok,
    NoResults,
    Failed,
}

/// 工具名 -> 历次调用参数记录（按时间顺序，只增不减）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolCache(BTreeMap<String, Vec<String>>);

impl ToolCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条调用记录，按标注加上说明行
    pub fn record(&mut self, kind: ToolKind, params: &str, annotation: CallAnnotation) {
        let params = if params.ends_with('\n') {
            params.to_string()
        } else {
            format!("{params}\n")
        };
        let entry = match annotation {
            CallAnnotation::Ok => format!("---\n{params}---\n"),
            CallAnnotation::NoResults => {
                format!("---\nNote: This call returned no results\n{params}---\n")
            }
            CallAnnotation::Failed => {
                format!("---\nNote: This call did not run successfully\n{params}---\n")
            }
        };
        self.0.entry(kind.tag().to_string()).or_default().push(entry);
    }

    pub fn entries(&self, kind: ToolKind) -> &[String] {
        self.0.get(kind.tag()).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// 可持久化的会话状态
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub summaries: Vec<String>,
    pub reload_count: u32,
    pub task_id_counter: u64,
    pub task_list: VecDeque<String>,
    pub completed_tasks: Vec<String>,
    pub cache: ToolCache,
    pub current_datetime: String,
    pub objective: String,
}

impl SessionState {
    pub fn new(objective: impl Into<String>, initial_tasks: Vec<String>) -> Self {
        Self {
            summaries: Vec::new(),
            reload_count: 0,
            task_id_counter: 0,
            task_list: initial_tasks.into_iter().collect(),
            completed_tasks: Vec::new(),
            cache: ToolCache::new(),
            current_datetime: chrono::Local::now().format(DATETIME_FORMAT).to_string(),
            objective: objective.into(),
        }
    }

    /// 分配下一个任务编号（严格递增，跨重载保持）
    pub fn next_task_id(&mut self) -> u64 {
        self.task_id_counter += 1;
        self.task_id_counter
    }

    /// 文档 ID：重载代数 + 任务编号 + 结果序号，整个会话生命周期内唯一
    pub fn document_id(&self, task_id: u64, index: usize) -> String {
        format!("doc_id_{}_{}_{}", self.reload_count, task_id, index)
    }

    pub fn to_json(&self) -> Result<String, AgentError> {
        serde_json::to_string_pretty(self).map_err(|e| AgentError::JsonParseError(e.to_string()))
    }

    /// 解析 state.json；缺少必需键时返回指明键名与路径的错误。不修改 reload_count
    pub fn from_json(data: &str, path: &Path) -> Result<Self, AgentError> {
        let value: serde_json::Value =
            serde_json::from_str(data).map_err(|e| AgentError::CorruptedState {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let object = value.as_object().ok_or_else(|| AgentError::CorruptedState {
            path: path.to_path_buf(),
            reason: "top-level value is not an object".to_string(),
        })?;
        if let Some(missing) = REQUIRED_STATE_KEYS.iter().find(|k| !object.contains_key(**k)) {
            return Err(AgentError::MissingStateKey {
                key: missing.to_string(),
                path: path.to_path_buf(),
            });
        }
        serde_json::from_value(value).map_err(|e| AgentError::CorruptedState {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// 作为重载后的新一代会话继续
    pub fn resumed(mut self) -> Self {
        self.reload_count += 1;
        self
    }
}

/// 单条已入库结果（与知识库中的文档一一对应）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultRecord {
    pub task_id_counter: u64,
    pub vectorized_data: Vec<f32>,
    pub output: String,
    pub metadata: BTreeMap<String, String>,
}

/// 单个任务的产出：调用参数、执行摘要与结果列表；任务完成后创建，之后不再修改
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocStoreEntry {
    /// 报告目录名
    pub key: String,
    pub task: String,
    pub result_code: Option<String>,
    pub executive_summary: Option<String>,
    pub results: Vec<ResultRecord>,
}

/// 一条综合结论（Markdown 标题 + 正文）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyResult {
    pub heading: String,
    pub body: String,
}

/// 本代会话内的任务产出与累计综合结论
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DocStore {
    pub tasks: Vec<DocStoreEntry>,
    pub key_results: Vec<KeyResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> SessionState {
        let mut state = SessionState::new(
            "find genes linked to BRCA1 pathway",
            vec![
                "MYGENE: query_term='BRCA1'".to_string(),
                "PUBMED: BRCA1 pathway review".to_string(),
            ],
        );
        state.next_task_id();
        state.next_task_id();
        state.completed_tasks.push("MYGENE: query_term='TP53'".to_string());
        state.cache.record(ToolKind::MyGene, "{\"query_term\": \"TP53\"}", CallAnnotation::Ok);
        state
            .cache
            .record(ToolKind::PubMed, "{\"query_term\": \"x\"}", CallAnnotation::Failed);
        state.summaries.push("TP53 is a tumor suppressor.".to_string());
        state
    }

    #[test]
    fn test_round_trip_increments_reload_once() {
        let state = sample_state();
        let json = state.to_json().unwrap();
        let restored = SessionState::from_json(&json, Path::new("state.json"))
            .unwrap()
            .resumed();
        assert_eq!(restored.task_list, state.task_list);
        assert_eq!(restored.cache, state.cache);
        assert_eq!(restored.task_id_counter, state.task_id_counter);
        assert_eq!(restored.completed_tasks, state.completed_tasks);
        assert_eq!(restored.summaries, state.summaries);
        assert_eq!(restored.reload_count, state.reload_count + 1);
    }

    #[test]
    fn test_missing_key_is_named() {
        let state = sample_state();
        let mut value: serde_json::Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();
        value.as_object_mut().unwrap().remove("task_id_counter");
        let err = SessionState::from_json(&value.to_string(), Path::new("/tmp/s/state.json"))
            .unwrap_err();
        match &err {
            AgentError::MissingStateKey { key, .. } => assert_eq!(key, "task_id_counter"),
            other => panic!("Expected MissingStateKey, got {other:?}"),
        }
        assert!(err.to_string().contains("task_id_counter"));
        assert!(err.to_string().contains("/tmp/s/state.json"));
    }

    #[test]
    fn test_cache_annotations() {
        let mut cache = ToolCache::new();
        cache.record(ToolKind::PubMed, "{\"query_term\": \"a\"}", CallAnnotation::NoResults);
        cache.record(ToolKind::PubMed, "{\"query_term\": \"b\"}", CallAnnotation::Failed);
        let entries = cache.entries(ToolKind::PubMed);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].contains("returned no results"));
        assert!(entries[1].contains("did not run successfully"));
        assert!(cache.entries(ToolKind::MyGene).is_empty());
    }

    #[test]
    fn test_document_ids_include_generation() {
        let mut state = sample_state();
        let first = state.document_id(3, 0);
        state = state.resumed();
        assert_ne!(first, state.document_id(3, 0));
        assert_eq!(state.document_id(3, 1), "doc_id_1_3_1");
    }
}
