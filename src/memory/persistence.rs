//! 会话持久化
//!
//! 会话目录 `<root>/<清洗后的目标>_<创建时间>` 下写出：
//! - `index/docstore.json`：知识库快照
//! - `state.json`：SessionState
//! - `key_findings_<reload_count>.md`：综合结论（每次保存整体重写）
//! - 每个任务一个子目录：`executive_summary.txt`、`api_call.txt`、`<i>/output.txt`、`<i>/vector.txt`
//!
//! 加载只恢复 state 与知识库，任务子目录只写不读。

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::core::{AgentError, DocStore, SessionState, DATETIME_FORMAT};
use crate::memory::{Document, KnowledgeStore};

pub const STATE_FILE: &str = "state.json";
pub const INDEX_DIR: &str = "index";

/// 任务目录名中任务文本的最大字符数
const TASK_DIR_CHARS: usize = 60;

static INVALID_CHARS_RE: OnceLock<Regex> = OnceLock::new();

/// 替换文件名非法字符与空白为 `_`，去掉一个前导 `.`
pub fn sanitize_dir_name(name: &str) -> String {
    let re = INVALID_CHARS_RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\s]"#).unwrap());
    let replaced = re.replace_all(name, "_");
    replaced
        .strip_prefix('.')
        .unwrap_or(replaced.as_ref())
        .to_string()
}

/// 任务报告目录名
pub fn task_dir_name(task_id: u64, task: &str) -> String {
    let short: String = task.chars().take(TASK_DIR_CHARS).collect();
    format!("task_{task_id}_{}", sanitize_dir_name(&short))
}

#[derive(Debug, Clone)]
pub struct SessionPersistence {
    root: PathBuf,
}

impl SessionPersistence {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn session_dir(&self, state: &SessionState) -> PathBuf {
        self.root.join(format!(
            "{}_{}",
            sanitize_dir_name(&state.objective),
            state.current_datetime
        ))
    }

    /// 写出完整会话，返回会话目录
    pub fn save(
        &self,
        state: &SessionState,
        store: &KnowledgeStore,
        doc_store: &DocStore,
    ) -> Result<PathBuf, AgentError> {
        let dir = self.session_dir(state);
        std::fs::create_dir_all(&dir)?;

        store.persist(&dir.join(INDEX_DIR))?;
        std::fs::write(dir.join(STATE_FILE), state.to_json()?)?;
        write_key_findings(&dir, state, doc_store)?;

        for entry in &doc_store.tasks {
            let task_dir = dir.join(&entry.key);
            std::fs::create_dir_all(&task_dir)?;
            if let Some(summary) = &entry.executive_summary {
                std::fs::write(task_dir.join("executive_summary.txt"), summary)?;
            }
            if let Some(code) = &entry.result_code {
                std::fs::write(task_dir.join("api_call.txt"), code)?;
            }
            for (i, result) in entry.results.iter().enumerate() {
                let result_dir = task_dir.join(i.to_string());
                std::fs::create_dir_all(&result_dir)?;
                std::fs::write(result_dir.join("output.txt"), &result.output)?;
                std::fs::write(
                    result_dir.join("vector.txt"),
                    format!("{:?}", result.vectorized_data),
                )?;
            }
        }

        tracing::debug!(path = %dir.display(), tasks = doc_store.tasks.len(), "Session saved");
        Ok(dir)
    }

    /// 读取会话目录：state（reload_count + 1）与知识库快照
    pub fn load(path: &Path) -> Result<(SessionState, Vec<Document>), AgentError> {
        let state_path = path.join(STATE_FILE);
        let data = std::fs::read_to_string(&state_path).map_err(|e| AgentError::CorruptedState {
            path: state_path.clone(),
            reason: e.to_string(),
        })?;
        let state = SessionState::from_json(&data, &state_path)?.resumed();
        let documents = KnowledgeStore::load_documents(&path.join(INDEX_DIR))?;
        tracing::info!(
            path = %path.display(),
            reload_count = state.reload_count,
            documents = documents.len(),
            queued = state.task_list.len(),
            "Session restored"
        );
        Ok((state, documents))
    }
}

fn write_key_findings(
    dir: &Path,
    state: &SessionState,
    doc_store: &DocStore,
) -> Result<(), AgentError> {
    let date = if state.reload_count == 0 {
        state.current_datetime.clone()
    } else {
        chrono::Local::now().format(DATETIME_FORMAT).to_string()
    };
    let mut content = format!("# {}\nDate: {}\n\n", state.objective, date);
    for result in &doc_store.key_results {
        content.push_str(&result.heading);
        content.push_str(&result.body);
    }
    std::fs::write(dir.join(format!("key_findings_{}.md", state.reload_count)), content)?;
    Ok(())
}
