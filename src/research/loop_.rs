//! 研究主循环
//!
//! SelectTask -> Dispatch -> ProcessResult -> Store -> (Synthesize) -> Persist -> SelectTask。
//! 一次只处理一个任务；队列为空或达到本次运行的任务上限时结束，结束前总会做一轮综合查询。
//! 单个任务的失败由 RecoveryEngine 判定：SkipTask 记录后继续，Abort 时把任务放回队首、保存后返回错误。
//! 可选 event_tx：向命令行等前端推送 ResearchEvent。

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::core::{
    AgentError, CallAnnotation, DocStore, DocStoreEntry, LoopPhase, RecoveryAction, RecoveryEngine,
    ResultRecord, SessionState, Task, TaskRoute,
};
use crate::memory::{task_dir_name, KnowledgeStore, QueryMode, SessionPersistence};
use crate::processor::{self, ProcessedResult};
use crate::research::{
    synthesize, FifoSelector, ResearchEvent, TaskContext, TaskGenerator, TaskSelector,
};
use crate::tools::{DispatchOutcome, ToolDispatcher, ToolKind, ToolParams};

/// 循环参数（来自配置的 [app] 段）
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// 每完成多少个任务做一轮综合查询
    pub synthesis_interval: usize,
    /// 单条结果入库前截断到的字符数
    pub result_cutoff: usize,
    pub key_result_top_k: usize,
    pub exhaustive_max_docs: usize,
    /// 本次运行最多执行的任务数
    pub max_iterations: Option<usize>,
    /// 每个任务最多接受的后续任务数
    pub max_new_tasks: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            synthesis_interval: 5,
            result_cutoff: 20_000,
            key_result_top_k: 20,
            exhaustive_max_docs: 10,
            max_iterations: None,
            max_new_tasks: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    QueueEmpty,
    IterationLimit,
}

#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub tasks_run: usize,
    pub key_results: usize,
    pub stop_reason: StopReason,
    pub session_dir: Option<PathBuf>,
}

/// 单个任务的执行结果
#[derive(Debug)]
enum TaskReport {
    Stored { documents: usize, summary: Option<String> },
    NoResults { call: String },
}

pub struct TaskLoop {
    state: SessionState,
    doc_store: DocStore,
    store: KnowledgeStore,
    dispatcher: ToolDispatcher,
    generator: Arc<dyn TaskGenerator>,
    selector: Box<dyn TaskSelector>,
    recovery: RecoveryEngine,
    persistence: Option<SessionPersistence>,
    settings: LoopSettings,
    event_tx: Option<UnboundedSender<ResearchEvent>>,
    tasks_since_synthesis: usize,
}

impl TaskLoop {
    pub fn new(
        state: SessionState,
        store: KnowledgeStore,
        dispatcher: ToolDispatcher,
        generator: Arc<dyn TaskGenerator>,
    ) -> Self {
        Self {
            state,
            doc_store: DocStore::default(),
            store,
            dispatcher,
            generator,
            selector: Box::new(FifoSelector),
            recovery: RecoveryEngine::new(),
            persistence: None,
            settings: LoopSettings::default(),
            event_tx: None,
            tasks_since_synthesis: 0,
        }
    }

    pub fn with_selector(mut self, selector: Box<dyn TaskSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_persistence(mut self, persistence: SessionPersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<ResearchEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn doc_store(&self) -> &DocStore {
        &self.doc_store
    }

    fn emit(&self, event: ResearchEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    fn phase(&self, phase: LoopPhase) {
        tracing::debug!(?phase, "Loop phase");
        self.emit(ResearchEvent::Phase { phase });
    }

    /// 启动时队列为空则向生成器要初始任务；生成失败（可跳过的错误）时保持空队列。
    /// 返回队列长度
    pub async fn seed_tasks(&mut self) -> Result<usize, AgentError> {
        if self.state.task_list.is_empty() {
            let ctx = self.task_context(None, None, Vec::new());
            let generated = self.generator.generate_tasks(&ctx).await;
            if let Some(tasks) = self.tolerate(generated, "initial task generation")? {
                self.enqueue(tasks);
            }
        }
        Ok(self.state.task_list.len())
    }

    /// 运行直到队列为空或达到任务上限
    pub async fn run(&mut self) -> Result<LoopOutcome, AgentError> {
        let mut tasks_run = 0;
        let stop_reason = loop {
            if self
                .settings
                .max_iterations
                .is_some_and(|limit| tasks_run >= limit)
            {
                break StopReason::IterationLimit;
            }
            if !self.step().await? {
                break StopReason::QueueEmpty;
            }
            tasks_run += 1;
        };

        if self.tasks_since_synthesis > 0 {
            self.run_synthesis().await;
        }
        let session_dir = self.persist()?;
        self.phase(LoopPhase::Done);
        tracing::info!(
            tasks_run,
            ?stop_reason,
            documents = self.store.len(),
            "Research loop finished"
        );

        Ok(LoopOutcome {
            tasks_run,
            key_results: self.doc_store.key_results.len(),
            stop_reason,
            session_dir,
        })
    }

    /// 执行一个任务；队列为空时返回 false
    pub async fn step(&mut self) -> Result<bool, AgentError> {
        self.phase(LoopPhase::SelectTask);
        let Some(task) = self.selector.select(&mut self.state.task_list) else {
            return Ok(false);
        };
        let task_id = self.state.next_task_id();
        tracing::info!(task_id, task = %task.text, "Executing task");
        self.emit(ResearchEvent::TaskStarted {
            task_id,
            task: task.text.clone(),
        });

        match self.execute(&task, task_id).await {
            Ok(report) => self.on_task_done(&task, task_id, report).await?,
            Err(e) => match self.recovery.handle(&e) {
                RecoveryAction::SkipTask(reason) => {
                    tracing::error!(task_id, task = %task.text, %reason, "Task failed");
                    self.emit(ResearchEvent::TaskFailed {
                        task_id,
                        task: task.text.clone(),
                        reason,
                    });
                    self.state.completed_tasks.push(task.text.clone());
                }
                RecoveryAction::Abort => {
                    tracing::error!(
                        task_id,
                        task = %task.text,
                        error = %e,
                        "Aborting research loop"
                    );
                    self.state.task_list.push_front(task.text);
                    if let Err(persist_err) = self.persist() {
                        tracing::error!(
                            error = %persist_err,
                            "Could not save session before aborting"
                        );
                    }
                    return Err(e);
                }
            },
        }

        self.tasks_since_synthesis += 1;
        if self.tasks_since_synthesis >= self.settings.synthesis_interval.max(1) {
            self.run_synthesis().await;
        }
        self.persist()?;
        Ok(true)
    }

    async fn execute(&mut self, task: &Task, task_id: u64) -> Result<TaskReport, AgentError> {
        match task.route()? {
            TaskRoute::Tool(kind) => self.run_tool_task(task, kind, task_id).await,
            TaskRoute::Reasoning => self.run_reasoning_task(task, task_id).await,
        }
    }

    async fn run_tool_task(
        &mut self,
        task: &Task,
        kind: ToolKind,
        task_id: u64,
    ) -> Result<TaskReport, AgentError> {
        self.phase(LoopPhase::Dispatch);
        let previous = self.state.cache.entries(kind).to_vec();
        let raw = self.generator.generate_params(&task.text, kind, &previous).await?;
        let key = task_dir_name(task_id, &task.text);
        let params = match ToolParams::parse(kind, raw.clone()) {
            Ok(params) => params,
            Err(e) => {
                // 被拒绝的参数同样记入缓存，生成器下次能看到
                let call = serde_json::to_string_pretty(&raw).unwrap_or_else(|_| raw.to_string());
                self.record_call(key, task, kind, &call, CallAnnotation::Failed);
                return Err(e);
            }
        };
        let call = params.to_call_text();
        self.emit(ResearchEvent::ToolCall {
            tool: kind.tag().to_string(),
            params: params.to_value(),
        });

        match self.dispatcher.dispatch(&params).await {
            DispatchOutcome::Failed(reason) => {
                self.record_call(key, task, kind, &call, CallAnnotation::Failed);
                Err(AgentError::ToolExecutionFailed(reason))
            }
            DispatchOutcome::Empty => {
                tracing::info!(task_id, tool = %kind, "Task completed but returned no results");
                self.record_call(key, task, kind, &call, CallAnnotation::NoResults);
                Ok(TaskReport::NoResults { call })
            }
            DispatchOutcome::Results(output) => {
                self.state.cache.record(kind, &call, CallAnnotation::Ok);
                self.phase(LoopPhase::ProcessResult);
                let processed = processor::process(kind, &output);
                self.store_results(task, task_id, key, Some(call), processed).await
            }
        }
    }

    /// 自由推理任务：知识库非空时检索作答，否则由生成器直接作答
    async fn run_reasoning_task(
        &mut self,
        task: &Task,
        task_id: u64,
    ) -> Result<TaskReport, AgentError> {
        self.phase(LoopPhase::Dispatch);
        let question = task.body().to_string();
        let response = self
            .store
            .query(&question, self.settings.key_result_top_k, QueryMode::TopK)
            .await?;
        let processed = match response {
            Some(r) => ProcessedResult::new(r.answer, r.citations),
            None => ProcessedResult::new(
                self.generator.reason(&self.state.objective, &question).await?,
                String::new(),
            ),
        };
        let key = task_dir_name(task_id, &task.text);
        self.store_results(task, task_id, key, None, vec![processed]).await
    }

    async fn store_results(
        &mut self,
        task: &Task,
        task_id: u64,
        key: String,
        result_code: Option<String>,
        processed: Vec<ProcessedResult>,
    ) -> Result<TaskReport, AgentError> {
        self.phase(LoopPhase::Store);
        // 先算完全部嵌入再入库：任一嵌入失败时知识库保持不变
        let mut prepared = Vec::with_capacity(processed.len());
        for result in processed {
            let text: String = result.text.chars().take(self.settings.result_cutoff).collect();
            let metadata = result.metadata();
            let embedding = self.store.embed(&text, &metadata).await?;
            prepared.push((text, metadata, embedding));
        }

        let mut records = Vec::with_capacity(prepared.len());
        for (i, (text, metadata, embedding)) in prepared.into_iter().enumerate() {
            let id = self.state.document_id(task_id, i);
            let embedding = self
                .store
                .insert(id, text.clone(), metadata.clone(), Some(embedding))
                .await?;
            records.push(ResultRecord {
                task_id_counter: task_id,
                vectorized_data: embedding,
                output: text,
                metadata,
            });
        }
        let documents = records.len();
        tracing::info!(task_id, documents, "Stored task results");

        let summary = if records.is_empty() {
            None
        } else {
            let outputs: Vec<String> = records.iter().map(|r| r.output.clone()).collect();
            let summary = self.generator.summarize(&task.text, &outputs).await;
            self.tolerate(summary, "executive summary")?
        };
        if let Some(s) = &summary {
            self.state.summaries.push(s.clone());
        }
        self.push_entry(key, task, result_code, summary.clone(), records);
        Ok(TaskReport::Stored { documents, summary })
    }

    /// 未产生文档的调用：写入带标注的缓存记录与一条只有调用说明的任务条目
    fn record_call(
        &mut self,
        key: String,
        task: &Task,
        kind: ToolKind,
        call: &str,
        annotation: CallAnnotation,
    ) {
        self.state.cache.record(kind, call, annotation);
        let note = match annotation {
            CallAnnotation::NoResults => "NOTE: Call returned no results",
            _ => "NOTE: Call did not run successfully",
        };
        self.push_entry(key, task, Some(format!("{note}\n\n{call}")), None, Vec::new());
    }

    fn push_entry(
        &mut self,
        key: String,
        task: &Task,
        result_code: Option<String>,
        executive_summary: Option<String>,
        results: Vec<ResultRecord>,
    ) {
        self.doc_store.tasks.push(DocStoreEntry {
            key,
            task: task.text.clone(),
            result_code,
            executive_summary,
            results,
        });
    }

    /// 可跳过的错误降级为 None 并记录警告；需要终止的错误继续向上传播
    fn tolerate<T>(
        &self,
        result: Result<T, AgentError>,
        what: &str,
    ) -> Result<Option<T>, AgentError> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) => match self.recovery.handle(&e) {
                RecoveryAction::SkipTask(reason) => {
                    tracing::warn!(%reason, "Skipping {what}");
                    self.emit(ResearchEvent::Warning {
                        text: format!("{what} skipped: {reason}"),
                    });
                    Ok(None)
                }
                RecoveryAction::Abort => Err(e),
            },
        }
    }

    async fn on_task_done(
        &mut self,
        task: &Task,
        task_id: u64,
        report: TaskReport,
    ) -> Result<(), AgentError> {
        self.state.completed_tasks.push(task.text.clone());
        let (last_result, notes) = match report {
            TaskReport::Stored { documents, summary } => {
                self.emit(ResearchEvent::TaskCompleted {
                    task_id,
                    task: task.text.clone(),
                    documents,
                });
                (summary, Vec::new())
            }
            TaskReport::NoResults { call } => {
                self.emit(ResearchEvent::TaskNoResults {
                    task_id,
                    task: task.text.clone(),
                });
                let note = format!(
                    "The call below returned no results. Do not repeat the identical call; broaden or rephrase the query instead.\n{call}"
                );
                (None, vec![note])
            }
        };

        let ctx = self.task_context(Some(task.text.clone()), last_result, notes);
        let generated = self.generator.generate_tasks(&ctx).await;
        if let Some(tasks) = self.tolerate(generated, "follow-up task generation")? {
            self.enqueue(tasks);
        }
        Ok(())
    }

    fn task_context(
        &self,
        last_task: Option<String>,
        last_result: Option<String>,
        notes: Vec<String>,
    ) -> TaskContext {
        TaskContext {
            objective: self.state.objective.clone(),
            last_task,
            last_result,
            notes,
            queued: self.state.task_list.iter().cloned().collect(),
            completed: self.state.completed_tasks.clone(),
            tools: self.dispatcher.registry().tool_descriptions(),
            max_new_tasks: self.settings.max_new_tasks,
        }
    }

    /// 追加到队尾：跳过已在队列或已完成的任务，数量受 max_new_tasks 限制
    fn enqueue(&mut self, tasks: Vec<String>) {
        let mut added = Vec::new();
        for task in tasks {
            if added.len() >= self.settings.max_new_tasks {
                break;
            }
            let known = self.state.task_list.contains(&task)
                || self.state.completed_tasks.contains(&task)
                || added.contains(&task);
            if !known {
                added.push(task);
            }
        }
        if added.is_empty() {
            return;
        }
        tracing::info!(count = added.len(), "Adding follow-up tasks");
        self.state.task_list.extend(added.iter().cloned());
        self.emit(ResearchEvent::TasksAdded { tasks: added });
    }

    async fn run_synthesis(&mut self) {
        self.phase(LoopPhase::Synthesize);
        self.tasks_since_synthesis = 0;
        if self.store.is_empty() {
            self.emit(ResearchEvent::Warning {
                text: "No tasks returned results yet, skipping key results".to_string(),
            });
        } else {
            self.emit(ResearchEvent::SynthesisStarted {
                documents: self.store.len(),
            });
        }
        let results = synthesize(
            &self.store,
            &self.state.objective,
            self.settings.key_result_top_k,
            self.settings.exhaustive_max_docs,
        )
        .await;
        for result in results {
            self.emit(ResearchEvent::KeyResult {
                heading: result.heading.clone(),
                body: result.body.clone(),
            });
            self.doc_store.key_results.push(result);
        }
    }

    fn persist(&self) -> Result<Option<PathBuf>, AgentError> {
        let Some(persistence) = &self.persistence else {
            return Ok(None);
        };
        self.phase(LoopPhase::Persist);
        let dir = persistence.save(&self.state, &self.store, &self.doc_store)?;
        self.emit(ResearchEvent::Persisted {
            path: dir.display().to_string(),
        });
        Ok(Some(dir))
    }
}
