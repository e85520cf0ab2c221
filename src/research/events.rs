//! 研究循环过程事件：供命令行或前端展示任务进度、工具调用与综合结论

use serde::Serialize;

use crate::core::LoopPhase;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResearchEvent {
    /// 状态机阶段切换
    Phase { phase: LoopPhase },
    /// 开始执行任务
    TaskStarted { task_id: u64, task: String },
    /// 调用工具（参数为 JSON）
    ToolCall {
        tool: String,
        params: serde_json::Value,
    },
    /// 任务完成并入库
    TaskCompleted {
        task_id: u64,
        task: String,
        documents: usize,
    },
    /// 工具调用成功但无结果
    TaskNoResults { task_id: u64, task: String },
    /// 任务失败（循环继续）
    TaskFailed {
        task_id: u64,
        task: String,
        reason: String,
    },
    /// 追加到队尾的新任务
    TasksAdded { tasks: Vec<String> },
    /// 开始一轮综合查询
    SynthesisStarted { documents: usize },
    /// 一条综合结论
    KeyResult { heading: String, body: String },
    /// 会话已保存
    Persisted { path: String },
    /// 非致命警告（如知识库为空）
    Warning { text: String },
}
