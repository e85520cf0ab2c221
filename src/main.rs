//! BioBee - Rust 生物医学研究智能体
//!
//! 入口：解析命令行、初始化日志、构建研究循环并在终端打印过程事件。

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use biobee::config::load_config;
use biobee::core::ResearchBuilder;
use biobee::research::{
    drain_events, FlushingSelector, InteractiveSelector, LoopOutcome, ResearchEvent, SharedEvents,
    TaskLoop,
};

#[derive(Parser)]
#[command(name = "biobee", version, about = "Biomedical research agent")]
struct Cli {
    /// 配置文件（覆盖 config/default.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 以新目标开始研究
    Run {
        #[arg(long)]
        objective: String,
        /// 初始任务，可重复；省略时由 LLM 生成
        #[arg(long = "task")]
        tasks: Vec<String>,
        #[arg(long)]
        max_iterations: Option<usize>,
        /// 每步从菜单中手动挑选任务
        #[arg(long)]
        interactive: bool,
    },
    /// 从会话目录恢复
    Resume {
        dir: PathBuf,
        #[arg(long)]
        max_iterations: Option<usize>,
        #[arg(long)]
        interactive: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    biobee::observability::init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.clone()).context("Failed to load config")?;

    let (task_loop, interactive) = match cli.command {
        Command::Run {
            objective,
            tasks,
            max_iterations,
            interactive,
        } => {
            if max_iterations.is_some() {
                config.app.max_iterations = max_iterations;
            }
            let interactive = interactive || config.app.interactive;
            let builder = ResearchBuilder::new(config);
            let seed = tasks.is_empty();
            let mut task_loop = builder.start(&objective, tasks);
            if seed {
                let queued = task_loop
                    .seed_tasks()
                    .await
                    .context("Failed to generate initial tasks")?;
                if queued == 0 {
                    tracing::warn!("No initial tasks were generated; pass --task to seed the queue");
                }
            }
            (task_loop, interactive)
        }
        Command::Resume {
            dir,
            max_iterations,
            interactive,
        } => {
            if max_iterations.is_some() {
                config.app.max_iterations = max_iterations;
            }
            let interactive = interactive || config.app.interactive;
            let builder = ResearchBuilder::new(config);
            let task_loop = builder
                .resume(&dir)
                .with_context(|| format!("Failed to resume session {}", dir.display()))?;
            (task_loop, interactive)
        }
    };

    let outcome = run(task_loop, interactive).await?;
    println!(
        "\nDone: {} task(s) run ({:?}), {} key result(s).",
        outcome.tasks_run, outcome.stop_reason, outcome.key_results
    );
    if let Some(dir) = outcome.session_dir {
        println!("Session saved to {}", dir.display());
    }
    Ok(())
}

async fn run(task_loop: TaskLoop, interactive: bool) -> anyhow::Result<LoopOutcome> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let task_loop = task_loop.with_event_tx(event_tx);

    let result = if interactive {
        // 交互模式下事件在每次出菜单前输出，避免与菜单交错
        let events: SharedEvents = Arc::new(Mutex::new(event_rx));
        let selector =
            FlushingSelector::new(InteractiveSelector::stdio(), events.clone(), print_event);
        let mut task_loop = task_loop.with_selector(Box::new(selector));
        let result = task_loop.run().await;
        drain_events(&events, &mut |event| print_event(event));
        result
    } else {
        let printer = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                print_event(&event);
            }
        });
        let mut task_loop = task_loop;
        let result = task_loop.run().await;
        // 关闭发送端，让打印任务排空后退出
        drop(task_loop);
        let _ = printer.await;
        result
    };
    result.context("Research loop failed")
}

fn print_event(event: &ResearchEvent) {
    match event {
        ResearchEvent::Phase { .. } => {}
        ResearchEvent::TaskStarted { task_id, task } => {
            println!("\n*****TASK {task_id}*****\n{task}")
        }
        ResearchEvent::ToolCall { tool, params } => println!("Calling {tool} with {params}"),
        ResearchEvent::TaskCompleted { documents, .. } => {
            println!("Stored {documents} document(s).")
        }
        ResearchEvent::TaskNoResults { .. } => {
            println!("Task completed but returned no results.")
        }
        ResearchEvent::TaskFailed { reason, .. } => println!("Task failed: {reason}"),
        ResearchEvent::TasksAdded { tasks } => {
            println!("\n*****NEW TASKS*****");
            for task in tasks {
                println!("- {task}");
            }
        }
        ResearchEvent::SynthesisStarted { documents } => {
            println!("\n*****KEY RESULTS ({documents} documents)*****")
        }
        ResearchEvent::KeyResult { heading, body } => print!("{heading}{body}"),
        ResearchEvent::Persisted { path } => tracing::debug!(%path, "Session saved"),
        ResearchEvent::Warning { text } => println!("Warning: {text}"),
    }
}
