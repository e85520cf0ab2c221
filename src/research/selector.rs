//! 任务选择：默认先进先出；交互模式下由用户从编号菜单中挑选，0 表示手写任务

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedReceiver;

use crate::core::Task;
use crate::research::ResearchEvent;

pub trait TaskSelector: Send {
    /// 从队列中取出下一个任务；队列为空时返回 None
    fn select(&mut self, queue: &mut VecDeque<String>) -> Option<Task>;
}

/// 取队首
#[derive(Debug, Default)]
pub struct FifoSelector;

impl TaskSelector for FifoSelector {
    fn select(&mut self, queue: &mut VecDeque<String>) -> Option<Task> {
        queue.pop_front().map(Task::generated)
    }
}

/// 交互式选择；输入结束（EOF）后退回先进先出
pub struct InteractiveSelector<R, W> {
    input: R,
    output: W,
    exhausted: bool,
}

impl<R: BufRead, W: Write> InteractiveSelector<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            exhausted: false,
        }
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => {
                self.exhausted = true;
                None
            }
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    fn prompt(&mut self, text: &str) {
        let _ = write!(self.output, "{text}");
        let _ = self.output.flush();
    }
}

impl InteractiveSelector<std::io::BufReader<std::io::Stdin>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::BufReader::new(std::io::stdin()), std::io::stdout())
    }
}

impl<R: BufRead + Send, W: Write + Send> TaskSelector for InteractiveSelector<R, W> {
    fn select(&mut self, queue: &mut VecDeque<String>) -> Option<Task> {
        if queue.is_empty() {
            return None;
        }
        while !self.exhausted {
            let mut menu = String::from("\n");
            for (i, task) in queue.iter().enumerate() {
                menu.push_str(&format!("{}. {}\n", i + 1, task));
            }
            menu.push_str("Which task would you like to execute? Type 0 to create your own task! ");
            self.prompt(&menu);

            let Some(line) = self.read_line() else { break };
            match line.parse::<usize>() {
                Ok(0) => {
                    self.prompt("Write your task! ");
                    match self.read_line() {
                        Some(task) if !task.is_empty() => return Some(Task::user(task)),
                        Some(_) => continue,
                        None => break,
                    }
                }
                Ok(n) if n <= queue.len() => return queue.remove(n - 1).map(Task::generated),
                _ => {
                    let msg = format!("Input must be between 0 and {}.\n", queue.len());
                    self.prompt(&msg);
                }
            }
        }
        tracing::debug!("Interactive input closed, falling back to queue order");
        queue.pop_front().map(Task::generated)
    }
}

/// 共享的事件接收端：选择器在提示前排空，运行结束后由调用方排空剩余事件
pub type SharedEvents = Arc<Mutex<UnboundedReceiver<ResearchEvent>>>;

/// 排空共享接收端中已到达的事件
pub fn drain_events(events: &SharedEvents, render: &mut dyn FnMut(&ResearchEvent)) {
    let Ok(mut rx) = events.lock() else { return };
    while let Ok(event) = rx.try_recv() {
        render(&event);
    }
}

/// 先输出积压的过程事件，再把选择交给内部选择器；
/// 内部选择在 block_in_place 中进行，阻塞读输入不占用异步工作线程
pub struct FlushingSelector<S> {
    inner: S,
    events: SharedEvents,
    render: Box<dyn FnMut(&ResearchEvent) + Send>,
}

impl<S: TaskSelector> FlushingSelector<S> {
    pub fn new(
        inner: S,
        events: SharedEvents,
        render: impl FnMut(&ResearchEvent) + Send + 'static,
    ) -> Self {
        Self {
            inner,
            events,
            render: Box::new(render),
        }
    }
}

impl<S: TaskSelector> TaskSelector for FlushingSelector<S> {
    fn select(&mut self, queue: &mut VecDeque<String>) -> Option<Task> {
        drain_events(&self.events, &mut *self.render);
        tokio::task::block_in_place(|| self.inner.select(queue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskOrigin;
    use std::io::Cursor;

    fn queue() -> VecDeque<String> {
        VecDeque::from(vec![
            "MYGENE: BRCA1".to_string(),
            "PUBMED: BRCA1 review".to_string(),
            "MYVARIANT: rs80357906".to_string(),
        ])
    }

    #[test]
    fn test_fifo() {
        let mut q = queue();
        let task = FifoSelector.select(&mut q).unwrap();
        assert_eq!(task.text, "MYGENE: BRCA1");
        assert_eq!(q.len(), 2);
        assert!(FifoSelector.select(&mut VecDeque::new()).is_none());
    }

    #[test]
    fn test_pick_by_number_after_invalid_input() {
        let mut q = queue();
        let mut out = Vec::new();
        let mut selector = InteractiveSelector::new(Cursor::new("abc\n9\n2\n"), &mut out);
        let task = selector.select(&mut q).unwrap();
        assert_eq!(task.text, "PUBMED: BRCA1 review");
        assert_eq!(task.origin, TaskOrigin::Generated);
        assert_eq!(
            q,
            VecDeque::from(vec![
                "MYGENE: BRCA1".to_string(),
                "MYVARIANT: rs80357906".to_string()
            ])
        );
        drop(selector);
        let shown = String::from_utf8(out).unwrap();
        assert_eq!(shown.matches("Input must be between 0 and 3.").count(), 2);
    }

    #[test]
    fn test_user_authored_task() {
        let mut q = queue();
        let mut selector =
            InteractiveSelector::new(Cursor::new("0\nSummarise BRCA1 function\n"), Vec::new());
        let task = selector.select(&mut q).unwrap();
        assert_eq!(task, Task::user("Summarise BRCA1 function"));
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn test_pending_events_render_before_selection() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let events: SharedEvents = Arc::new(Mutex::new(rx));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut selector = FlushingSelector::new(FifoSelector, events.clone(), move |event| {
            if let ResearchEvent::TasksAdded { tasks } = event {
                sink.lock().unwrap().extend(tasks.iter().cloned());
            }
        });

        tx.send(ResearchEvent::TasksAdded {
            tasks: vec!["PUBMED: BRCA1 review".to_string()],
        })
        .unwrap();
        let mut q = queue();
        assert_eq!(selector.select(&mut q).unwrap().text, "MYGENE: BRCA1");
        assert_eq!(*seen.lock().unwrap(), vec!["PUBMED: BRCA1 review"]);

        tx.send(ResearchEvent::TasksAdded {
            tasks: vec!["late".to_string()],
        })
        .unwrap();
        let mut rest = Vec::new();
        drain_events(&events, &mut |e| rest.push(format!("{e:?}")));
        assert_eq!(rest.len(), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_eof_falls_back_to_fifo() {
        let mut q = queue();
        let mut selector = InteractiveSelector::new(Cursor::new(""), Vec::new());
        assert_eq!(selector.select(&mut q).unwrap().text, "MYGENE: BRCA1");
        assert_eq!(selector.select(&mut q).unwrap().text, "PUBMED: BRCA1 review");
    }
}
