//! Serialized execution of visual updates.
//!
//! At most one task runs at a time, in enqueue order. A failing or panicking
//! task is logged and the queue moves on.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Presentation target for rendered values.
pub trait RenderSink: Send + Sync {
    fn apply(&self, field: &str, text: &str) -> Result<(), String>;
}

/// Sink that writes every update to the log.
pub struct TracingSink;

impl RenderSink for TracingSink {
    fn apply(&self, field: &str, text: &str) -> Result<(), String> {
        info!(field, value = text, "Metric updated");
        Ok(())
    }
}

type TaskFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

pub struct AnimationTask {
    target: String,
    run: TaskFuture,
}

impl AnimationTask {
    pub fn new<F>(target: impl Into<String>, run: F) -> Self
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        Self {
            target: target.into(),
            run: Box::pin(run),
        }
    }

    /// Push `text` to the sink, then hold for the transition.
    pub fn flip(sink: Arc<dyn RenderSink>, field: &str, text: String, duration: Duration) -> Self {
        let target = field.to_string();
        let field = target.clone();
        Self::new(target, async move {
            sink.apply(&field, &text)?;
            tokio::time::sleep(duration).await;
            Ok(())
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed,
    Failed(String),
    /// Removed by [`RenderScheduler::clear`] before it started.
    Cleared,
}

/// Resolves once the task has run or been cleared.
pub struct TaskHandle {
    done: oneshot::Receiver<TaskOutcome>,
}

impl Future for TaskHandle {
    type Output = TaskOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<TaskOutcome> {
        Pin::new(&mut self.done)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(TaskOutcome::Cleared))
    }
}

struct Queued {
    task: AnimationTask,
    done: oneshot::Sender<TaskOutcome>,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Queued>,
    processing: bool,
}

#[derive(Clone, Default)]
pub struct RenderScheduler {
    state: Arc<Mutex<QueueState>>,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task. Starts a drain on the current tokio runtime when the
    /// scheduler is idle.
    pub fn enqueue(&self, task: AnimationTask) -> TaskHandle {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            debug!(target_field = task.target(), queued = state.queue.len(), "Enqueued visual update");
            state.queue.push_back(Queued { task, done: tx });
            !std::mem::replace(&mut state.processing, true)
        };
        if start {
            tokio::spawn(self.clone().drain());
        }
        TaskHandle { done: rx }
    }

    /// Drop every task that has not started. The running one is unaffected.
    pub fn clear(&self) -> usize {
        let dropped: Vec<Queued> = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.queue.drain(..).collect()
        };
        let count = dropped.len();
        for queued in dropped {
            let _ = queued.done.send(TaskOutcome::Cleared);
        }
        if count > 0 {
            debug!(count, "Cleared pending visual updates");
        }
        count
    }

    pub fn is_idle(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        !state.processing && state.queue.is_empty()
    }

    pub fn pending(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.queue.len()
    }

    async fn drain(self) {
        loop {
            let next = {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                match state.queue.pop_front() {
                    Some(next) => next,
                    None => {
                        state.processing = false;
                        return;
                    }
                }
            };

            let Queued { task, done } = next;
            let target = task.target;
            let outcome = match tokio::spawn(task.run).await {
                Ok(Ok(())) => TaskOutcome::Completed,
                Ok(Err(reason)) => {
                    warn!(target_field = %target, error = %reason, "Visual update failed");
                    TaskOutcome::Failed(reason)
                }
                Err(e) => {
                    let reason = if e.is_panic() {
                        "visual update panicked".to_string()
                    } else {
                        "visual update cancelled".to_string()
                    };
                    warn!(target_field = %target, error = %reason, "Visual update aborted");
                    TaskOutcome::Failed(reason)
                }
            };
            let _ = done.send(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    type Log = Arc<Mutex<Vec<(String, &'static str, u64)>>>;

    fn timed(log: &Log, origin: Instant, name: &str, hold: Duration) -> AnimationTask {
        let log = log.clone();
        let label = name.to_string();
        AnimationTask::new(name, async move {
            let at = || origin.elapsed().as_millis() as u64;
            log.lock().unwrap().push((label.clone(), "start", at()));
            tokio::time::sleep(hold).await;
            log.lock().unwrap().push((label, "end", at()));
            Ok(())
        })
    }

    #[derive(Default)]
    struct RecordingSink {
        applied: Mutex<Vec<(String, String)>>,
    }

    impl RenderSink for RecordingSink {
        fn apply(&self, field: &str, text: &str) -> Result<(), String> {
            if field == "broken" {
                return Err("no such element".to_string());
            }
            self.applied
                .lock()
                .unwrap()
                .push((field.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_in_order_without_overlap() {
        let scheduler = RenderScheduler::new();
        let log: Log = Arc::default();
        let origin = Instant::now();

        let a = scheduler.enqueue(timed(&log, origin, "a", Duration::from_millis(300)));
        let b = scheduler.enqueue(timed(&log, origin, "b", Duration::from_millis(100)));
        let c = scheduler.enqueue(timed(&log, origin, "c", Duration::from_millis(200)));
        assert!(!scheduler.is_idle());

        assert_eq!(c.await, TaskOutcome::Completed);
        assert_eq!(a.await, TaskOutcome::Completed);
        assert_eq!(b.await, TaskOutcome::Completed);

        let log = log.lock().unwrap().clone();
        let order: Vec<(&str, &str)> = log.iter().map(|(n, e, _)| (n.as_str(), *e)).collect();
        assert_eq!(
            order,
            vec![("a", "start"), ("a", "end"), ("b", "start"), ("b", "end"), ("c", "start"), ("c", "end")]
        );
        for pair in log.windows(2) {
            assert!(pair[0].2 <= pair[1].2);
        }
    }

    async fn explode() -> Result<(), String> {
        panic!("render exploded")
    }

    #[tokio::test(start_paused = true)]
    async fn failure_and_panic_do_not_stop_the_queue() {
        let scheduler = RenderScheduler::new();
        let failing = scheduler.enqueue(AnimationTask::new("x", async { Err("boom".to_string()) }));
        let panicking = scheduler.enqueue(AnimationTask::new("y", explode()));
        let fine = scheduler.enqueue(AnimationTask::new("z", async { Ok(()) }));

        assert_eq!(failing.await, TaskOutcome::Failed("boom".to_string()));
        assert_eq!(
            panicking.await,
            TaskOutcome::Failed("visual update panicked".to_string())
        );
        assert_eq!(fine.await, TaskOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_pending_but_not_running() {
        let scheduler = RenderScheduler::new();
        let log: Log = Arc::default();
        let origin = Instant::now();

        let running = scheduler.enqueue(timed(&log, origin, "running", Duration::from_millis(500)));
        let queued = scheduler.enqueue(timed(&log, origin, "queued", Duration::from_millis(500)));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.clear(), 1);
        assert_eq!(queued.await, TaskOutcome::Cleared);
        assert_eq!(running.await, TaskOutcome::Completed);

        let names: Vec<String> = log.lock().unwrap().iter().map(|(n, _, _)| n.clone()).collect();
        assert!(names.iter().all(|n| n == "running"));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_to_idle_and_restarts() {
        let scheduler = RenderScheduler::new();
        assert!(scheduler.is_idle());
        let first = scheduler.enqueue(AnimationTask::new("a", async { Ok(()) }));
        assert_eq!(first.await, TaskOutcome::Completed);
        assert!(scheduler.is_idle());

        let again = scheduler.enqueue(AnimationTask::new("b", async { Ok(()) }));
        assert_eq!(again.await, TaskOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn three_flips_take_three_transitions() {
        let scheduler = RenderScheduler::new();
        let sink = Arc::new(RecordingSink::default());
        let transition = Duration::from_millis(600);
        let started = Instant::now();

        let handles: Vec<TaskHandle> = ["totalBakers", "cycle", "rollups"]
            .iter()
            .map(|field| {
                scheduler.enqueue(AnimationTask::flip(
                    sink.clone(),
                    field,
                    format!("{field}-value"),
                    transition,
                ))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await, TaskOutcome::Completed);
        }

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1800));
        assert!(elapsed < Duration::from_millis(1900));
        let fields: Vec<String> = sink.applied.lock().unwrap().iter().map(|(f, _)| f.clone()).collect();
        assert_eq!(fields, vec!["totalBakers", "cycle", "rollups"]);
    }

    #[tokio::test(start_paused = true)]
    async fn flip_reports_sink_errors() {
        let scheduler = RenderScheduler::new();
        let sink = Arc::new(RecordingSink::default());
        let outcome = scheduler
            .enqueue(AnimationTask::flip(sink, "broken", "1".to_string(), Duration::from_millis(600)))
            .await;
        assert_eq!(outcome, TaskOutcome::Failed("no such element".to_string()));
    }
}
