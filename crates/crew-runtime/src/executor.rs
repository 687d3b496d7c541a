//! Background execution of named, long-lived units of work.
//!
//! Each unit runs on its own OS thread and communicates with callers only
//! through its output accumulator (and the shared stores). Handles are
//! type-prefixed (`t7` for a teammate, `b3` for anything else) and stay
//! valid after the worker exits so late readers can still collect output.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("unknown handle '{0}'")]
    UnknownHandle(String),
}

/// What kind of unit a handle refers to; determines the handle prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Teammate,
    Background,
}

impl TaskType {
    fn prefix(self) -> &'static str {
        match self {
            TaskType::Teammate => "t",
            TaskType::Background => "b",
        }
    }
}

struct OutputBuf {
    text: String,
    cursor: usize,
    finished: bool,
}

struct TaskState {
    output: Mutex<OutputBuf>,
    wakeup: Condvar,
    stop: AtomicBool,
}

/// Handed to the worker closure: its output sink and stop signal.
#[derive(Clone)]
pub struct WorkerHandle {
    state: Arc<TaskState>,
}

impl WorkerHandle {
    /// Append text to the accumulator and wake blocked readers.
    pub fn push_output(&self, text: &str) {
        let mut buf = self
            .state
            .output
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        buf.text.push_str(text);
        self.state.wakeup.notify_all();
    }

    /// Cooperative stop signal, checked by loops at round boundaries.
    pub fn stop_requested(&self) -> bool {
        self.state.stop.load(Ordering::Relaxed)
    }
}

struct ExecutorInner {
    next_id: u64,
    tasks: HashMap<String, Arc<TaskState>>,
}

/// Runs named units of work concurrently and buffers their textual output.
pub struct BackgroundExecutor {
    inner: Mutex<ExecutorInner>,
}

impl BackgroundExecutor {
    pub fn new() -> Self {
        BackgroundExecutor {
            inner: Mutex::new(ExecutorInner {
                next_id: 0,
                tasks: HashMap::new(),
            }),
        }
    }

    /// Launch `work` on its own thread and return its handle synchronously.
    ///
    /// A panic inside the worker is captured and appended to the output
    /// stream as a terminal error line; it never propagates.
    pub fn run<F>(&self, work: F, task_type: TaskType) -> String
    where
        F: FnOnce(WorkerHandle) + Send + 'static,
    {
        let state = Arc::new(TaskState {
            output: Mutex::new(OutputBuf {
                text: String::new(),
                cursor: 0,
                finished: false,
            }),
            wakeup: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let handle_id = {
            let mut inner = self
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            inner.next_id += 1;
            let id = format!("{}{}", task_type.prefix(), inner.next_id);
            inner.tasks.insert(id.clone(), Arc::clone(&state));
            id
        };

        let worker = WorkerHandle {
            state: Arc::clone(&state),
        };
        debug!("starting background unit {handle_id}");

        std::thread::spawn(move || {
            let panicked = catch_unwind(AssertUnwindSafe(|| work(worker.clone()))).err();
            let mut buf = worker
                .state
                .output
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(panic) = panicked {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                buf.text.push_str(&format!("[error] worker failed: {detail}\n"));
            }
            buf.finished = true;
            worker.state.wakeup.notify_all();
        });

        handle_id
    }

    /// Return all output accumulated since the last read for this handle.
    ///
    /// With `block` set and no new output pending, waits up to `timeout`
    /// for the worker to produce more (or finish).
    ///
    /// # Errors
    ///
    /// `ExecutorError::UnknownHandle` when the handle was never issued.
    pub fn get_output(
        &self,
        handle: &str,
        block: bool,
        timeout: Duration,
    ) -> Result<String, ExecutorError> {
        let state = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tasks
            .get(handle)
            .cloned()
            .ok_or_else(|| ExecutorError::UnknownHandle(handle.to_string()))?;

        let mut buf = state.output.lock().unwrap_or_else(PoisonError::into_inner);
        if block && buf.cursor == buf.text.len() && !buf.finished {
            let (guard, _timed_out) = state
                .wakeup
                .wait_timeout_while(buf, timeout, |b| {
                    b.cursor == b.text.len() && !b.finished
                })
                .unwrap_or_else(PoisonError::into_inner);
            buf = guard;
        }

        let out = buf.text[buf.cursor..].to_string();
        buf.cursor = buf.text.len();
        Ok(out)
    }

    /// Request a cooperative stop. The worker observes it at its next
    /// round boundary; there is no mid-round cancellation.
    ///
    /// # Errors
    ///
    /// `ExecutorError::UnknownHandle` when the handle was never issued.
    pub fn stop(&self, handle: &str) -> Result<(), ExecutorError> {
        let state = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tasks
            .get(handle)
            .cloned()
            .ok_or_else(|| ExecutorError::UnknownHandle(handle.to_string()))?;
        state.stop.store(true, Ordering::Relaxed);
        state.wakeup.notify_all();
        Ok(())
    }

    /// Whether the worker behind `handle` has exited.
    ///
    /// # Errors
    ///
    /// `ExecutorError::UnknownHandle` when the handle was never issued.
    pub fn is_finished(&self, handle: &str) -> Result<bool, ExecutorError> {
        let state = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tasks
            .get(handle)
            .cloned()
            .ok_or_else(|| ExecutorError::UnknownHandle(handle.to_string()))?;
        let buf = state.output.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(buf.finished)
    }
}

impl Default for BackgroundExecutor {
    fn default() -> Self {
        Self::new()
    }
}
