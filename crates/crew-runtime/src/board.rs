//! Shared task board.
//!
//! A single JSON document (`tasks/board.json`) holding every task, mutated
//! read-modify-write under an advisory lock on `board.json.lock` and
//! persisted by atomic rename. Multiple agents in this process, and other
//! processes sharing the directory, observe a consistent view.
//!
//! Claiming is not a primitive: a worker claims by updating `owner` and
//! `status` on a task it observed as pending/unowned/unblocked, then
//! re-reading to detect a lost race. The board itself only guarantees that
//! conflicting writers serialize (last writer wins, no torn state).

use crate::error::RuntimeError;
use agent_crew_core::io::atomic::atomic_replace_json;
use agent_crew_core::io::lock::{sibling_lock_path, FileLock, DEFAULT_LOCK_RETRIES};
use agent_crew_core::io::StoreError;
use agent_crew_core::schema::{Task, TaskStatus};
use std::collections::HashMap;
use std::path::PathBuf;

/// Field-presence update: only populated fields are applied.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub status: Option<TaskStatus>,
    pub owner: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub add_blocked_by: Vec<String>,
    pub remove_blocked_by: Vec<String>,
}

/// Durable, process-safe registry of work items.
pub struct TaskBoard {
    board_path: PathBuf,
    lock_path: PathBuf,
}

impl TaskBoard {
    pub fn new(board_path: PathBuf) -> Self {
        let lock_path = sibling_lock_path(&board_path);
        TaskBoard {
            board_path,
            lock_path,
        }
    }

    fn read_tasks(&self) -> Result<Vec<Task>, RuntimeError> {
        if !self.board_path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.board_path)
            .map_err(|e| StoreError::Io {
                path: self.board_path.clone(),
                source: e,
            })?;
        let tasks = serde_json::from_str(&content).map_err(|e| StoreError::Json {
            path: self.board_path.clone(),
            source: e,
        })?;
        Ok(tasks)
    }

    fn persist(&self, tasks: &[Task]) -> Result<(), RuntimeError> {
        atomic_replace_json(&self.board_path, &tasks)?;
        Ok(())
    }

    /// Create a task with the next integer id (starting at 1).
    ///
    /// # Errors
    ///
    /// Fails on lock timeout or board file corruption.
    pub fn create(&self, subject: &str, body: Option<String>) -> Result<Task, RuntimeError> {
        let _lock = FileLock::acquire(&self.lock_path, DEFAULT_LOCK_RETRIES)?;
        let mut tasks = self.read_tasks()?;

        let next_id = tasks
            .iter()
            .filter_map(|t| t.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let now = chrono::Utc::now().to_rfc3339();
        let task = Task {
            id: next_id.to_string(),
            subject: subject.to_string(),
            body,
            status: TaskStatus::Pending,
            owner: None,
            blocked_by: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
            unknown_fields: HashMap::new(),
        };

        tasks.push(task.clone());
        self.persist(&tasks)?;
        Ok(task)
    }

    /// Fetch one task.
    ///
    /// # Errors
    ///
    /// `RuntimeError::TaskNotFound` for unknown ids.
    pub fn get(&self, id: &str) -> Result<Task, RuntimeError> {
        self.read_tasks()?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| RuntimeError::TaskNotFound(id.to_string()))
    }

    /// All tasks ordered by id.
    pub fn list_all(&self) -> Result<Vec<Task>, RuntimeError> {
        let mut tasks = self.read_tasks()?;
        tasks.sort_by_key(|t| t.id.parse::<u64>().unwrap_or(u64::MAX));
        Ok(tasks)
    }

    /// Tasks a worker may claim: pending, unowned, unblocked.
    pub fn claimable(&self) -> Result<Vec<Task>, RuntimeError> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(Task::is_claimable)
            .collect())
    }

    /// Apply the populated fields of `changes` to a task.
    ///
    /// When the status becomes terminal (`completed` or `cancelled`), the
    /// task id is removed from every other task's `blocked_by` in the same
    /// write.
    ///
    /// # Errors
    ///
    /// `RuntimeError::TaskNotFound` for unknown ids; store errors otherwise.
    pub fn update(&self, id: &str, changes: TaskChanges) -> Result<Task, RuntimeError> {
        let _lock = FileLock::acquire(&self.lock_path, DEFAULT_LOCK_RETRIES)?;
        let mut tasks = self.read_tasks()?;

        let index = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| RuntimeError::TaskNotFound(id.to_string()))?;

        let now = chrono::Utc::now().to_rfc3339();
        {
            let task = &mut tasks[index];
            if let Some(subject) = changes.subject {
                task.subject = subject;
            }
            if let Some(body) = changes.body {
                task.body = Some(body);
            }
            if let Some(owner) = changes.owner {
                task.owner = Some(owner);
            }
            if let Some(status) = changes.status {
                task.status = status;
            }
            for blocker in changes.add_blocked_by {
                if blocker != task.id && !task.blocked_by.contains(&blocker) {
                    task.blocked_by.push(blocker);
                }
            }
            if !changes.remove_blocked_by.is_empty() {
                task.blocked_by
                    .retain(|b| !changes.remove_blocked_by.contains(b));
            }
            task.updated_at = now.clone();
        }

        // Unblock sweep: a terminal task stops blocking everything else.
        if tasks[index].status.is_terminal() {
            let done_id = tasks[index].id.clone();
            for task in &mut tasks {
                if task.blocked_by.iter().any(|b| *b == done_id) {
                    task.blocked_by.retain(|b| *b != done_id);
                    task.updated_at = now.clone();
                }
            }
        }

        self.persist(&tasks)?;
        Ok(tasks[index].clone())
    }
}
