//! Process-wide runtime wiring.
//!
//! Everything an agent loop needs (paths, oracle, executor, board,
//! registry, shutdown bookkeeping) is threaded through one
//! [`RuntimeContext`] value instead of ambient globals, so tests can build
//! fully isolated runtimes in a temp directory.

use crate::board::TaskBoard;
use crate::compact::CompactionPolicy;
use crate::executor::BackgroundExecutor;
use crate::oracle::Oracle;
use crate::protocol::PendingShutdowns;
use crate::registry::TeammateRegistry;
use agent_crew_core::text::sanitize_name;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// On-disk layout under the runtime root.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    root: PathBuf,
}

impl RuntimePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        RuntimePaths { root: root.into() }
    }

    /// Resolve the default root (`$CREW_HOME`, else `<home>/.crew`).
    pub fn discover() -> Result<Self> {
        Ok(RuntimePaths::new(
            agent_crew_core::home::default_runtime_root()?,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn teams_dir(&self) -> PathBuf {
        self.root.join("teams")
    }

    pub fn team_dir(&self, team: &str) -> PathBuf {
        self.teams_dir().join(team)
    }

    pub fn team_config_path(&self, team: &str) -> PathBuf {
        self.team_dir(team).join("config.json")
    }

    pub fn inbox_path(&self, team: &str, name: &str) -> PathBuf {
        let safe = sanitize_name(name).unwrap_or_else(|_| "_".to_string());
        self.team_dir(team).join(format!("inbox.{safe}.jsonl"))
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join("tasks")
    }

    pub fn board_path(&self) -> PathBuf {
        self.tasks_dir().join("board.json")
    }
}

/// Tunables for agent loops and leaf tools.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Token ceiling for each model reply.
    pub max_model_tokens: u32,
    /// Wall-clock budget for the bash leaf tool.
    pub bash_timeout: Duration,
    /// Poll interval while a teammate idles on its inbox.
    pub idle_poll_interval: Duration,
    /// Truncation threshold for leaf tool output.
    pub max_tool_output_chars: usize,
    /// Context compaction policy.
    pub compaction: CompactionPolicy,
}

impl Default for LoopConfig {
    fn default() -> Self {
        LoopConfig {
            max_model_tokens: 4_096,
            bash_timeout: Duration::from_secs(120),
            idle_poll_interval: Duration::from_millis(100),
            max_tool_output_chars: 30_000,
            compaction: CompactionPolicy::default(),
        }
    }
}

/// Shared runtime state: one per process (or per test).
pub struct RuntimeContext {
    pub paths: RuntimePaths,
    pub workspace_root: PathBuf,
    pub config: LoopConfig,
    pub oracle: Arc<dyn Oracle>,
    pub executor: BackgroundExecutor,
    pub board: TaskBoard,
    pub registry: TeammateRegistry,
    pub pending_shutdowns: PendingShutdowns,
}

impl RuntimeContext {
    /// Build a runtime rooted at `root`, with leaf tools confined to
    /// `workspace_root`.
    ///
    /// # Errors
    ///
    /// Fails when the `teams/` and `tasks/` directories cannot be created.
    pub fn new(
        root: impl Into<PathBuf>,
        workspace_root: impl Into<PathBuf>,
        oracle: Arc<dyn Oracle>,
        config: LoopConfig,
    ) -> Result<Arc<Self>> {
        let paths = RuntimePaths::new(root);
        std::fs::create_dir_all(paths.teams_dir())
            .with_context(|| format!("creating {}", paths.teams_dir().display()))?;
        std::fs::create_dir_all(paths.tasks_dir())
            .with_context(|| format!("creating {}", paths.tasks_dir().display()))?;

        let board = TaskBoard::new(paths.board_path());
        let registry = TeammateRegistry::new(paths.clone());

        Ok(Arc::new(RuntimeContext {
            paths,
            workspace_root: workspace_root.into(),
            config,
            oracle,
            executor: BackgroundExecutor::new(),
            board,
            registry,
            pending_shutdowns: PendingShutdowns::default(),
        }))
    }
}
