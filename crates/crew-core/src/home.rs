//! Canonical home and runtime-root resolution for agent-crew
//!
//! A single source of truth for where the crew keeps its state. The
//! `CREW_HOME` environment variable takes precedence so tests and custom
//! deployments can redirect everything into a scratch directory; otherwise
//! the platform home directory is used.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Resolve the home directory for crew operations.
///
/// # Precedence
///
/// 1. `CREW_HOME` environment variable (if set and non-empty)
/// 2. `dirs::home_dir()` platform default
///
/// # Errors
///
/// Fails only when `CREW_HOME` is unset and the platform home directory
/// cannot be determined.
pub fn get_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("CREW_HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    dirs::home_dir().context("Could not determine home directory")
}

/// Default root for runtime state (`teams/`, `tasks/`).
///
/// `$CREW_HOME` if set, otherwise `<home>/.crew`.
pub fn default_runtime_root() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("CREW_HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    Ok(get_home_dir()?.join(".crew"))
}
