//! Leaf tools: bash, read_file, write_file, edit_file.
//!
//! Side-effecting primitives confined to the workspace root. `bash` carries
//! a dangerous-command prefilter and a wall-clock timeout; the file tools
//! reject any target that resolves outside the workspace.

use crate::context::LoopConfig;
use crate::error::RuntimeError;
use agent_crew_core::text::truncate_chars;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

const TRUNCATION_SUFFIX: &str = "\n... (output truncated)";

/// Substrings that make the prefilter refuse a command outright.
const DANGEROUS_PATTERNS: &[&str] = &[
    "rm -rf /",
    "rm -rf ~",
    "rm -rf *",
    "mkfs",
    "dd if=",
    ":(){",
    "> /dev/sd",
    "chmod -R 777 /",
];

fn dangerous_pattern(command: &str) -> Option<&'static str> {
    if command.trim_start().starts_with("sudo ") {
        return Some("sudo");
    }
    DANGEROUS_PATTERNS
        .iter()
        .find(|pat| command.contains(**pat))
        .copied()
}

/// Normalize `user_path` against the workspace root, rejecting escapes.
///
/// `..` components are resolved lexically; anything that climbs above the
/// root, or an absolute path outside it, is refused.
///
/// # Errors
///
/// `RuntimeError::PathEscape` when the target leaves the workspace.
pub fn resolve_workspace_path(root: &Path, user_path: &str) -> Result<PathBuf, RuntimeError> {
    let requested = Path::new(user_path);
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(RuntimeError::PathEscape(format!(
                        "'{user_path}' escapes the workspace root"
                    )));
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }

    if !normalized.starts_with(root) {
        return Err(RuntimeError::PathEscape(format!(
            "'{user_path}' escapes the workspace root"
        )));
    }
    Ok(normalized)
}

/// Run a shell command with the configured timeout.
///
/// stdout and stderr are drained on reader threads (a full pipe must never
/// wedge the poll loop) and combined; a non-zero exit is reported inline.
///
/// # Errors
///
/// `Dangerous` from the prefilter, `TimedOut` on wall-clock expiry.
pub fn run_bash(
    workspace_root: &Path,
    config: &LoopConfig,
    command: &str,
) -> Result<String, RuntimeError> {
    if let Some(pattern) = dangerous_pattern(command) {
        return Err(RuntimeError::Dangerous(format!(
            "refusing command matching '{pattern}'"
        )));
    }

    debug!("bash: {command}");
    let mut child = Command::new("bash")
        .arg("-c")
        .arg(command)
        .current_dir(workspace_root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| RuntimeError::InvalidInput(format!("failed to spawn bash: {e}")))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_reader = std::thread::spawn(move || {
        let mut out = String::new();
        if let Some(mut pipe) = stdout {
            let _ = pipe.read_to_string(&mut out);
        }
        out
    });
    let stderr_reader = std::thread::spawn(move || {
        let mut out = String::new();
        if let Some(mut pipe) = stderr {
            let _ = pipe.read_to_string(&mut out);
        }
        out
    });

    let deadline = Instant::now() + config.bash_timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_reader.join();
                    let _ = stderr_reader.join();
                    return Err(RuntimeError::TimedOut(format!(
                        "command exceeded {}s",
                        config.bash_timeout.as_secs()
                    )));
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => {
                return Err(RuntimeError::InvalidInput(format!(
                    "failed to wait for bash: {e}"
                )))
            }
        }
    };

    let mut output = stdout_reader.join().unwrap_or_default();
    let errors = stderr_reader.join().unwrap_or_default();
    if !errors.is_empty() {
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&errors);
    }
    if output.trim().is_empty() {
        output = "(no output)".to_string();
    }
    if !status.success() {
        let code = status.code().unwrap_or(-1);
        output.push_str(&format!("\n(exit code {code})"));
    }
    Ok(truncate_chars(
        &output,
        config.max_tool_output_chars,
        TRUNCATION_SUFFIX,
    ))
}

/// Read a workspace file.
///
/// # Errors
///
/// `PathEscape` for targets outside the workspace, `InvalidInput` when the
/// file cannot be read.
pub fn read_file(
    workspace_root: &Path,
    config: &LoopConfig,
    path: &str,
) -> Result<String, RuntimeError> {
    let resolved = resolve_workspace_path(workspace_root, path)?;
    let content = std::fs::read_to_string(&resolved)
        .map_err(|e| RuntimeError::InvalidInput(format!("cannot read '{path}': {e}")))?;
    Ok(truncate_chars(
        &content,
        config.max_tool_output_chars,
        TRUNCATION_SUFFIX,
    ))
}

/// Create or overwrite a workspace file, creating parent directories.
///
/// # Errors
///
/// `PathEscape` for targets outside the workspace, `InvalidInput` on write
/// failure.
pub fn write_file(
    workspace_root: &Path,
    path: &str,
    content: &str,
) -> Result<String, RuntimeError> {
    let resolved = resolve_workspace_path(workspace_root, path)?;
    if let Some(parent) = resolved.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| RuntimeError::InvalidInput(format!("cannot create '{path}': {e}")))?;
    }
    std::fs::write(&resolved, content)
        .map_err(|e| RuntimeError::InvalidInput(format!("cannot write '{path}': {e}")))?;
    Ok(format!("Wrote {} bytes to {path}", content.len()))
}

/// Replace the first occurrence of `old_string` in a workspace file.
///
/// # Errors
///
/// `PathEscape` for targets outside the workspace, `InvalidInput` when the
/// file is unreadable or `old_string` is absent.
pub fn edit_file(
    workspace_root: &Path,
    path: &str,
    old_string: &str,
    new_string: &str,
) -> Result<String, RuntimeError> {
    if old_string.is_empty() {
        return Err(RuntimeError::InvalidInput(
            "old_string must not be empty".to_string(),
        ));
    }
    let resolved = resolve_workspace_path(workspace_root, path)?;
    let content = std::fs::read_to_string(&resolved)
        .map_err(|e| RuntimeError::InvalidInput(format!("cannot read '{path}': {e}")))?;
    if !content.contains(old_string) {
        return Err(RuntimeError::InvalidInput(format!(
            "old_string not found in '{path}'"
        )));
    }
    let edited = content.replacen(old_string, new_string, 1);
    std::fs::write(&resolved, edited)
        .map_err(|e| RuntimeError::InvalidInput(format!("cannot write '{path}': {e}")))?;
    Ok(format!("Edited {path}"))
}
