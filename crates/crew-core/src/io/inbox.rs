//! Inbox file operations: locked append and atomic drain.
//!
//! An inbox is a newline-delimited JSON file, one [`Message`] per line,
//! guarded by an exclusive-create `.lock` sibling. Appends block (with
//! backoff) until the lock is free; drains make a single non-blocking
//! attempt and report nothing on contention, so two drainers can never
//! deliver the same message twice.

use crate::io::error::StoreError;
use crate::io::lock::{sibling_lock_path, SentinelLock, DEFAULT_LOCK_RETRIES};
use crate::schema::Message;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Append messages to an inbox under its lock, creating the file if needed.
///
/// One JSON object per line; the file handle is synced before the lock is
/// released, so a reader that wins the lock next sees complete lines.
///
/// # Errors
///
/// Returns `StoreError::LockTimeout` when the lock stays contended, or
/// `StoreError::Io` / `StoreError::Json` on write or encode failure.
pub fn inbox_append(inbox_path: &Path, messages: &[Message]) -> Result<(), StoreError> {
    if messages.is_empty() {
        return Ok(());
    }
    let lock_path = sibling_lock_path(inbox_path);
    let _lock = SentinelLock::acquire(&lock_path, DEFAULT_LOCK_RETRIES)?;

    let mut buf = Vec::new();
    for message in messages {
        serde_json::to_writer(&mut buf, message).map_err(|e| StoreError::Json {
            path: inbox_path.to_path_buf(),
            source: e,
        })?;
        buf.push(b'\n');
    }

    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(inbox_path)
        .map_err(|e| StoreError::io(inbox_path, e))?;
    file.write_all(&buf)
        .map_err(|e| StoreError::io(inbox_path, e))?;
    file.sync_all().map_err(|e| StoreError::io(inbox_path, e))?;
    Ok(())
}

/// Atomically read and clear an inbox.
///
/// Makes a single non-blocking lock attempt: if another sender or drainer
/// holds the lock, returns an empty list immediately and the caller retries
/// on its next loop iteration. With the lock held, all parseable lines are
/// returned in file order and the file is truncated to zero length. Lines
/// that fail to parse (a crash can leave a partial trailing line) are
/// skipped and logged.
///
/// # Errors
///
/// Returns `StoreError::Io` on read or truncate failure.
pub fn inbox_drain(inbox_path: &Path) -> Result<Vec<Message>, StoreError> {
    let lock_path = sibling_lock_path(inbox_path);
    let Some(_lock) = SentinelLock::try_acquire(&lock_path)? else {
        return Ok(Vec::new());
    };

    if !inbox_path.exists() {
        return Ok(Vec::new());
    }

    let content =
        fs::read_to_string(inbox_path).map_err(|e| StoreError::io(inbox_path, e))?;

    let mut messages = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(line) {
            Ok(msg) => messages.push(msg),
            Err(e) => {
                warn!(
                    "skipping corrupt inbox line in {}: {e}",
                    inbox_path.display()
                );
            }
        }
    }

    fs::write(inbox_path, b"").map_err(|e| StoreError::io(inbox_path, e))?;
    Ok(messages)
}

/// Whether the inbox currently holds undrained bytes. Used by idle loops to
/// poll cheaply without taking the lock.
pub fn inbox_has_mail(inbox_path: &Path) -> bool {
    fs::metadata(inbox_path).map(|m| m.len() > 0).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MessageType;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    fn msg(sender: &str, content: &str) -> Message {
        Message::new(MessageType::Message, sender, "alice", content)
    }

    #[test]
    fn append_creates_file_and_drain_clears_it() {
        let temp_dir = TempDir::new().unwrap();
        let inbox = temp_dir.path().join("inbox.alice.jsonl");

        inbox_append(&inbox, &[msg("lead", "ping")]).unwrap();
        assert!(inbox_has_mail(&inbox));

        let drained = inbox_drain(&inbox).unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].content, "ping");

        // Second drain sees nothing.
        assert!(inbox_drain(&inbox).unwrap().is_empty());
        assert!(!inbox_has_mail(&inbox));
    }

    #[test]
    fn drain_preserves_append_order() {
        let temp_dir = TempDir::new().unwrap();
        let inbox = temp_dir.path().join("inbox.alice.jsonl");

        for i in 0..5 {
            inbox_append(&inbox, &[msg("lead", &format!("m{i}"))]).unwrap();
        }

        let drained = inbox_drain(&inbox).unwrap();
        let contents: Vec<&str> = drained.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn drain_returns_empty_while_lock_held() {
        let temp_dir = TempDir::new().unwrap();
        let inbox = temp_dir.path().join("inbox.alice.jsonl");
        inbox_append(&inbox, &[msg("lead", "held back")]).unwrap();

        // Simulate an external holder by exclusive-creating the lock file.
        let lock_path = sibling_lock_path(&inbox);
        fs::write(&lock_path, b"").unwrap();

        assert!(inbox_drain(&inbox).unwrap().is_empty());
        assert!(inbox_has_mail(&inbox));

        fs::remove_file(&lock_path).unwrap();
        let drained = inbox_drain(&inbox).unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].content, "held back");
    }

    #[test]
    fn drain_skips_corrupt_trailing_line() {
        let temp_dir = TempDir::new().unwrap();
        let inbox = temp_dir.path().join("inbox.alice.jsonl");

        inbox_append(&inbox, &[msg("lead", "good")]).unwrap();
        // A crash between append and close can leave a partial line.
        let mut file = OpenOptions::new().append(true).open(&inbox).unwrap();
        file.write_all(b"{\"type\":\"message\",\"sen").unwrap();
        drop(file);

        let drained = inbox_drain(&inbox).unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].content, "good");
    }

    #[test]
    fn drain_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let inbox = temp_dir.path().join("inbox.ghost.jsonl");
        assert!(inbox_drain(&inbox).unwrap().is_empty());
    }

    #[test]
    fn concurrent_appends_lose_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let inbox = Arc::new(temp_dir.path().join("inbox.alice.jsonl"));
        let barrier = Arc::new(Barrier::new(4));

        let mut handles = Vec::new();
        for t in 0..4 {
            let inbox = Arc::clone(&inbox);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                for i in 0..5 {
                    inbox_append(&inbox, &[msg(&format!("sender-{t}"), &format!("{t}-{i}"))])
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let drained = inbox_drain(&inbox).unwrap();
        assert_eq!(drained.len(), 20);
        // Every message is intact JSON with its content preserved.
        for t in 0..4 {
            for i in 0..5 {
                let expected = format!("{t}-{i}");
                assert!(drained.iter().any(|m| m.content == expected));
            }
        }
    }

    #[test]
    fn concurrent_drains_deliver_exactly_once() {
        let temp_dir = TempDir::new().unwrap();
        let inbox = Arc::new(temp_dir.path().join("inbox.alice.jsonl"));

        let batch: Vec<Message> = (0..10).map(|i| msg("lead", &format!("m{i}"))).collect();
        inbox_append(&inbox, &batch).unwrap();

        let barrier = Arc::new(Barrier::new(3));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let inbox = Arc::clone(&inbox);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                inbox_drain(&inbox).unwrap()
            }));
        }

        let total: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap().len())
            .sum();
        // Losers of the lock race return empty; nobody double-delivers.
        assert_eq!(total, 10);
    }
}
