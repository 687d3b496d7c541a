//! Core types and durable I/O for agent-crew
//!
//! This crate provides the on-disk data model shared by every agent in a
//! crew: message envelopes, task records, and team configuration, plus the
//! locking and atomic-write primitives that keep those files consistent when
//! several agents (or several processes) touch them concurrently.
//!
//! All schema types are designed to:
//! - Preserve unknown fields for forward compatibility
//! - Use proper serde configuration for camelCase ↔ snake_case
//! - Support round-trip serialization without data loss

pub mod home;
pub mod io;
pub mod logging;
pub mod schema;
pub mod text;

pub use schema::{MemberEntry, Message, MessageType, Task, TaskStatus, TeamConfig, TeammateStatus};
