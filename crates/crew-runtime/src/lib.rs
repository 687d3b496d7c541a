//! Multi-agent coordination runtime for agent-crew
//!
//! The runtime spawns persistent worker agents ("teammates") organized into
//! named teams, mediates message passing through durable file-backed
//! inboxes, arbitrates shared work through a concurrent task board with
//! dependency blocking, and drives each agent through a uniform
//! tool-invocation loop against an LLM backend.
//!
//! Entry points:
//! - [`context::RuntimeContext`] wires the shared pieces together.
//! - [`agent::UserAgent`] is the top-level, user-driven loop.
//! - [`registry::TeammateRegistry::spawn`] starts worker loops.

pub mod agent;
pub mod board;
pub mod compact;
pub mod context;
pub mod error;
pub mod executor;
pub mod inbox;
pub mod oracle;
pub mod protocol;
pub mod registry;
pub mod tools;

pub use agent::UserAgent;
pub use board::{TaskBoard, TaskChanges};
pub use context::{LoopConfig, RuntimeContext, RuntimePaths};
pub use error::RuntimeError;
pub use executor::{BackgroundExecutor, TaskType, WorkerHandle};
pub use oracle::{ChatMessage, ContentBlock, Oracle, OracleRequest, OracleResponse, StopReason};
pub use registry::{Teammate, TeammateRegistry, TEAMMATE_COLORS};
