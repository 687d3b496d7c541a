//! Schema types shared by every agent in a crew.

pub mod member;
pub mod message;
pub mod task;
pub mod team_config;

pub use member::{MemberEntry, TeammateStatus};
pub use message::{Message, MessageType};
pub use task::{Task, TaskStatus};
pub use team_config::TeamConfig;
