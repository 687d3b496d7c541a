//! Durable file I/O: locking, atomic replacement, and inbox files.

pub mod atomic;
pub mod error;
pub mod inbox;
pub mod lock;

pub use error::StoreError;
