//! Core types for rowstream.
//!
//! Defines the event model shared by connectors and the capture engine:
//! the [`CapturedEvent`] record, the [`Cursor`] watermark value, and the
//! [`SourceConfig`] describing one capture task. Pure data — no I/O lives
//! in this crate.

pub mod config;
pub mod error;
pub mod event;

// Re-export key types at crate root for convenience.
pub use config::{SnapshotMode, SourceConfig};
pub use error::{CoreError, Result};
pub use event::{CapturedEvent, Cursor, EventKind, SourceKind};

/// Get current timestamp in milliseconds since epoch.
pub fn current_timestamp_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("System time before UNIX epoch")
        .as_millis() as i64
}
