//! Source connectors for rowstream.
//!
//! Defines the [`SourceConnector`] contract the capture engine drives, and
//! the reference implementations:
//!
//! - **MySQL** and **PostgreSQL** — incremental polling over an
//!   auto-discovered natural cursor column, via `sqlx` connection pools.
//! - **Memory** — a scripted in-process source for tests and demos.
//!
//! Connectors never retry internally and never spawn background work; the
//! capture scheduler owns retry and pacing.

pub mod error;
pub mod sources;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use error::{ConnectorError, Result};
pub use sources::{
    MemoryRow, MemorySourceConnector, MemorySourceHandle, MySqlSourceConnector,
    PostgresSourceConnector,
};
pub use traits::{ChangePage, SourceConnector};
