//! Captured change events and cursor values.
//!
//! A [`CapturedEvent`] is the fundamental unit of data in rowstream: one
//! row-level change (or schema change) observed on a source table. Events
//! are ordered per table by their [`Cursor`] — the value of the table's
//! natural cursor column at the time the row changed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// The watermark value used to express "what changed since X" for one table.
///
/// Connectors read cursors out of a table's natural cursor column, which may
/// be an integer version, a timestamp, or a sortable text value. `Null` means
/// "from the beginning" and sorts before everything else. The derived ordering
/// is total: variants compare in declaration order, values within a variant
/// compare naturally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Cursor {
    /// No position yet — a fetch from `Null` returns all rows.
    Null,
    /// An integer cursor (auto-increment id, version counter).
    Int(i64),
    /// A timestamp cursor in milliseconds since epoch.
    Timestamp(i64),
    /// A sortable text cursor.
    Text(String),
}

impl Cursor {
    /// Whether this cursor is the initial `Null` position.
    pub fn is_null(&self) -> bool {
        matches!(self, Cursor::Null)
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor::Null
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cursor::Null => write!(f, "-"),
            Cursor::Int(v) => write!(f, "{}", v),
            Cursor::Timestamp(ms) => write!(f, "{}", ms),
            Cursor::Text(s) => write!(f, "{}", s),
        }
    }
}

// ---------------------------------------------------------------------------
// Event and source kinds
// ---------------------------------------------------------------------------

/// The type of mutation represented by a captured event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Insert,
    Update,
    Delete,
    /// A schema change on the source table.
    Ddl,
}

impl EventKind {
    /// Parse from a string (case-insensitive).
    pub fn from_str_config(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(EventKind::Insert),
            "update" => Ok(EventKind::Update),
            "delete" => Ok(EventKind::Delete),
            "ddl" => Ok(EventKind::Ddl),
            other => Err(CoreError::Config(format!(
                "unknown event kind '{}': must be 'insert', 'update', 'delete', or 'ddl'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Insert => write!(f, "insert"),
            EventKind::Update => write!(f, "update"),
            EventKind::Delete => write!(f, "delete"),
            EventKind::Ddl => write!(f, "ddl"),
        }
    }
}

/// Supported relational source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    MySql,
    Postgres,
    /// In-process source backed by scripted rows; used by tests and demos.
    Memory,
}

impl SourceKind {
    /// Parse from a string (case-insensitive).
    pub fn from_str_config(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mysql" => Ok(SourceKind::MySql),
            "postgresql" | "postgres" | "pg" => Ok(SourceKind::Postgres),
            "memory" | "mem" => Ok(SourceKind::Memory),
            other => Err(CoreError::Config(format!(
                "unsupported source kind '{}': must be 'mysql', 'postgres', or 'memory'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::MySql => write!(f, "mysql"),
            SourceKind::Postgres => write!(f, "postgres"),
            SourceKind::Memory => write!(f, "memory"),
        }
    }
}

// ---------------------------------------------------------------------------
// CapturedEvent
// ---------------------------------------------------------------------------

/// A single captured row-level change.
///
/// Row images are JSON objects keyed by column name. `before` is present for
/// updates and deletes, `after` for inserts and updates; polling connectors
/// cannot observe the pre-image, so they leave `before` empty (a documented
/// limitation of polling-based capture).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedEvent {
    /// Unique event id.
    pub id: Uuid,
    /// Type of change.
    pub event_kind: EventKind,
    /// Kind of source the event was captured from.
    pub source_kind: SourceKind,
    /// Source database name.
    pub database: String,
    /// Optional schema/namespace within the database.
    pub schema: Option<String>,
    /// Name of the affected table.
    pub table: String,
    /// When the event was captured (ms since epoch).
    pub captured_at: i64,
    /// The row's cursor value; non-decreasing per table.
    pub cursor: Cursor,
    /// Row image before the change.
    pub before: Option<serde_json::Value>,
    /// Row image after the change.
    pub after: Option<serde_json::Value>,
    /// Source transaction id, when the source exposes one.
    pub transaction_id: Option<String>,
    /// Engine-specific position token (e.g. `updated_at=1700000000000`).
    pub source_position: String,
    /// How many times this event has been delivered to handlers, including
    /// the current attempt. Greater than 1 after a redelivered page.
    pub delivery_attempts: u32,
    /// Last handler error recorded against this event, if any.
    pub last_error: Option<String>,
}

impl CapturedEvent {
    /// Create an event with a fresh id and the given coordinates. Row images,
    /// transaction id, and position default to empty.
    pub fn new(
        event_kind: EventKind,
        source_kind: SourceKind,
        database: impl Into<String>,
        schema: Option<String>,
        table: impl Into<String>,
        captured_at: i64,
        cursor: Cursor,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_kind,
            source_kind,
            database: database.into(),
            schema,
            table: table.into(),
            captured_at,
            cursor,
            before: None,
            after: None,
            transaction_id: None,
            source_position: String::new(),
            delivery_attempts: 1,
            last_error: None,
        }
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
