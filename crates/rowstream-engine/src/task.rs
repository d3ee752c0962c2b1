//! Task status and per-table capture progress.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use rowstream_core::{current_timestamp_ms, Cursor};

/// Lifecycle status of a capture task.
///
/// Status and cursors are mutated only by the scheduler worker; explicit
/// lifecycle calls on the manager also set status. `Error` tasks stay under
/// scheduler attention and are retried every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Idle,
    Connecting,
    Running,
    Paused,
    Error,
    Stopped,
}

impl TaskStatus {
    /// Whether the scheduler should attend to a task in this status.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Connecting | TaskStatus::Running | TaskStatus::Error)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Idle => write!(f, "idle"),
            TaskStatus::Connecting => write!(f, "connecting"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Paused => write!(f, "paused"),
            TaskStatus::Error => write!(f, "error"),
            TaskStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Capture progress for one table of a task.
#[derive(Debug, Clone, Default)]
pub struct TableProgress {
    /// Highest fully-processed cursor value.
    pub cursor: Cursor,
    /// Set when the table has no natural cursor column; the scheduler skips
    /// unsupported tables permanently.
    pub unsupported: bool,
    /// Consecutive times the current page has been redelivered after a
    /// handler failure. Reset to zero when the cursor advances.
    pub redeliveries: u32,
}

/// Mutable state of one capture task.
#[derive(Debug, Clone)]
pub struct TaskState {
    pub task_id: String,
    pub status: TaskStatus,
    pub created_at: i64,
    pub last_error: Option<String>,
    tables: HashMap<String, TableProgress>,
}

impl TaskState {
    /// Create idle state with null cursors for the configured tables.
    pub fn new(task_id: &str, tables: &[String]) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: TaskStatus::Idle,
            created_at: current_timestamp_ms(),
            last_error: None,
            tables: tables
                .iter()
                .map(|t| (t.clone(), TableProgress::default()))
                .collect(),
        }
    }

    pub fn progress(&self, table: &str) -> Option<&TableProgress> {
        self.tables.get(table)
    }

    /// The table's current cursor (`Null` for unknown tables).
    pub fn cursor(&self, table: &str) -> Cursor {
        self.tables
            .get(table)
            .map(|p| p.cursor.clone())
            .unwrap_or(Cursor::Null)
    }

    /// Advance a table's cursor after a fully-processed page; resets the
    /// redelivery counter.
    pub fn advance_cursor(&mut self, table: &str, cursor: Cursor) {
        let progress = self.tables.entry(table.to_string()).or_default();
        progress.cursor = cursor;
        progress.redeliveries = 0;
    }

    /// Count one redelivery of the table's current page; the cursor is left
    /// in place so the page is refetched next tick.
    pub fn mark_redelivery(&mut self, table: &str) -> u32 {
        let progress = self.tables.entry(table.to_string()).or_default();
        progress.redeliveries += 1;
        progress.redeliveries
    }

    /// Permanently mark a table as unsupported for polling capture.
    pub fn mark_unsupported(&mut self, table: &str) {
        self.tables.entry(table.to_string()).or_default().unsupported = true;
    }

    pub fn is_unsupported(&self, table: &str) -> bool {
        self.tables.get(table).map(|p| p.unsupported).unwrap_or(false)
    }

    /// Move the task to `Error` and record the cause.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.status = TaskStatus::Error;
        self.last_error = Some(message.into());
    }

    /// Copy of the per-table cursor map, for inspection.
    pub fn cursors(&self) -> HashMap<String, Cursor> {
        self.tables
            .iter()
            .map(|(t, p)| (t.clone(), p.cursor.clone()))
            .collect()
    }
}
