//! Source connector implementations.
//!
//! The MySQL and PostgreSQL connectors are both built on incremental polling
//! over a natural cursor column; log-based capture (binlog/WAL streaming) is
//! a documented upgrade path, not implemented here. The memory connector is
//! a scripted in-process source for tests and demos.

pub mod memory;
pub mod mysql;
pub mod postgres;

pub use memory::{MemoryRow, MemorySourceConnector, MemorySourceHandle};
pub use mysql::MySqlSourceConnector;
pub use postgres::PostgresSourceConnector;

use rowstream_core::EventKind;

/// Cursor column candidates, tried in order during discovery. The first name
/// present on the table wins and is cached for the connector's lifetime.
pub(crate) const CURSOR_COLUMN_CANDIDATES: &[&str] = &[
    "updated_at",
    "modified_at",
    "last_modified",
    "last_updated",
    "row_version",
    "version",
    "created_at",
    "id",
];

/// Columns that mark a row's creation time, used by the event-kind heuristic.
pub(crate) const CREATED_COLUMNS: &[&str] = &["created_at", "inserted_at", "created"];

/// Pick the natural cursor column from a table's column list.
pub(crate) fn pick_cursor_column(columns: &[String]) -> Option<String> {
    CURSOR_COLUMN_CANDIDATES
        .iter()
        .find(|candidate| columns.iter().any(|c| c.eq_ignore_ascii_case(candidate)))
        .map(|c| c.to_string())
}

/// Infer the kind of change a polled row represents.
///
/// Polling cannot observe deletes (rows that no longer match simply stop
/// appearing), so the heuristic only distinguishes inserts from updates: a
/// row whose creation column equals the cursor column has not been touched
/// since it was written. True delete detection needs log-based capture —
/// a documented limitation.
pub(crate) fn infer_event_kind(row: &serde_json::Value, cursor_column: &str) -> EventKind {
    // A creation-time or append-only cursor column means every polled row is new.
    if CREATED_COLUMNS.contains(&cursor_column) || cursor_column == "id" {
        return EventKind::Insert;
    }

    let cursor_value = match row.get(cursor_column) {
        Some(v) => v,
        None => return EventKind::Update,
    };
    for created in CREATED_COLUMNS {
        if let Some(created_value) = row.get(*created) {
            if created_value == cursor_value {
                return EventKind::Insert;
            }
        }
    }
    EventKind::Update
}

/// Whether a table's column set changed between two discovery snapshots.
/// Order-insensitive; a rename shows up as one removal plus one addition.
pub(crate) fn columns_changed(old: &[String], new: &[String]) -> bool {
    if old.len() != new.len() {
        return true;
    }
    let mut old_sorted: Vec<&String> = old.iter().collect();
    let mut new_sorted: Vec<&String> = new.iter().collect();
    old_sorted.sort();
    new_sorted.sort();
    old_sorted != new_sorted
}

/// Split an optionally schema-qualified table reference into
/// `(schema, table)`.
pub(crate) fn split_table(table: &str) -> (Option<&str>, &str) {
    match table.split_once('.') {
        Some((schema, name)) if !schema.is_empty() && !name.is_empty() => (Some(schema), name),
        _ => (None, table),
    }
}
