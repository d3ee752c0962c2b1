//! In-memory source connector.
//!
//! A scripted source that yields rows pushed through a [`MemorySourceHandle`].
//! It implements the same page semantics as the SQL connectors (ascending by
//! cursor, strictly greater than `since`, tie-extension past the limit), so
//! engine behavior can be exercised without a live database. Failure modes
//! (connect failures, fetch failures, missing cursor columns) are scriptable
//! per handle.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use rowstream_core::{
    current_timestamp_ms, CapturedEvent, Cursor, EventKind, SourceConfig, SourceKind,
};

use crate::error::{ConnectorError, Result};
use crate::traits::{ChangePage, SourceConnector};

/// One scripted row, mapped 1:1 to a [`CapturedEvent`] when fetched.
#[derive(Debug, Clone)]
pub struct MemoryRow {
    pub cursor: Cursor,
    pub kind: EventKind,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub transaction_id: Option<String>,
}

impl MemoryRow {
    pub fn insert(cursor: Cursor, after: serde_json::Value) -> Self {
        Self {
            cursor,
            kind: EventKind::Insert,
            before: None,
            after: Some(after),
            transaction_id: None,
        }
    }

    pub fn update(
        cursor: Cursor,
        before: serde_json::Value,
        after: serde_json::Value,
    ) -> Self {
        Self {
            cursor,
            kind: EventKind::Update,
            before: Some(before),
            after: Some(after),
            transaction_id: None,
        }
    }

    pub fn delete(cursor: Cursor, before: serde_json::Value) -> Self {
        Self {
            cursor,
            kind: EventKind::Delete,
            before: Some(before),
            after: None,
            transaction_id: None,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: HashMap<String, Vec<MemoryRow>>,
    pending_ddl: HashSet<String>,
    unsupported: HashSet<String>,
    connected: bool,
    healthy: bool,
    fail_connect: bool,
    fail_fetches: bool,
    fail_next_fetch: Option<String>,
    fetch_calls: u64,
}

/// Scripting handle for a [`MemorySourceConnector`].
///
/// The handle stays usable after the connector is boxed and handed to the
/// engine; pushes become visible to the next fetch.
#[derive(Debug, Clone)]
pub struct MemorySourceHandle {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySourceHandle {
    /// Append a row to a table's change log.
    pub fn push_row(&self, table: &str, row: MemoryRow) {
        let mut state = self.state.lock().expect("memory source state poisoned");
        state.rows.entry(table.to_string()).or_default().push(row);
    }

    /// Append several rows to a table's change log.
    pub fn push_rows(&self, table: &str, rows: Vec<MemoryRow>) {
        let mut state = self.state.lock().expect("memory source state poisoned");
        state.rows.entry(table.to_string()).or_default().extend(rows);
    }

    /// Flag a schema change on a table; the next fetch emits one `ddl` event
    /// when the connector was configured with `include_ddl`.
    pub fn push_ddl(&self, table: &str) {
        let mut state = self.state.lock().expect("memory source state poisoned");
        state.pending_ddl.insert(table.to_string());
    }

    /// Script the table as having no natural cursor column.
    pub fn mark_unsupported(&self, table: &str) {
        let mut state = self.state.lock().expect("memory source state poisoned");
        state.unsupported.insert(table.to_string());
    }

    /// Toggle the health probe result.
    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().expect("memory source state poisoned").healthy = healthy;
    }

    /// Make subsequent `connect` calls fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().expect("memory source state poisoned").fail_connect = fail;
    }

    /// Make every subsequent fetch fail until cleared.
    pub fn set_fail_fetches(&self, fail: bool) {
        self.state.lock().expect("memory source state poisoned").fail_fetches = fail;
    }

    /// Make exactly the next fetch fail with the given message.
    pub fn fail_next_fetch(&self, message: &str) {
        self.state.lock().expect("memory source state poisoned").fail_next_fetch =
            Some(message.to_string());
    }

    /// Number of `fetch_changes` calls observed so far.
    pub fn fetch_calls(&self) -> u64 {
        self.state.lock().expect("memory source state poisoned").fetch_calls
    }

    /// Whether the connector currently holds an open "connection".
    pub fn is_connected(&self) -> bool {
        self.state.lock().expect("memory source state poisoned").connected
    }
}

/// In-process source connector backed by scripted rows.
pub struct MemorySourceConnector {
    name: String,
    database: String,
    schema: Option<String>,
    include_ddl: bool,
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySourceConnector {
    /// Create a connector and its scripting handle.
    pub fn new(name: &str, database: &str) -> (Self, MemorySourceHandle) {
        let state = Arc::new(Mutex::new(MemoryState {
            healthy: true,
            ..MemoryState::default()
        }));
        let handle = MemorySourceHandle {
            state: Arc::clone(&state),
        };
        (
            Self {
                name: name.to_string(),
                database: database.to_string(),
                schema: None,
                include_ddl: false,
                state,
            },
            handle,
        )
    }

    /// Create a connector from a task's [`SourceConfig`].
    pub fn from_config(name: &str, config: &SourceConfig) -> (Self, MemorySourceHandle) {
        let (mut connector, handle) = Self::new(name, &config.database);
        connector.schema = config.schema.clone();
        connector.include_ddl = config.include_ddl;
        (connector, handle)
    }

    fn make_event(&self, table: &str, kind: EventKind, cursor: Cursor) -> CapturedEvent {
        let mut event = CapturedEvent::new(
            kind,
            SourceKind::Memory,
            self.database.clone(),
            self.schema.clone(),
            table,
            current_timestamp_ms(),
            cursor.clone(),
        );
        event.source_position = format!("mem:{}", cursor);
        event
    }
}

#[async_trait]
impl SourceConnector for MemorySourceConnector {
    async fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock().expect("memory source state poisoned");
        if state.fail_connect {
            return Err(ConnectorError::Connection(
                "memory source scripted to refuse connections".to_string(),
            ));
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.state.lock().expect("memory source state poisoned").connected = false;
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        let state = self.state.lock().expect("memory source state poisoned");
        state.connected && state.healthy
    }

    async fn fetch_changes(
        &mut self,
        table: &str,
        since: &Cursor,
        limit: usize,
    ) -> Result<ChangePage> {
        if limit == 0 {
            return Ok(ChangePage::empty(since));
        }

        let (rows, emit_ddl) = {
            let mut state = self.state.lock().expect("memory source state poisoned");
            state.fetch_calls += 1;

            if !state.connected {
                return Err(ConnectorError::Connection("not connected".to_string()));
            }
            if let Some(message) = state.fail_next_fetch.take() {
                return Err(ConnectorError::Connection(message));
            }
            if state.fail_fetches {
                return Err(ConnectorError::Connection(
                    "memory source scripted to fail fetches".to_string(),
                ));
            }
            if state.unsupported.contains(table) {
                return Err(ConnectorError::NoCursorColumn(table.to_string()));
            }

            let emit_ddl = state.pending_ddl.remove(table) && self.include_ddl;
            let mut rows: Vec<MemoryRow> = state
                .rows
                .get(table)
                .map(|all| all.iter().filter(|r| r.cursor > *since).cloned().collect())
                .unwrap_or_default();
            rows.sort_by(|a, b| a.cursor.cmp(&b.cursor));
            (rows, emit_ddl)
        };

        // Truncate to `limit`, then extend with every row tied on the page's
        // maximum cursor so a strictly-greater advance never skips them.
        let page_rows = if rows.len() > limit {
            let boundary = rows[limit - 1].cursor.clone();
            let tied = rows[limit..]
                .iter()
                .take_while(|r| r.cursor == boundary)
                .count();
            rows[..limit + tied].to_vec()
        } else {
            rows
        };

        let mut events = Vec::with_capacity(page_rows.len() + 1);
        if emit_ddl {
            events.push(self.make_event(table, EventKind::Ddl, since.clone()));
        }
        let mut max_cursor = since.clone();
        for row in page_rows {
            let mut event = self.make_event(table, row.kind, row.cursor.clone());
            event.before = row.before;
            event.after = row.after;
            event.transaction_id = row.transaction_id;
            max_cursor = row.cursor;
            events.push(event);
        }

        Ok(ChangePage { events, max_cursor })
    }

    async fn natural_cursor_field(&mut self, table: &str) -> Result<Option<String>> {
        let state = self.state.lock().expect("memory source state poisoned");
        if state.unsupported.contains(table) {
            Ok(None)
        } else {
            Ok(Some("cursor".to_string()))
        }
    }

    async fn latest_cursor(&mut self, table: &str) -> Result<Cursor> {
        let state = self.state.lock().expect("memory source state poisoned");
        if state.unsupported.contains(table) {
            return Err(ConnectorError::NoCursorColumn(table.to_string()));
        }
        Ok(state
            .rows
            .get(table)
            .and_then(|rows| rows.iter().map(|r| r.cursor.clone()).max())
            .unwrap_or(Cursor::Null))
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Memory
    }

    fn name(&self) -> &str {
        &self.name
    }
}
