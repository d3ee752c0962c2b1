//! The source connector contract.
//!
//! A [`SourceConnector`] yields incremental changes for one table since a
//! cursor. The capture engine drives connectors through this trait only;
//! adding a source kind means implementing the trait, never branching on
//! type inside the scheduler.

use async_trait::async_trait;

use rowstream_core::{CapturedEvent, Cursor, SourceKind};

use crate::error::Result;

/// One page of changes for a table, ascending by cursor.
///
/// `max_cursor` is the highest cursor value in the page — the position the
/// caller advances to once every event in the page has been processed. For
/// an empty page it equals the `since` cursor the page was fetched from, so
/// advancing to it is always safe.
#[derive(Debug, Clone)]
pub struct ChangePage {
    /// Captured events in ascending cursor order.
    pub events: Vec<CapturedEvent>,
    /// Highest cursor value covered by this page.
    pub max_cursor: Cursor,
}

impl ChangePage {
    /// An empty page positioned at `since`.
    pub fn empty(since: &Cursor) -> Self {
        Self {
            events: Vec::new(),
            max_cursor: since.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Trait that all source connectors must implement.
///
/// ## Boundary invariant
///
/// `fetch_changes` MUST return every row sharing the maximum cursor value of
/// the current page, even past `limit`. The engine advances its cursor with a
/// strictly-greater-than predicate; truncating a run of tied cursor values at
/// the page edge would silently skip the rows left behind. This is the
/// correctness core of polling-based capture.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Open a pooled connection to the source.
    ///
    /// Never retries internally — retry policy belongs to the capture
    /// scheduler, which calls `connect` again on the next tick.
    async fn connect(&mut self) -> Result<()>;

    /// Close the connection pool. Idempotent.
    async fn disconnect(&mut self) -> Result<()>;

    /// Cheap liveness probe against the open connection.
    async fn is_healthy(&self) -> bool;

    /// Fetch up to `limit` rows of `table` with cursor strictly greater than
    /// `since`, ascending — extended past `limit` to include every row tied
    /// on the page's maximum cursor value (see the boundary invariant).
    async fn fetch_changes(&mut self, table: &str, since: &Cursor, limit: usize)
        -> Result<ChangePage>;

    /// The auto-discovered natural cursor column for `table`, or `None` when
    /// the table has no usable watermark column. Implementations cache the
    /// discovery result.
    async fn natural_cursor_field(&mut self, table: &str) -> Result<Option<String>>;

    /// Current maximum cursor value of `table`; used to skip pre-existing
    /// rows when a task starts with snapshot mode `never`.
    async fn latest_cursor(&mut self, table: &str) -> Result<Cursor>;

    /// The kind of source this connector captures from.
    fn source_kind(&self) -> SourceKind;

    /// Unique name of this connector instance.
    fn name(&self) -> &str;
}
