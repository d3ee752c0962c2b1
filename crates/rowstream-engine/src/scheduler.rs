//! The capture scheduler.
//!
//! A single cooperative loop on one shared worker task drives every capture
//! task: connector calls are I/O-bound and short relative to the poll
//! interval, and per-task threads would not bound resource use as task count
//! grows. Each tick snapshots the registry, polls each active task's tables
//! sequentially, routes events through metrics, handlers, and the buffer,
//! then sleeps for the minimum poll interval across active tasks.
//!
//! Correctness rules enforced here:
//! - a table's cursor advances to the page maximum only after the whole page
//!   has been processed without handler failure, so a failed or interrupted
//!   page is refetched and redelivered (at-least-once);
//! - no connector error escapes a tick: it is recorded on the owning task,
//!   which moves to `error` status and is retried next tick, and every other
//!   task proceeds untouched;
//! - a page whose task stopped or paused while the fetch was in flight is
//!   discarded without processing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use rowstream_connectors::ConnectorError;
use rowstream_core::{current_timestamp_ms, Cursor, SnapshotMode};

use crate::registry::{TaskEntry, TaskRegistry};
use crate::task::TaskStatus;

/// Sleep between ticks when no task is active.
const IDLE_POLL_MS: u64 = 1000;

/// Single-worker scheduler over a shared [`TaskRegistry`].
pub(crate) struct CaptureScheduler {
    registry: Arc<TaskRegistry>,
}

impl CaptureScheduler {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self { registry }
    }

    /// Run the capture loop until the shutdown signal fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("capture scheduler started");
        loop {
            self.tick().await;

            let interval = self
                .registry
                .min_poll_interval_ms()
                .await
                .unwrap_or(IDLE_POLL_MS);
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(interval)) => {}
            }
        }
        tracing::info!("capture scheduler stopped");
    }

    /// One pass over every active task.
    pub async fn tick(&self) {
        for (task_id, entry) in self.registry.snapshot().await {
            let status = entry.state.read().await.status;
            match status {
                TaskStatus::Connecting | TaskStatus::Error => {
                    if self.connect_task(&task_id, &entry).await {
                        self.capture_task(&task_id, &entry).await;
                    }
                }
                TaskStatus::Running => self.capture_task(&task_id, &entry).await,
                _ => {}
            }
        }
    }

    /// Bring a connecting (or retried error) task to `running`.
    async fn connect_task(&self, task_id: &str, entry: &Arc<TaskEntry>) -> bool {
        let connect_result = {
            let mut connector = entry.connector.lock().await;
            match connector.connect().await {
                Ok(()) => {
                    if connector.is_healthy().await {
                        Ok(())
                    } else {
                        Err(ConnectorError::Connection(
                            "connector reported unhealthy after connect".to_string(),
                        ))
                    }
                }
                Err(e) => Err(e),
            }
        };

        if let Err(e) = connect_result {
            tracing::warn!(task = %task_id, error = %e, "connect failed; task in error status");
            entry.state.write().await.set_error(e.to_string());
            entry.metrics.write().await.record_fetch_error(&e.to_string());
            return false;
        }

        if entry.config.snapshot_mode == SnapshotMode::Never {
            if let Err(e) = self.init_cursors(task_id, entry).await {
                tracing::warn!(task = %task_id, error = %e, "cursor initialization failed");
                entry.state.write().await.set_error(e.to_string());
                entry.metrics.write().await.record_fetch_error(&e.to_string());
                return false;
            }
        }

        let mut state = entry.state.write().await;
        if matches!(state.status, TaskStatus::Connecting | TaskStatus::Error) {
            state.status = TaskStatus::Running;
            state.last_error = None;
            tracing::info!(task = %task_id, "capture task running");
            true
        } else {
            // Stopped or paused while the connect was in flight.
            false
        }
    }

    /// Under snapshot mode `never`, position each table at its current
    /// maximum cursor so pre-existing rows are skipped.
    async fn init_cursors(
        &self,
        task_id: &str,
        entry: &Arc<TaskEntry>,
    ) -> rowstream_connectors::Result<()> {
        for table in &entry.config.tables {
            let needs_init = {
                let state = entry.state.read().await;
                state.cursor(table).is_null() && !state.is_unsupported(table)
            };
            if !needs_init {
                continue;
            }

            let latest = {
                let mut connector = entry.connector.lock().await;
                connector.latest_cursor(table).await
            };
            match latest {
                Ok(cursor) => {
                    if !cursor.is_null() {
                        tracing::debug!(task = %task_id, table = %table, cursor = %cursor,
                            "skipping pre-existing rows");
                        entry.state.write().await.advance_cursor(table, cursor);
                    }
                }
                Err(ConnectorError::NoCursorColumn(_)) => {
                    tracing::warn!(task = %task_id, table = %table,
                        "table has no natural cursor column; marking unsupported");
                    entry.state.write().await.mark_unsupported(table);
                    entry.metrics.write().await.record_unsupported_table();
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Poll each of a running task's tables once.
    async fn capture_task(&self, task_id: &str, entry: &Arc<TaskEntry>) {
        let batch_size = entry.config.batch_size;
        let mut captured_this_tick: u64 = 0;

        for table in &entry.config.tables {
            let (since, redeliveries) = {
                let state = entry.state.read().await;
                if state.status != TaskStatus::Running {
                    return;
                }
                if state.is_unsupported(table) {
                    continue;
                }
                let progress = state.progress(table);
                (
                    progress.map(|p| p.cursor.clone()).unwrap_or(Cursor::Null),
                    progress.map(|p| p.redeliveries).unwrap_or(0),
                )
            };

            let fetched = {
                let mut connector = entry.connector.lock().await;
                connector.fetch_changes(table, &since, batch_size).await
            };

            match fetched {
                Err(ConnectorError::NoCursorColumn(_)) => {
                    tracing::warn!(task = %task_id, table = %table,
                        "table has no natural cursor column; marking unsupported");
                    entry.state.write().await.mark_unsupported(table);
                    entry.metrics.write().await.record_unsupported_table();
                }
                Err(e) => {
                    tracing::error!(task = %task_id, table = %table, error = %e,
                        "fetch failed; task in error status until the next tick");
                    {
                        let mut state = entry.state.write().await;
                        if state.status == TaskStatus::Running {
                            state.set_error(e.to_string());
                        }
                    }
                    entry.metrics.write().await.record_fetch_error(&e.to_string());
                    return;
                }
                Ok(page) => {
                    // Discard the page if the task stopped or paused while the
                    // fetch was in flight.
                    if entry.state.read().await.status != TaskStatus::Running {
                        tracing::debug!(task = %task_id, table = %table,
                            "discarding in-flight page; task no longer running");
                        return;
                    }
                    if page.is_empty() {
                        continue;
                    }

                    let max_cursor = page.max_cursor.clone();
                    captured_this_tick += page.len() as u64;
                    let page_clean = self
                        .process_page(task_id, entry, page.events, redeliveries)
                        .await;

                    let mut state = entry.state.write().await;
                    if state.status != TaskStatus::Running {
                        return;
                    }
                    if page_clean {
                        state.advance_cursor(table, max_cursor);
                    } else {
                        // Hold the cursor: the whole page is refetched and
                        // redelivered next tick.
                        state.mark_redelivery(table);
                    }
                }
            }
        }

        entry
            .metrics
            .write()
            .await
            .update_throughput(captured_this_tick, current_timestamp_ms());
    }

    /// Run one page through metrics, the handler pipeline, and the buffer.
    ///
    /// Returns whether every event passed every handler; events are processed
    /// and buffered in ascending order regardless.
    async fn process_page(
        &self,
        task_id: &str,
        entry: &Arc<TaskEntry>,
        events: Vec<rowstream_core::CapturedEvent>,
        redeliveries: u32,
    ) -> bool {
        let handlers = entry.handlers.read().await.clone();
        let now = current_timestamp_ms();
        let mut page_clean = true;

        for mut event in events {
            event.delivery_attempts = redeliveries + 1;

            for handler in &handlers {
                if let Err(e) = handler(&event) {
                    tracing::warn!(task = %task_id, table = %event.table, error = %e,
                        "handler failed; event marked failed");
                    event.last_error = Some(e.to_string());
                    page_clean = false;
                }
            }

            {
                let mut metrics = entry.metrics.write().await;
                metrics.record_event(event.event_kind, now);
                match &event.last_error {
                    None => metrics.record_processed(),
                    Some(message) => {
                        let message = message.clone();
                        metrics.record_handler_failure(&message);
                    }
                }
            }

            entry.buffer.lock().await.append(event);
        }

        page_clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler, HandlerError};
    use rowstream_connectors::{MemoryRow, MemorySourceConnector, MemorySourceHandle};
    use rowstream_core::{CapturedEvent, SourceConfig, SourceKind};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn memory_task(
        task_id: &str,
        tables: &[&str],
        batch_size: usize,
    ) -> (Arc<TaskEntry>, MemorySourceHandle) {
        let mut config = SourceConfig::new(
            SourceKind::Memory,
            "mem://",
            "testdb",
            tables.iter().map(|t| t.to_string()).collect(),
        );
        config.batch_size = batch_size;
        let (connector, handle) = MemorySourceConnector::from_config(task_id, &config);
        let entry = Arc::new(TaskEntry::new(task_id, config, Box::new(connector), 100));
        (entry, handle)
    }

    async fn registry_with(entries: &[(&str, &Arc<TaskEntry>)]) -> Arc<TaskRegistry> {
        let registry = Arc::new(TaskRegistry::new());
        for (id, entry) in entries {
            registry.insert(id, Arc::clone(entry)).await.unwrap();
        }
        registry
    }

    async fn set_status(entry: &Arc<TaskEntry>, status: TaskStatus) {
        entry.state.write().await.status = status;
    }

    async fn buffered(entry: &Arc<TaskEntry>) -> Vec<CapturedEvent> {
        entry.buffer.lock().await.drain(usize::MAX, false)
    }

    fn push_inserts(handle: &MemorySourceHandle, table: &str, cursors: &[i64]) {
        for &c in cursors {
            handle.push_row(table, MemoryRow::insert(Cursor::Int(c), json!({"id": c})));
        }
    }

    // ---------------------------------------------------------------
    // Connect and capture
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_tick_connects_then_captures() {
        let (entry, handle) = memory_task("t", &["orders"], 100);
        push_inserts(&handle, "orders", &[1, 2, 3]);
        set_status(&entry, TaskStatus::Connecting).await;

        let scheduler = CaptureScheduler::new(registry_with(&[("t", &entry)]).await);
        scheduler.tick().await;

        assert_eq!(entry.state.read().await.status, TaskStatus::Running);
        assert_eq!(entry.state.read().await.cursor("orders"), Cursor::Int(3));
        assert_eq!(buffered(&entry).await.len(), 3);
        assert_eq!(entry.metrics.read().await.events_captured, 3);
        assert_eq!(entry.metrics.read().await.events_processed, 3);
    }

    #[tokio::test]
    async fn test_idle_and_paused_tasks_are_skipped() {
        let (entry, handle) = memory_task("t", &["orders"], 100);
        push_inserts(&handle, "orders", &[1]);

        let scheduler = CaptureScheduler::new(registry_with(&[("t", &entry)]).await);
        scheduler.tick().await; // idle
        set_status(&entry, TaskStatus::Paused).await;
        scheduler.tick().await;

        assert_eq!(handle.fetch_calls(), 0);
        assert!(buffered(&entry).await.is_empty());
    }

    #[tokio::test]
    async fn test_cursor_non_decreasing_across_ticks() {
        let (entry, handle) = memory_task("t", &["orders"], 2);
        push_inserts(&handle, "orders", &[1, 2, 2, 3, 4]);
        set_status(&entry, TaskStatus::Connecting).await;

        let scheduler = CaptureScheduler::new(registry_with(&[("t", &entry)]).await);

        // First tick: the limit-2 page extends over the tie at 2.
        scheduler.tick().await;
        assert_eq!(entry.state.read().await.cursor("orders"), Cursor::Int(2));
        assert_eq!(buffered(&entry).await.len(), 3);

        // Second tick drains the rest; no row is skipped or duplicated.
        scheduler.tick().await;
        assert_eq!(entry.state.read().await.cursor("orders"), Cursor::Int(4));
        let events = buffered(&entry).await;
        let cursors: Vec<Cursor> = events.iter().map(|e| e.cursor.clone()).collect();
        assert_eq!(
            cursors,
            vec![
                Cursor::Int(1),
                Cursor::Int(2),
                Cursor::Int(2),
                Cursor::Int(3),
                Cursor::Int(4)
            ]
        );
    }

    // ---------------------------------------------------------------
    // At-least-once redelivery
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_handler_failure_holds_cursor_and_redelivers() {
        let (entry, handle) = memory_task("t", &["orders"], 100);
        push_inserts(&handle, "orders", &[1, 2]);
        set_status(&entry, TaskStatus::Connecting).await;

        // Fails the first delivery of cursor 2, succeeds afterwards.
        let failed_once = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&failed_once);
        entry.handlers.write().await.push(handler(move |event| {
            if event.cursor == Cursor::Int(2) && !flag.swap(true, Ordering::SeqCst) {
                Err(HandlerError::new("transient sink failure"))
            } else {
                Ok(())
            }
        }));

        let scheduler = CaptureScheduler::new(registry_with(&[("t", &entry)]).await);

        scheduler.tick().await;
        {
            let state = entry.state.read().await;
            // Cursor held: the page had a failing event.
            assert_eq!(state.cursor("orders"), Cursor::Null);
            assert_eq!(state.progress("orders").unwrap().redeliveries, 1);
        }
        assert_eq!(entry.metrics.read().await.events_failed, 1);

        scheduler.tick().await;
        assert_eq!(entry.state.read().await.cursor("orders"), Cursor::Int(2));

        let events = buffered(&entry).await;
        // Both events were redelivered with the attempt count bumped.
        assert_eq!(events.len(), 4);
        assert!(events[..2].iter().all(|e| e.delivery_attempts == 1));
        assert!(events[2..].iter().all(|e| e.delivery_attempts == 2));
        assert_eq!(events[1].last_error.as_deref(), Some("transient sink failure"));
        assert!(events[3].last_error.is_none());
    }

    #[tokio::test]
    async fn test_failing_handler_never_stops_later_handlers() {
        let (entry, handle) = memory_task("t", &["orders"], 100);
        push_inserts(&handle, "orders", &[1]);
        set_status(&entry, TaskStatus::Connecting).await;

        let second_ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&second_ran);
        {
            let mut handlers = entry.handlers.write().await;
            handlers.push(handler(|_| Err(HandlerError::new("always fails"))));
            handlers.push(handler(move |_| {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }));
        }

        let scheduler = CaptureScheduler::new(registry_with(&[("t", &entry)]).await);
        scheduler.tick().await;

        assert!(second_ran.load(Ordering::SeqCst));
        assert_eq!(entry.metrics.read().await.events_failed, 1);
    }

    // ---------------------------------------------------------------
    // Failure isolation
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_unsupported_table_is_nonfatal() {
        let (entry, handle) = memory_task("t", &["orders", "audit_log"], 100);
        push_inserts(&handle, "orders", &[1]);
        handle.mark_unsupported("audit_log");
        set_status(&entry, TaskStatus::Connecting).await;

        let scheduler = CaptureScheduler::new(registry_with(&[("t", &entry)]).await);
        scheduler.tick().await;

        let state = entry.state.read().await;
        assert_eq!(state.status, TaskStatus::Running);
        assert!(state.is_unsupported("audit_log"));
        assert_eq!(state.cursor("orders"), Cursor::Int(1));
        drop(state);
        assert_eq!(entry.metrics.read().await.unsupported_tables, 1);

        // The unsupported table is skipped on later ticks, not refetched.
        let calls_after_first = handle.fetch_calls();
        scheduler.tick().await;
        assert_eq!(handle.fetch_calls(), calls_after_first + 1);
    }

    #[tokio::test]
    async fn test_fetch_error_isolates_tasks_and_retries() {
        let (bad, bad_handle) = memory_task("bad", &["orders"], 100);
        let (good, good_handle) = memory_task("good", &["orders"], 100);
        push_inserts(&bad_handle, "orders", &[1]);
        push_inserts(&good_handle, "orders", &[1, 2]);
        bad_handle.set_fail_fetches(true);
        set_status(&bad, TaskStatus::Connecting).await;
        set_status(&good, TaskStatus::Connecting).await;

        let scheduler =
            CaptureScheduler::new(registry_with(&[("bad", &bad), ("good", &good)]).await);
        scheduler.tick().await;

        // The failing task is in error status with the cause recorded...
        {
            let state = bad.state.read().await;
            assert_eq!(state.status, TaskStatus::Error);
            assert!(state.last_error.as_deref().unwrap_or("").contains("fail"));
        }
        // ...and the healthy task captured normally in the same tick.
        assert_eq!(good.state.read().await.status, TaskStatus::Running);
        assert_eq!(buffered(&good).await.len(), 2);

        // Interval-based retry: once the source recovers, the next tick
        // brings the task back without manual intervention.
        bad_handle.set_fail_fetches(false);
        scheduler.tick().await;
        assert_eq!(bad.state.read().await.status, TaskStatus::Running);
        assert_eq!(buffered(&bad).await.len(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_sets_error() {
        let (entry, handle) = memory_task("t", &["orders"], 100);
        handle.set_fail_connect(true);
        set_status(&entry, TaskStatus::Connecting).await;

        let scheduler = CaptureScheduler::new(registry_with(&[("t", &entry)]).await);
        scheduler.tick().await;

        let state = entry.state.read().await;
        assert_eq!(state.status, TaskStatus::Error);
        assert!(state.last_error.is_some());
        drop(state);
        assert_eq!(entry.metrics.read().await.fetch_errors, 1);
    }

    // ---------------------------------------------------------------
    // Snapshot mode
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_snapshot_never_skips_existing_rows() {
        let mut config = SourceConfig::new(
            SourceKind::Memory,
            "mem://",
            "testdb",
            vec!["orders".to_string()],
        );
        config.snapshot_mode = SnapshotMode::Never;
        let (connector, handle) = MemorySourceConnector::from_config("t", &config);
        let entry = Arc::new(TaskEntry::new("t", config, Box::new(connector), 100));

        push_inserts(&handle, "orders", &[1, 2, 3]);
        set_status(&entry, TaskStatus::Connecting).await;

        let scheduler = CaptureScheduler::new(registry_with(&[("t", &entry)]).await);
        scheduler.tick().await;
        // Pre-existing rows were skipped.
        assert!(buffered(&entry).await.is_empty());
        assert_eq!(entry.state.read().await.cursor("orders"), Cursor::Int(3));

        push_inserts(&handle, "orders", &[4]);
        scheduler.tick().await;
        let events = buffered(&entry).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].cursor, Cursor::Int(4));
    }
}
