//! Per-task capture metrics.
//!
//! Counters are written only by the scheduler worker; readers receive a
//! snapshot through the manager, so no fine-grained locking is needed on the
//! read path. All counters are monotonic for the lifetime of a task and are
//! deleted with it on `remove_task`.

use serde::{Deserialize, Serialize};

use rowstream_core::EventKind;

/// Smoothing factor of the decayed-throughput estimate. Higher values weigh
/// recent ticks more heavily.
const THROUGHPUT_ALPHA: f64 = 0.3;

/// Counters and gauges for one capture task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetrics {
    /// Events fetched from the connector.
    pub events_captured: u64,
    /// Events that passed every handler.
    pub events_processed: u64,
    /// Events with at least one failing handler.
    pub events_failed: u64,

    /// Captured events by kind.
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub ddl_changes: u64,

    /// Connector fetch/connect failures observed by the scheduler.
    pub fetch_errors: u64,
    /// Tables marked unsupported (no natural cursor column).
    pub unsupported_tables: u64,
    /// Events evicted from the task's buffer; filled at snapshot time.
    pub buffer_dropped: u64,

    /// When the most recent event was captured (ms since epoch).
    pub last_capture_time: Option<i64>,
    /// Time since the last capture (ms); filled at snapshot time.
    pub current_lag_ms: Option<i64>,
    /// Exponentially decayed capture throughput in events/second.
    pub throughput_eps: f64,
    /// Most recent connector or handler error message.
    pub last_error: Option<String>,

    #[serde(skip)]
    last_rate_update_ms: Option<i64>,
}

impl TaskMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one captured event.
    pub fn record_event(&mut self, kind: EventKind, now_ms: i64) {
        self.events_captured += 1;
        self.last_capture_time = Some(now_ms);
        match kind {
            EventKind::Insert => self.inserts += 1,
            EventKind::Update => self.updates += 1,
            EventKind::Delete => self.deletes += 1,
            EventKind::Ddl => self.ddl_changes += 1,
        }
    }

    /// Record an event that passed every handler.
    pub fn record_processed(&mut self) {
        self.events_processed += 1;
    }

    /// Record an event with at least one failing handler.
    pub fn record_handler_failure(&mut self, message: &str) {
        self.events_failed += 1;
        self.last_error = Some(message.to_string());
    }

    /// Record a connector failure.
    pub fn record_fetch_error(&mut self, message: &str) {
        self.fetch_errors += 1;
        self.last_error = Some(message.to_string());
    }

    /// Record a table marked unsupported.
    pub fn record_unsupported_table(&mut self) {
        self.unsupported_tables += 1;
    }

    /// Fold one tick's capture count into the decayed throughput estimate.
    ///
    /// The first call only anchors the sample clock; from the second call on
    /// the instantaneous rate over the elapsed interval is blended in.
    pub fn update_throughput(&mut self, events: u64, now_ms: i64) {
        match self.last_rate_update_ms {
            None => self.last_rate_update_ms = Some(now_ms),
            Some(prev) if now_ms > prev => {
                let dt_s = (now_ms - prev) as f64 / 1000.0;
                let instantaneous = events as f64 / dt_s;
                self.throughput_eps =
                    THROUGHPUT_ALPHA * instantaneous + (1.0 - THROUGHPUT_ALPHA) * self.throughput_eps;
                self.last_rate_update_ms = Some(now_ms);
            }
            Some(_) => {}
        }
    }

    /// A read-side copy with the derived gauges filled in.
    pub fn snapshot(&self, now_ms: i64, buffer_dropped: u64) -> TaskMetrics {
        let mut snap = self.clone();
        snap.buffer_dropped = buffer_dropped;
        snap.current_lag_ms = self.last_capture_time.map(|t| (now_ms - t).max(0));
        snap
    }
}
