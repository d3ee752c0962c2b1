//! Task registry shared between the manager and the scheduler worker.
//!
//! One explicit value owned by the [`TaskManager`](crate::TaskManager) and
//! handed to the scheduler at construction — never ambient global state. The
//! registry lock guards only the id → entry map; each entry's state, metrics,
//! buffer, and connector sit behind their own locks so administrative calls
//! and the worker interleave without contending on the map.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use rowstream_connectors::SourceConnector;
use rowstream_core::SourceConfig;

use crate::buffer::EventBuffer;
use crate::error::{EngineError, Result};
use crate::handler::ChangeHandler;
use crate::metrics::TaskMetrics;
use crate::task::TaskState;

/// Everything the engine holds for one capture task.
pub(crate) struct TaskEntry {
    pub config: SourceConfig,
    pub state: RwLock<TaskState>,
    pub metrics: RwLock<TaskMetrics>,
    pub buffer: Mutex<EventBuffer>,
    pub handlers: RwLock<Vec<ChangeHandler>>,
    /// Locked only by the worker during a connector call, so a slow fetch
    /// never blocks administrative operations.
    pub connector: Mutex<Box<dyn SourceConnector>>,
}

impl TaskEntry {
    pub fn new(
        task_id: &str,
        config: SourceConfig,
        connector: Box<dyn SourceConnector>,
        buffer_capacity: usize,
    ) -> Self {
        Self {
            state: RwLock::new(TaskState::new(task_id, &config.tables)),
            metrics: RwLock::new(TaskMetrics::new()),
            buffer: Mutex::new(EventBuffer::with_capacity(buffer_capacity)),
            handlers: RwLock::new(Vec::new()),
            connector: Mutex::new(connector),
            config,
        }
    }
}

/// Registry of capture tasks keyed by id.
pub(crate) struct TaskRegistry {
    tasks: RwLock<HashMap<String, Arc<TaskEntry>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, task_id: &str, entry: Arc<TaskEntry>) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(task_id) {
            return Err(EngineError::DuplicateTask(task_id.to_string()));
        }
        tasks.insert(task_id.to_string(), entry);
        Ok(())
    }

    /// Remove a task, deleting its state, metrics, and buffered events in one
    /// step — the entry leaves the map atomically or not at all.
    pub async fn remove(&self, task_id: &str) -> Result<Arc<TaskEntry>> {
        self.tasks
            .write()
            .await
            .remove(task_id)
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))
    }

    pub async fn get(&self, task_id: &str) -> Result<Arc<TaskEntry>> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))
    }

    /// Snapshot of all entries. The registry lock is held only while the map
    /// is copied, never across a connector call.
    pub async fn snapshot(&self) -> Vec<(String, Arc<TaskEntry>)> {
        self.tasks
            .read()
            .await
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect()
    }

    pub async fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tasks.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Minimum poll interval across tasks under scheduler attention, or
    /// `None` when no task is active.
    pub async fn min_poll_interval_ms(&self) -> Option<u64> {
        let mut min: Option<u64> = None;
        for (_, entry) in self.snapshot().await {
            let status = entry.state.read().await.status;
            if status.is_active() {
                let interval = entry.config.poll_interval_ms.max(1);
                min = Some(min.map_or(interval, |m| m.min(interval)));
            }
        }
        min
    }
}
