//! Task instances parked while they wait for a free slot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A task instance that is ready but not yet dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingTask {
    pub task_instance_id: i64,
    pub process_instance_id: i64,
    pub parked_at: DateTime<Utc>,
}

/// Concurrent map of waiting task instances, keyed by task instance id.
///
/// Shared as `Arc<WaitingTaskCache>` between the dispatcher that parks tasks
/// and the control plane that force-starts them.
#[derive(Debug, Default)]
pub struct WaitingTaskCache {
    tasks: RwLock<HashMap<i64, WaitingTask>>,
}

impl WaitingTaskCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a task instance. Re-parking refreshes its entry.
    pub fn insert(&self, task_instance_id: i64, process_instance_id: i64) {
        self.tasks.write().insert(
            task_instance_id,
            WaitingTask {
                task_instance_id,
                process_instance_id,
                parked_at: Utc::now(),
            },
        );
    }

    #[must_use]
    pub fn contains(&self, task_instance_id: i64) -> bool {
        self.tasks.read().contains_key(&task_instance_id)
    }

    /// Remove a parked task, returning it if it was waiting.
    pub fn remove(&self, task_instance_id: i64) -> Option<WaitingTask> {
        self.tasks.write().remove(&task_instance_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}
