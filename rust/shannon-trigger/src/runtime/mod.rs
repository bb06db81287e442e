//! Runtime collaborators outside the control plane.
//!
//! - [`PermissionChecker`]: yes/no access verdicts
//! - [`TriggerEngineClient`]: registers cron jobs with the trigger engine
//! - [`ExecutionEngineDiscovery`]: liveness of master/execution nodes
//! - [`Clock`]: time source, injectable for previews and tests
//!
//! Each trait comes with a simple in-process implementation.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::Operator;
use crate::scheduler::Schedule;

/// Kind of resource a permission is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Schedule,
    WorkflowDefinition,
    ProcessInstance,
    TaskInstance,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Schedule => "schedule",
            Self::WorkflowDefinition => "workflow definition",
            Self::ProcessInstance => "process instance",
            Self::TaskInstance => "task instance",
        };
        f.write_str(name)
    }
}

/// Access control verdicts. The decision logic lives elsewhere.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// Whether `operator` may perform `action` on resources of this type.
    async fn can_operate(&self, operator: &Operator, resource: ResourceType, action: &str) -> bool;
}

/// Client for the engine that fires cron triggers.
///
/// Both calls are idempotent.
#[async_trait]
pub trait TriggerEngineClient: Send + Sync {
    /// Register (or replace) the cron job of a schedule.
    async fn register_cron(&self, schedule: &Schedule) -> anyhow::Result<()>;

    /// Remove the cron job of a schedule.
    async fn deregister_cron(&self, schedule_id: i64) -> anyhow::Result<()>;
}

/// Liveness of the execution engine.
#[async_trait]
pub trait ExecutionEngineDiscovery: Send + Sync {
    /// Whether at least one master node is registered and reachable.
    async fn has_available_node(&self) -> bool;
}

/// Time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// ============================================================================
// In-process implementations
// ============================================================================

/// Grants everything except explicitly denied (user, action) pairs.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    denied: Arc<RwLock<HashSet<(i64, String)>>>,
}

impl StaticPermissions {
    /// Allow every action for every user.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Deny `action` to `user_id`.
    pub fn deny(&self, user_id: i64, action: impl Into<String>) {
        self.denied.write().insert((user_id, action.into()));
    }
}

#[async_trait]
impl PermissionChecker for StaticPermissions {
    async fn can_operate(&self, operator: &Operator, _resource: ResourceType, action: &str) -> bool {
        !self
            .denied
            .read()
            .contains(&(operator.id, action.to_string()))
    }
}

/// Keeps registered cron jobs in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTriggerEngine {
    jobs: Arc<RwLock<HashMap<i64, String>>>,
}

impl InMemoryTriggerEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a job is registered for the schedule.
    #[must_use]
    pub fn is_registered(&self, schedule_id: i64) -> bool {
        self.jobs.read().contains_key(&schedule_id)
    }

    /// Cron expression registered for the schedule.
    #[must_use]
    pub fn registered_cron(&self, schedule_id: i64) -> Option<String> {
        self.jobs.read().get(&schedule_id).cloned()
    }
}

#[async_trait]
impl TriggerEngineClient for InMemoryTriggerEngine {
    async fn register_cron(&self, schedule: &Schedule) -> anyhow::Result<()> {
        self.jobs
            .write()
            .insert(schedule.id, schedule.crontab.clone());
        Ok(())
    }

    async fn deregister_cron(&self, schedule_id: i64) -> anyhow::Result<()> {
        self.jobs.write().remove(&schedule_id);
        Ok(())
    }
}

/// Discovery backed by a flag, flipped by whoever tracks node heartbeats.
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    available: Arc<AtomicBool>,
}

impl StaticDiscovery {
    #[must_use]
    pub fn new(available: bool) -> Self {
        Self {
            available: Arc::new(AtomicBool::new(available)),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExecutionEngineDiscovery for StaticDiscovery {
    async fn has_available_node(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
