//! Repository abstractions for the entities the control plane touches.
//!
//! Persistence lives outside this crate. The traits below are the narrow
//! contracts the trigger and control components rely on: lookups return
//! `None` when the row is missing and writes return affected-row counts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::{Command, ProcessInstance, ReleaseState, WorkflowDefinition};
use crate::scheduler::Schedule;

/// Returned (wrapped in `anyhow::Error`) by a repository when a write loses
/// against a uniqueness constraint.
#[derive(Debug, Clone, thiserror::Error)]
#[error("duplicate key: {0}")]
pub struct DuplicateKey(pub String);

/// Repository trait for queued commands.
#[async_trait]
pub trait CommandRepository: Send + Sync {
    /// Queue a command. Returns the number of rows inserted.
    ///
    /// Fails with [`DuplicateKey`] when an equivalent command is pending.
    async fn insert(&self, command: Command) -> anyhow::Result<u64>;

    /// Whether an equivalent command is already waiting to be consumed.
    async fn exists_pending_equivalent(&self, command: &Command) -> anyhow::Result<bool>;
}

/// Repository trait for schedules.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Get a schedule by ID.
    async fn select_by_id(&self, id: i64) -> anyhow::Result<Option<Schedule>>;

    /// Get the schedule bound to a workflow definition.
    async fn select_by_workflow(&self, workflow_code: i64) -> anyhow::Result<Option<Schedule>>;

    /// All ONLINE schedules of a workflow definition.
    async fn select_online_by_workflow(&self, workflow_code: i64) -> anyhow::Result<Vec<Schedule>>;

    /// Insert a schedule, returning its new ID.
    async fn insert(&self, schedule: &Schedule) -> anyhow::Result<i64>;

    /// Update an existing schedule.
    async fn update(&self, schedule: &Schedule) -> anyhow::Result<u64>;

    /// Delete a schedule.
    async fn delete_by_id(&self, id: i64) -> anyhow::Result<u64>;
}

/// Repository trait for workflow definitions.
#[async_trait]
pub trait WorkflowDefinitionRepository: Send + Sync {
    /// Get a definition by code.
    async fn select_by_code(&self, code: i64) -> anyhow::Result<Option<WorkflowDefinition>>;

    /// Update an existing definition.
    async fn update(&self, definition: &WorkflowDefinition) -> anyhow::Result<u64>;

    /// Resolve the tenant instances of this definition run as.
    async fn resolve_tenant(&self, code: i64) -> anyhow::Result<Option<String>>;
}

/// Repository trait for workflow instances.
#[async_trait]
pub trait ProcessInstanceRepository: Send + Sync {
    /// Get an instance by ID.
    async fn select_by_id(&self, id: i64) -> anyhow::Result<Option<ProcessInstance>>;

    /// Update an existing instance.
    async fn update(&self, instance: &ProcessInstance) -> anyhow::Result<u64>;
}

// ============================================================================
// In-Memory Store (for testing and embedding)
// ============================================================================

#[derive(Debug, Default)]
struct StoreState {
    commands: Vec<Command>,
    schedules: HashMap<i64, Schedule>,
    definitions: HashMap<i64, WorkflowDefinition>,
    instances: HashMap<i64, ProcessInstance>,
    tenants: Vec<String>,
    next_command_id: i64,
    next_schedule_id: i64,
}

/// In-memory store implementing every repository trait.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant so definitions referencing it resolve.
    pub fn add_tenant(&self, tenant_code: impl Into<String>) {
        self.state.write().tenants.push(tenant_code.into());
    }

    /// Insert or replace a workflow definition.
    pub fn put_definition(&self, definition: WorkflowDefinition) {
        self.state
            .write()
            .definitions
            .insert(definition.code, definition);
    }

    /// Insert or replace a workflow instance.
    pub fn put_instance(&self, instance: ProcessInstance) {
        self.state.write().instances.insert(instance.id, instance);
    }

    /// Commands waiting to be consumed, in insertion order.
    #[must_use]
    pub fn pending_commands(&self) -> Vec<Command> {
        self.state.read().commands.clone()
    }

    /// Remove and return all pending commands, as the execution engine would.
    pub fn drain_commands(&self) -> Vec<Command> {
        std::mem::take(&mut self.state.write().commands)
    }

    /// Current copy of a definition.
    #[must_use]
    pub fn definition(&self, code: i64) -> Option<WorkflowDefinition> {
        self.state.read().definitions.get(&code).cloned()
    }

    /// Current copy of an instance.
    #[must_use]
    pub fn instance(&self, id: i64) -> Option<ProcessInstance> {
        self.state.read().instances.get(&id).cloned()
    }
}

#[async_trait]
impl CommandRepository for InMemoryStore {
    async fn insert(&self, mut command: Command) -> anyhow::Result<u64> {
        let mut state = self.state.write();
        // Only recovery commands carry an instance id; those are unique while pending.
        if command.process_instance_id.is_some()
            && state.commands.iter().any(|c| c.is_equivalent(&command))
        {
            return Err(DuplicateKey(format!(
                "{} for workflow {}",
                command.command_type, command.workflow_definition_code
            ))
            .into());
        }
        state.next_command_id += 1;
        command.id = state.next_command_id;
        state.commands.push(command);
        Ok(1)
    }

    async fn exists_pending_equivalent(&self, command: &Command) -> anyhow::Result<bool> {
        let state = self.state.read();
        Ok(state.commands.iter().any(|c| c.is_equivalent(command)))
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryStore {
    async fn select_by_id(&self, id: i64) -> anyhow::Result<Option<Schedule>> {
        Ok(self.state.read().schedules.get(&id).cloned())
    }

    async fn select_by_workflow(&self, workflow_code: i64) -> anyhow::Result<Option<Schedule>> {
        let state = self.state.read();
        Ok(state
            .schedules
            .values()
            .find(|s| s.workflow_definition_code == workflow_code)
            .cloned())
    }

    async fn select_online_by_workflow(&self, workflow_code: i64) -> anyhow::Result<Vec<Schedule>> {
        let state = self.state.read();
        let mut schedules: Vec<_> = state
            .schedules
            .values()
            .filter(|s| {
                s.workflow_definition_code == workflow_code
                    && s.release_state == ReleaseState::Online
            })
            .cloned()
            .collect();
        schedules.sort_by_key(|s| s.id);
        Ok(schedules)
    }

    async fn insert(&self, schedule: &Schedule) -> anyhow::Result<i64> {
        let mut state = self.state.write();
        if state
            .schedules
            .values()
            .any(|s| s.workflow_definition_code == schedule.workflow_definition_code)
        {
            return Err(DuplicateKey(format!(
                "schedule for workflow {}",
                schedule.workflow_definition_code
            ))
            .into());
        }
        state.next_schedule_id += 1;
        let id = state.next_schedule_id;
        let mut stored = schedule.clone();
        stored.id = id;
        state.schedules.insert(id, stored);
        Ok(id)
    }

    async fn update(&self, schedule: &Schedule) -> anyhow::Result<u64> {
        let mut state = self.state.write();
        match state.schedules.get_mut(&schedule.id) {
            Some(existing) => {
                *existing = schedule.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_by_id(&self, id: i64) -> anyhow::Result<u64> {
        let mut state = self.state.write();
        Ok(u64::from(state.schedules.remove(&id).is_some()))
    }
}

#[async_trait]
impl WorkflowDefinitionRepository for InMemoryStore {
    async fn select_by_code(&self, code: i64) -> anyhow::Result<Option<WorkflowDefinition>> {
        Ok(self.definition(code))
    }

    async fn update(&self, definition: &WorkflowDefinition) -> anyhow::Result<u64> {
        let mut state = self.state.write();
        match state.definitions.get_mut(&definition.code) {
            Some(existing) => {
                *existing = definition.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn resolve_tenant(&self, code: i64) -> anyhow::Result<Option<String>> {
        let state = self.state.read();
        Ok(state
            .definitions
            .get(&code)
            .and_then(|d| d.tenant_code.clone())
            .filter(|t| state.tenants.contains(t)))
    }
}

#[async_trait]
impl ProcessInstanceRepository for InMemoryStore {
    async fn select_by_id(&self, id: i64) -> anyhow::Result<Option<ProcessInstance>> {
        Ok(self.instance(id))
    }

    async fn update(&self, instance: &ProcessInstance) -> anyhow::Result<u64> {
        let mut state = self.state.write();
        match state.instances.get_mut(&instance.id) {
            Some(existing) => {
                *existing = instance.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
