//! Shared fixtures for the integration tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use shannon_trigger::config::AppConfig;
use shannon_trigger::database::InMemoryStore;
use shannon_trigger::domain::{ExecutionStatus, ProcessInstance, WorkflowDefinition};
use shannon_trigger::runtime::{
    InMemoryTriggerEngine, StaticDiscovery, StaticPermissions, TriggerEngineClient,
};
use shannon_trigger::scheduler::ScheduleParams;
use shannon_trigger::{Collaborators, ControlPlane};

pub const TENANT: &str = "analytics";

/// A control plane over in-memory collaborators, with handles to poke them.
pub struct Fixture {
    pub store: InMemoryStore,
    pub engine: InMemoryTriggerEngine,
    pub permissions: StaticPermissions,
    pub discovery: StaticDiscovery,
    pub plane: ControlPlane,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(AppConfig::default(), None)
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_trigger_engine(trigger_engine: Arc<dyn TriggerEngineClient>) -> Self {
        Self::build(AppConfig::default(), Some(trigger_engine))
    }

    fn build(config: AppConfig, trigger_engine: Option<Arc<dyn TriggerEngineClient>>) -> Self {
        let store = InMemoryStore::new();
        store.add_tenant(TENANT);
        let engine = InMemoryTriggerEngine::new();
        let permissions = StaticPermissions::allow_all();
        let discovery = StaticDiscovery::new(true);

        let defaults = Collaborators::in_memory(&store, &engine);
        let trigger_engine =
            trigger_engine.unwrap_or_else(|| Arc::clone(&defaults.trigger_engine));
        let collaborators = Collaborators {
            permissions: Arc::new(permissions.clone()),
            discovery: Arc::new(discovery.clone()),
            trigger_engine,
            ..defaults
        };
        let plane = ControlPlane::new(config, collaborators).expect("valid config");

        Self {
            store,
            engine,
            permissions,
            discovery,
            plane,
        }
    }

    /// Store a released definition owned by user 1 whose tenant resolves.
    pub fn released_workflow(&self, code: i64) -> WorkflowDefinition {
        let definition = WorkflowDefinition::new(code, format!("workflow-{code}"), 1)
            .released()
            .with_tenant(TENANT);
        self.store.put_definition(definition.clone());
        definition
    }

    /// Store an instance of `code` in `state`.
    pub fn instance(&self, id: i64, code: i64, state: ExecutionStatus) -> ProcessInstance {
        let instance = ProcessInstance::new(id, code, state);
        self.store.put_instance(instance.clone());
        instance
    }
}

pub fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// Daily at midnight UTC through 2024.
pub fn daily_params() -> ScheduleParams {
    cron_params("0 0 0 * * *")
}

pub fn cron_params(crontab: &str) -> ScheduleParams {
    ScheduleParams {
        start_time: utc(2024, 1, 1),
        end_time: utc(2024, 12, 31),
        crontab: crontab.to_string(),
        timezone_id: "UTC".to_string(),
    }
}
