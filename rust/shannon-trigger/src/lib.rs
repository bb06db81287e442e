//! Shannon Trigger - workflow run triggering and run control
//!
//! This crate turns user intent ("run now", "backfill this range", "pause",
//! "stop", "rerun", "resume") into durable commands for the execution engine,
//! and manages the cron schedules that produce such commands automatically.
//!
//! # Architecture
//!
//! - [`scheduler`]: cron evaluation, schedule validation and the schedule lifecycle
//! - [`executor`]: run requests, backfill planning, command building and run control
//! - [`domain`]: commands, workflow definitions and workflow instances
//! - [`database`]: repository traits and an in-memory store
//! - [`runtime`]: permission, trigger engine and execution engine collaborators
//! - [`config`]: configuration management and environment loading
//!
//! # Example
//!
//! ```rust,ignore
//! use shannon_trigger::{Collaborators, ControlPlane, config::AppConfig};
//!
//! let store = InMemoryStore::new();
//! let engine = InMemoryTriggerEngine::new();
//! let plane = ControlPlane::new(AppConfig::load()?, Collaborators::in_memory(&store, &engine))?;
//!
//! let schedule = plane.schedules.create(&operator, code, params, policy).await?;
//! plane.schedules.online(&operator, schedule.id).await?;
//! ```

pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod executor;
pub mod logging;
pub mod runtime;
pub mod scheduler;

use std::fmt;
use std::sync::Arc;

use config::AppConfig;
use database::{
    CommandRepository, InMemoryStore, ProcessInstanceRepository, ScheduleRepository,
    WorkflowDefinitionRepository,
};
use executor::{BackfillPlanner, CommandFactory, ExecutionStateMachine, WaitingTaskCache, WorkflowTrigger};
use runtime::{
    ExecutionEngineDiscovery, InMemoryTriggerEngine, PermissionChecker, StaticDiscovery,
    StaticPermissions, TriggerEngineClient,
};
use scheduler::{CronParser, ScheduleLifecycleManager};

pub use error::{ControlError, ControlResult, ErrorKind};

/// External systems the control plane talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub commands: Arc<dyn CommandRepository>,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub definitions: Arc<dyn WorkflowDefinitionRepository>,
    pub instances: Arc<dyn ProcessInstanceRepository>,
    pub permissions: Arc<dyn PermissionChecker>,
    pub trigger_engine: Arc<dyn TriggerEngineClient>,
    pub discovery: Arc<dyn ExecutionEngineDiscovery>,
}

impl Collaborators {
    /// Everything backed by in-process implementations: one store for all
    /// repositories, permissive access control and an available engine.
    #[must_use]
    pub fn in_memory(store: &InMemoryStore, trigger_engine: &InMemoryTriggerEngine) -> Self {
        Self {
            commands: Arc::new(store.clone()),
            schedules: Arc::new(store.clone()),
            definitions: Arc::new(store.clone()),
            instances: Arc::new(store.clone()),
            permissions: Arc::new(StaticPermissions::allow_all()),
            trigger_engine: Arc::new(trigger_engine.clone()),
            discovery: Arc::new(StaticDiscovery::new(true)),
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// The wired-up trigger and control components.
#[derive(Debug, Clone)]
pub struct ControlPlane {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Schedule create/update/online/offline/delete/preview.
    pub schedules: ScheduleLifecycleManager,
    /// "Run now" and backfill requests.
    pub trigger: WorkflowTrigger,
    /// Pause, stop and recovery of existing instances.
    pub control: ExecutionStateMachine,
    /// Task instances waiting for a slot, shared with the dispatcher.
    pub waiting_tasks: Arc<WaitingTaskCache>,
}

impl ControlPlane {
    /// Wire the components.
    ///
    /// Fails with [`ControlError::InvalidTimezone`] when the configured
    /// default timezone is unknown.
    pub fn new(config: AppConfig, collaborators: Collaborators) -> ControlResult<Self> {
        let calendar_tz = CronParser::parse_timezone(&config.control.default_timezone)?;
        let waiting_tasks = Arc::new(WaitingTaskCache::new());

        let schedules = ScheduleLifecycleManager::new(
            Arc::clone(&collaborators.schedules),
            Arc::clone(&collaborators.definitions),
            Arc::clone(&collaborators.permissions),
            Arc::clone(&collaborators.trigger_engine),
            config.control.clone(),
        );

        let planner = BackfillPlanner::new(Arc::clone(&collaborators.schedules), calendar_tz);
        let factory = CommandFactory::new(
            Arc::clone(&collaborators.commands),
            planner,
            config.control.clone(),
        );
        let trigger = WorkflowTrigger::new(
            Arc::clone(&collaborators.definitions),
            Arc::clone(&collaborators.permissions),
            Arc::clone(&collaborators.discovery),
            factory,
        );

        let control = ExecutionStateMachine::new(
            collaborators.instances,
            collaborators.definitions,
            collaborators.commands,
            collaborators.permissions,
            collaborators.discovery,
            Arc::clone(&waiting_tasks),
            config.control.clone(),
        );

        tracing::debug!(
            default_timezone = %calendar_tz,
            preview_count = config.control.preview_count,
            "Control plane initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            schedules,
            trigger,
            control,
            waiting_tasks,
        })
    }
}
