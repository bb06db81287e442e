//! Schedule management for periodic workflow execution.
//!
//! A [`Schedule`] binds one cron expression to one workflow definition. This
//! module validates schedules, evaluates their fire times and drives their
//! OFFLINE/ONLINE lifecycle against the external trigger engine.

pub mod cron;
pub mod lifecycle;
pub mod validator;

pub use cron::{CronError, CronExpression, CronParser};
pub use lifecycle::ScheduleLifecycleManager;
pub use validator::ScheduleValidator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{FailureStrategy, Priority, ReleaseState, WarningType};

/// Cron window and expression supplied by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleParams {
    /// Start of the cron evaluation window.
    pub start_time: DateTime<Utc>,
    /// End of the cron evaluation window.
    pub end_time: DateTime<Utc>,
    /// Cron expression (e.g., "0 0 0 * * *" for daily at midnight).
    pub crontab: String,
    /// IANA timezone the expression is evaluated in.
    pub timezone_id: String,
}

/// Execution policy copied into every command a schedule spawns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchedulePolicy {
    pub warning_type: WarningType,
    pub warning_group_id: Option<i64>,
    pub failure_strategy: FailureStrategy,
    pub worker_group: Option<String>,
    pub tenant_code: Option<String>,
    pub environment_code: Option<i64>,
    pub workflow_instance_priority: Priority,
}

/// A cron trigger bound to a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// Assigned by the repository on insert.
    pub id: i64,
    /// Workflow definition this schedule triggers.
    pub workflow_definition_code: i64,
    /// Cron expression.
    pub crontab: String,
    /// IANA timezone id.
    pub timezone_id: String,
    /// Start of the cron evaluation window.
    pub start_time: DateTime<Utc>,
    /// End of the cron evaluation window.
    pub end_time: DateTime<Utc>,
    /// Whether the trigger engine fires this schedule.
    pub release_state: ReleaseState,
    pub warning_type: WarningType,
    pub warning_group_id: Option<i64>,
    pub failure_strategy: FailureStrategy,
    pub worker_group: String,
    pub tenant_code: Option<String>,
    pub environment_code: Option<i64>,
    pub workflow_instance_priority: Priority,
    /// Owner.
    pub user_id: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Build an OFFLINE schedule from validated input.
    #[must_use]
    pub fn new(
        workflow_definition_code: i64,
        params: ScheduleParams,
        policy: SchedulePolicy,
        user_id: i64,
        default_worker_group: &str,
    ) -> Self {
        let now = Utc::now();
        let mut schedule = Self {
            id: 0,
            workflow_definition_code,
            crontab: String::new(),
            timezone_id: String::new(),
            start_time: params.start_time,
            end_time: params.end_time,
            release_state: ReleaseState::Offline,
            warning_type: WarningType::default(),
            warning_group_id: None,
            failure_strategy: FailureStrategy::default(),
            worker_group: default_worker_group.to_string(),
            tenant_code: None,
            environment_code: None,
            workflow_instance_priority: Priority::default(),
            user_id,
            created_at: now,
            updated_at: now,
        };
        schedule.apply(params, policy, default_worker_group);
        schedule
    }

    /// Overwrite the mutable fields.
    pub fn apply(&mut self, params: ScheduleParams, policy: SchedulePolicy, default_worker_group: &str) {
        self.crontab = params.crontab;
        self.timezone_id = params.timezone_id;
        self.start_time = params.start_time;
        self.end_time = params.end_time;
        self.warning_type = policy.warning_type;
        self.warning_group_id = policy.warning_group_id;
        self.failure_strategy = policy.failure_strategy;
        self.worker_group = policy
            .worker_group
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| default_worker_group.to_string());
        self.tenant_code = policy.tenant_code;
        self.environment_code = policy.environment_code;
        self.workflow_instance_priority = policy.workflow_instance_priority;
        self.updated_at = Utc::now();
    }
}
