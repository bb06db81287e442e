//! Schedule lifecycle: create, update, online, offline, delete and preview.
//!
//! A schedule starts OFFLINE. Going ONLINE registers its cron job with the
//! trigger engine; going OFFLINE removes it. Both transitions touch two
//! systems, so they run as a small saga: the database flip happens first and
//! is compensated if the trigger engine call fails.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use super::{CronParser, Schedule, ScheduleParams, SchedulePolicy, ScheduleValidator};
use crate::config::ControlConfig;
use crate::database::{DuplicateKey, ScheduleRepository, WorkflowDefinitionRepository};
use crate::domain::{COMMAND_DATE_FORMAT, Operator, ReleaseState, WorkflowDefinition};
use crate::error::{ControlError, ControlResult};
use crate::logging::OpTimer;
use crate::runtime::{Clock, PermissionChecker, ResourceType, SystemClock, TriggerEngineClient};

/// Point a workflow definition at the alert group used by its runs.
///
/// Called explicitly after a schedule or a run request has been accepted. A
/// no-op when the definition already points at `warning_group_id`.
pub async fn sync_warning_group(
    definitions: &dyn WorkflowDefinitionRepository,
    definition: &WorkflowDefinition,
    warning_group_id: Option<i64>,
) -> ControlResult<()> {
    if definition.warning_group_id == warning_group_id {
        return Ok(());
    }

    let mut updated = definition.clone();
    updated.warning_group_id = warning_group_id;
    updated.updated_at = chrono::Utc::now();
    definitions.update(&updated).await?;

    debug!(
        workflow_code = definition.code,
        warning_group_id = ?warning_group_id,
        "Workflow warning group updated"
    );
    Ok(())
}

/// Fail with [`ControlError::WorkflowDefinitionNotReleased`] unless the
/// definition and every sub-workflow it invokes are ONLINE.
pub async fn ensure_released(
    definitions: &dyn WorkflowDefinitionRepository,
    definition: &WorkflowDefinition,
) -> ControlResult<()> {
    if !definition.release_state.is_online() {
        return Err(ControlError::WorkflowDefinitionNotReleased(definition.code));
    }

    for &code in &definition.sub_workflow_codes {
        let released = definitions
            .select_by_code(code)
            .await?
            .is_some_and(|sub| sub.release_state.is_online());
        if !released {
            return Err(ControlError::WorkflowDefinitionNotReleased(code));
        }
    }
    Ok(())
}

/// Manages schedules and keeps the trigger engine in step with them.
#[derive(Clone)]
pub struct ScheduleLifecycleManager {
    schedules: Arc<dyn ScheduleRepository>,
    definitions: Arc<dyn WorkflowDefinitionRepository>,
    permissions: Arc<dyn PermissionChecker>,
    trigger_engine: Arc<dyn TriggerEngineClient>,
    clock: Arc<dyn Clock>,
    config: ControlConfig,
}

impl fmt::Debug for ScheduleLifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleLifecycleManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScheduleLifecycleManager {
    /// Create a manager using the wall clock.
    #[must_use]
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        definitions: Arc<dyn WorkflowDefinitionRepository>,
        permissions: Arc<dyn PermissionChecker>,
        trigger_engine: Arc<dyn TriggerEngineClient>,
        config: ControlConfig,
    ) -> Self {
        Self {
            schedules,
            definitions,
            permissions,
            trigger_engine,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replace the time source used by [`Self::preview`].
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create an OFFLINE schedule for a workflow definition.
    pub async fn create(
        &self,
        operator: &Operator,
        workflow_code: i64,
        params: ScheduleParams,
        policy: SchedulePolicy,
    ) -> ControlResult<Schedule> {
        let timer = OpTimer::new("schedule", "create");
        let result = self.do_create(operator, workflow_code, params, policy).await;
        timer.finish_with_result(&result);
        result
    }

    async fn do_create(
        &self,
        operator: &Operator,
        workflow_code: i64,
        params: ScheduleParams,
        policy: SchedulePolicy,
    ) -> ControlResult<Schedule> {
        self.check_permission(operator, "create").await?;

        let definition = self.load_definition(workflow_code).await?;
        if self.schedules.select_by_workflow(workflow_code).await?.is_some() {
            return Err(ControlError::ScheduleAlreadyExists(workflow_code));
        }

        ScheduleValidator::validate(&params)?;

        let warning_group_id = policy.warning_group_id;
        let mut schedule = Schedule::new(
            workflow_code,
            params,
            policy,
            operator.id,
            &self.config.default_worker_group,
        );
        schedule.id = match self.schedules.insert(&schedule).await {
            Ok(id) => id,
            Err(e) if e.downcast_ref::<DuplicateKey>().is_some() => {
                return Err(ControlError::ScheduleAlreadyExists(workflow_code));
            }
            Err(e) => return Err(e.into()),
        };

        sync_warning_group(self.definitions.as_ref(), &definition, warning_group_id).await?;

        info!(
            schedule_id = schedule.id,
            workflow_code = workflow_code,
            crontab = %schedule.crontab,
            "Schedule created"
        );
        Ok(schedule)
    }

    /// Overwrite the cron window and policy of an OFFLINE schedule.
    pub async fn update(
        &self,
        operator: &Operator,
        schedule_id: i64,
        params: ScheduleParams,
        policy: SchedulePolicy,
    ) -> ControlResult<Schedule> {
        let timer = OpTimer::new("schedule", "update");
        let result = self.do_update(operator, schedule_id, params, policy).await;
        timer.finish_with_result(&result);
        result
    }

    async fn do_update(
        &self,
        operator: &Operator,
        schedule_id: i64,
        params: ScheduleParams,
        policy: SchedulePolicy,
    ) -> ControlResult<Schedule> {
        self.check_permission(operator, "update").await?;

        let mut schedule = self.load_schedule(schedule_id).await?;
        if schedule.release_state.is_online() {
            return Err(ControlError::ScheduleOnlineForbidsUpdate(schedule_id));
        }

        ScheduleValidator::validate(&params)?;
        let definition = self.load_definition(schedule.workflow_definition_code).await?;

        let warning_group_id = policy.warning_group_id;
        schedule.apply(params, policy, &self.config.default_worker_group);
        if self.schedules.update(&schedule).await? == 0 {
            return Err(ControlError::ScheduleNotFound(schedule_id));
        }

        sync_warning_group(self.definitions.as_ref(), &definition, warning_group_id).await?;

        info!(schedule_id = schedule_id, "Schedule updated");
        Ok(schedule)
    }

    /// Bring a schedule ONLINE and register it with the trigger engine.
    ///
    /// Already ONLINE schedules are returned unchanged.
    pub async fn online(&self, operator: &Operator, schedule_id: i64) -> ControlResult<Schedule> {
        let timer = OpTimer::new("schedule", "online");
        let result = self.do_online(operator, schedule_id).await;
        timer.finish_with_result(&result);
        result
    }

    async fn do_online(&self, operator: &Operator, schedule_id: i64) -> ControlResult<Schedule> {
        self.check_permission(operator, "online").await?;

        let mut schedule = self.load_schedule(schedule_id).await?;
        if schedule.release_state.is_online() {
            debug!(schedule_id = schedule_id, "Schedule already online");
            return Ok(schedule);
        }

        let definition = self.load_definition(schedule.workflow_definition_code).await?;
        ensure_released(self.definitions.as_ref(), &definition).await?;

        self.set_release_state(&mut schedule, ReleaseState::Online)
            .await?;
        if let Err(e) = self.trigger_engine.register_cron(&schedule).await {
            return Err(self
                .compensate(&mut schedule, ReleaseState::Offline, &e)
                .await);
        }

        info!(
            schedule_id = schedule_id,
            workflow_code = schedule.workflow_definition_code,
            "Schedule online"
        );
        Ok(schedule)
    }

    /// Take a schedule OFFLINE and remove it from the trigger engine.
    ///
    /// Already OFFLINE schedules are returned unchanged.
    pub async fn offline(&self, operator: &Operator, schedule_id: i64) -> ControlResult<Schedule> {
        let timer = OpTimer::new("schedule", "offline");
        let result = self.do_offline(operator, schedule_id).await;
        timer.finish_with_result(&result);
        result
    }

    async fn do_offline(&self, operator: &Operator, schedule_id: i64) -> ControlResult<Schedule> {
        self.check_permission(operator, "offline").await?;

        let mut schedule = self.load_schedule(schedule_id).await?;
        if !schedule.release_state.is_online() {
            debug!(schedule_id = schedule_id, "Schedule already offline");
            return Ok(schedule);
        }

        self.set_release_state(&mut schedule, ReleaseState::Offline)
            .await?;
        if let Err(e) = self.trigger_engine.deregister_cron(schedule_id).await {
            return Err(self
                .compensate(&mut schedule, ReleaseState::Online, &e)
                .await);
        }

        info!(schedule_id = schedule_id, "Schedule offline");
        Ok(schedule)
    }

    /// Delete an OFFLINE schedule. Only its owner or an administrator may.
    pub async fn delete(&self, operator: &Operator, schedule_id: i64) -> ControlResult<()> {
        let timer = OpTimer::new("schedule", "delete");
        let result = self.do_delete(operator, schedule_id).await;
        timer.finish_with_result(&result);
        result
    }

    async fn do_delete(&self, operator: &Operator, schedule_id: i64) -> ControlResult<()> {
        self.check_permission(operator, "delete").await?;

        let schedule = self.load_schedule(schedule_id).await?;
        if !operator.owns_or_admin(schedule.user_id) {
            return Err(ControlError::permission_denied(
                operator.id,
                ResourceType::Schedule.to_string(),
                "delete",
            ));
        }
        if schedule.release_state.is_online() {
            return Err(ControlError::ScheduleIsOnline(schedule_id));
        }

        if self.schedules.delete_by_id(schedule_id).await? == 0 {
            return Err(ControlError::ScheduleNotFound(schedule_id));
        }

        info!(schedule_id = schedule_id, "Schedule deleted");
        Ok(())
    }

    /// Next fire times of `params`, formatted in the schedule's timezone.
    ///
    /// Starts from the later of now and `params.start_time`, and returns at
    /// most `control.preview_count` entries.
    pub fn preview(&self, params: &ScheduleParams) -> ControlResult<Vec<String>> {
        let expression = CronParser::parse(&params.crontab)?;
        let tz = CronParser::parse_timezone(&params.timezone_id)?;

        let start = params.start_time.max(self.clock.now());
        let fires = expression.fire_times(
            start,
            params.end_time,
            tz,
            Some(self.config.preview_count),
        );

        Ok(fires
            .into_iter()
            .map(|t| t.with_timezone(&tz).format(COMMAND_DATE_FORMAT).to_string())
            .collect())
    }

    async fn check_permission(&self, operator: &Operator, action: &str) -> ControlResult<()> {
        if self
            .permissions
            .can_operate(operator, ResourceType::Schedule, action)
            .await
        {
            Ok(())
        } else {
            Err(ControlError::permission_denied(
                operator.id,
                ResourceType::Schedule.to_string(),
                action,
            ))
        }
    }

    async fn load_schedule(&self, schedule_id: i64) -> ControlResult<Schedule> {
        self.schedules
            .select_by_id(schedule_id)
            .await?
            .ok_or(ControlError::ScheduleNotFound(schedule_id))
    }

    async fn load_definition(&self, code: i64) -> ControlResult<WorkflowDefinition> {
        self.definitions
            .select_by_code(code)
            .await?
            .ok_or(ControlError::WorkflowDefinitionNotFound(code))
    }

    async fn set_release_state(
        &self,
        schedule: &mut Schedule,
        state: ReleaseState,
    ) -> ControlResult<()> {
        schedule.release_state = state;
        schedule.updated_at = chrono::Utc::now();
        if self.schedules.update(schedule).await? == 0 {
            return Err(ControlError::ScheduleNotFound(schedule.id));
        }
        Ok(())
    }

    /// Roll the release state back after a failed trigger engine call.
    ///
    /// When the rollback fails too, the returned reason says so: the stored
    /// schedule is then left in the new state without a matching cron job.
    async fn compensate(
        &self,
        schedule: &mut Schedule,
        previous: ReleaseState,
        cause: &anyhow::Error,
    ) -> ControlError {
        let flipped = schedule.release_state;
        error!(
            schedule_id = schedule.id,
            error = %cause,
            "Trigger engine sync failed, restoring {previous}"
        );

        let reason = match self.set_release_state(schedule, previous).await {
            Ok(()) => cause.to_string(),
            Err(e) => {
                error!(
                    schedule_id = schedule.id,
                    error = %e,
                    "Failed to restore schedule release state"
                );
                format!(
                    "{cause}; restoring {previous} also failed, schedule is stored {flipped}: {e}"
                )
            }
        };

        ControlError::TriggerEngineSyncFailed {
            schedule_id: schedule.id,
            reason,
        }
    }
}
