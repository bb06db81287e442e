//! Command construction and persistence.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::backfill::BackfillPlanner;
use crate::config::ControlConfig;
use crate::database::{CommandRepository, DuplicateKey};
use crate::domain::{
    CMD_PARAM_COMPLEMENT_DATA_END_DATE, CMD_PARAM_COMPLEMENT_DATA_START_DATE,
    CMD_PARAM_START_NODES, CMD_PARAM_START_PARAMS, COMMAND_DATE_FORMAT, Command, CommandType,
    FailureStrategy, Priority, RunMode, TaskDependType, WarningType,
};
use crate::error::{ControlError, ControlResult};

/// Everything needed to queue a run of a workflow definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command_type: CommandType,
    pub workflow_definition_code: i64,
    pub executor_id: i64,
    /// Task codes to start from; empty runs the whole DAG.
    pub start_nodes: Vec<i64>,
    /// Global parameter overrides.
    pub start_params: BTreeMap<String, String>,
    pub task_depend_type: TaskDependType,
    pub failure_strategy: FailureStrategy,
    pub warning_type: WarningType,
    pub warning_group_id: Option<i64>,
    /// Falls back to the configured default group.
    pub worker_group: Option<String>,
    pub environment_code: Option<i64>,
    /// Falls back to the configured default priority.
    pub priority: Option<Priority>,
    /// Backfill window, for `COMPLEMENT_DATA`.
    pub complement_window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub run_mode: RunMode,
    /// Upper bound on the number of PARALLEL backfill commands.
    pub expected_parallelism: Option<usize>,
}

impl CommandRequest {
    /// A plain `START_PROCESS` request.
    #[must_use]
    pub fn start(workflow_definition_code: i64, executor_id: i64) -> Self {
        Self {
            workflow_definition_code,
            executor_id,
            ..Self::default()
        }
    }

    /// A `COMPLEMENT_DATA` request over `[start, end]`.
    #[must_use]
    pub fn complement(
        workflow_definition_code: i64,
        executor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        run_mode: RunMode,
    ) -> Self {
        Self {
            command_type: CommandType::ComplementData,
            workflow_definition_code,
            executor_id,
            complement_window: Some((start, end)),
            run_mode,
            ..Self::default()
        }
    }
}

/// Queue a command, reporting a uniqueness conflict as
/// [`ControlError::DuplicateCommandPending`].
pub async fn insert_command(
    commands: &dyn CommandRepository,
    command: Command,
) -> ControlResult<u64> {
    let workflow_code = command.workflow_definition_code;
    let command_type = command.command_type;
    match commands.insert(command).await {
        Ok(rows) => Ok(rows),
        Err(e) if e.downcast_ref::<DuplicateKey>().is_some() => {
            Err(ControlError::DuplicateCommandPending {
                workflow_code,
                command_type: command_type.to_string(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Turns [`CommandRequest`]s into queued commands.
#[derive(Clone)]
pub struct CommandFactory {
    commands: Arc<dyn CommandRepository>,
    planner: BackfillPlanner,
    config: ControlConfig,
}

impl fmt::Debug for CommandFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandFactory")
            .field("planner", &self.planner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CommandFactory {
    #[must_use]
    pub fn new(
        commands: Arc<dyn CommandRepository>,
        planner: BackfillPlanner,
        config: ControlConfig,
    ) -> Self {
        Self {
            commands,
            planner,
            config,
        }
    }

    /// Build and persist the commands for `request`.
    ///
    /// Returns the number of commands queued. A backfill produces one
    /// command per planned entry; anything else produces one command, or
    /// none when the repository affected no rows.
    pub async fn build(&self, request: &CommandRequest) -> ControlResult<usize> {
        let template = self.template(request)?;

        if request.command_type != CommandType::ComplementData {
            let rows = insert_command(self.commands.as_ref(), template).await?;
            debug!(
                workflow_code = request.workflow_definition_code,
                command_type = %request.command_type,
                "Command queued"
            );
            return Ok(usize::from(rows > 0));
        }

        let (start, end) = request
            .complement_window
            .ok_or_else(|| ControlError::InvalidParameter {
                name: "complement_window".to_string(),
                reason: "a backfill needs a start and end date".to_string(),
            })?;

        let entries = self
            .planner
            .plan(
                request.workflow_definition_code,
                start,
                end,
                request.run_mode,
                request.expected_parallelism,
            )
            .await?;

        let mut created = 0;
        for entry in &entries {
            let mut command = template.clone();
            command.parameters.insert(
                CMD_PARAM_COMPLEMENT_DATA_START_DATE.to_string(),
                entry.start.format(COMMAND_DATE_FORMAT).to_string(),
            );
            command.parameters.insert(
                CMD_PARAM_COMPLEMENT_DATA_END_DATE.to_string(),
                entry.end.format(COMMAND_DATE_FORMAT).to_string(),
            );
            if insert_command(self.commands.as_ref(), command).await? > 0 {
                created += 1;
            }
        }

        info!(
            workflow_code = request.workflow_definition_code,
            run_mode = ?request.run_mode,
            commands = created,
            "Backfill commands queued"
        );
        Ok(created)
    }

    fn template(&self, request: &CommandRequest) -> ControlResult<Command> {
        let mut command = Command::new(
            request.command_type,
            request.workflow_definition_code,
            request.executor_id,
        );
        command.task_depend_type = request.task_depend_type;
        command.failure_strategy = request.failure_strategy;
        command.warning_type = request.warning_type;
        command.warning_group_id = request.warning_group_id;
        command.environment_code = request.environment_code;
        command.priority = request.priority.unwrap_or(self.config.default_priority);
        command.worker_group = request
            .worker_group
            .clone()
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| self.config.default_worker_group.clone());

        if !request.start_nodes.is_empty() {
            let nodes = request
                .start_nodes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            command
                .parameters
                .insert(CMD_PARAM_START_NODES.to_string(), nodes);
        }
        if !request.start_params.is_empty() {
            command.parameters.insert(
                CMD_PARAM_START_PARAMS.to_string(),
                serde_json::to_string(&request.start_params)?,
            );
        }
        Ok(command)
    }
}
