//! Commands: the queued execution directives handed to the execution engine.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Parameter key holding the id of the instance a command recovers.
pub const CMD_PARAM_RECOVER_PROCESS_ID: &str = "ProcessInstanceId";
/// Parameter key for the first date of a complement (backfill) range.
pub const CMD_PARAM_COMPLEMENT_DATA_START_DATE: &str = "complementStartDate";
/// Parameter key for the last date of a complement (backfill) range.
pub const CMD_PARAM_COMPLEMENT_DATA_END_DATE: &str = "complementEndDate";
/// Parameter key for the comma separated list of start node codes.
pub const CMD_PARAM_START_NODES: &str = "StartNodeIdList";
/// Parameter key for the JSON encoded start parameters.
pub const CMD_PARAM_START_PARAMS: &str = "StartParams";

/// Format used for dates stored in command parameters.
pub const COMMAND_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of work a command asks the execution engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    #[default]
    StartProcess,
    StartCurrentTaskProcess,
    RecoverToleranceFaultProcess,
    RecoverSuspendedProcess,
    StartFailureTaskProcess,
    ComplementData,
    Scheduler,
    RepeatRunning,
    Pause,
    Stop,
    RecoverWaitingThread,
}

impl CommandType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartProcess => "START_PROCESS",
            Self::StartCurrentTaskProcess => "START_CURRENT_TASK_PROCESS",
            Self::RecoverToleranceFaultProcess => "RECOVER_TOLERANCE_FAULT_PROCESS",
            Self::RecoverSuspendedProcess => "RECOVER_SUSPENDED_PROCESS",
            Self::StartFailureTaskProcess => "START_FAILURE_TASK_PROCESS",
            Self::ComplementData => "COMPLEMENT_DATA",
            Self::Scheduler => "SCHEDULER",
            Self::RepeatRunning => "REPEAT_RUNNING",
            Self::Pause => "PAUSE",
            Self::Stop => "STOP",
            Self::RecoverWaitingThread => "RECOVER_WAITING_THREAD",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tasks around the start nodes are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskDependType {
    TaskOnly,
    TaskPre,
    #[default]
    TaskPost,
}

/// What the engine does with the rest of the DAG when a task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureStrategy {
    #[default]
    End,
    Continue,
}

/// When alerts are sent for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningType {
    #[default]
    None,
    Success,
    Failure,
    All,
}

/// Queue priority of a command and the instance it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Highest,
    High,
    #[default]
    Medium,
    Low,
    Lowest,
}

/// How a backfill range is split into commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    /// One command spanning the whole range.
    #[default]
    Serial,
    /// One command per schedule fire date (or per day).
    Parallel,
}

impl FromStr for RunMode {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SERIAL" | "RUN_MODE_SERIAL" => Ok(Self::Serial),
            "PARALLEL" | "RUN_MODE_PARALLEL" => Ok(Self::Parallel),
            _ => Err(ControlError::InvalidRunMode(s.to_string())),
        }
    }
}

/// A durable, queued execution directive.
///
/// Built once by the command factory or the control state machine and never
/// changed afterwards; the execution engine consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Assigned by the repository on insert; zero before that.
    pub id: i64,
    pub command_type: CommandType,
    pub workflow_definition_code: i64,
    /// Instance the command acts on, for recovery commands.
    pub process_instance_id: Option<i64>,
    /// Mode-specific parameters (see the `CMD_PARAM_*` keys).
    pub parameters: BTreeMap<String, String>,
    pub executor_id: i64,
    pub priority: Priority,
    pub worker_group: String,
    pub environment_code: Option<i64>,
    pub warning_type: WarningType,
    pub warning_group_id: Option<i64>,
    pub failure_strategy: FailureStrategy,
    pub task_depend_type: TaskDependType,
    pub start_time: DateTime<Utc>,
}

impl Command {
    /// Create a command with default execution policy.
    #[must_use]
    pub fn new(command_type: CommandType, workflow_definition_code: i64, executor_id: i64) -> Self {
        Self {
            id: 0,
            command_type,
            workflow_definition_code,
            process_instance_id: None,
            parameters: BTreeMap::new(),
            executor_id,
            priority: Priority::default(),
            worker_group: crate::config::DEFAULT_WORKER_GROUP.to_string(),
            environment_code: None,
            warning_type: WarningType::default(),
            warning_group_id: None,
            failure_strategy: FailureStrategy::default(),
            task_depend_type: TaskDependType::default(),
            start_time: Utc::now(),
        }
    }

    /// Look up a parameter.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Whether `other` would ask the engine to do the same work.
    ///
    /// Two commands are equivalent when they share type, workflow and
    /// recovered instance.
    #[must_use]
    pub fn is_equivalent(&self, other: &Command) -> bool {
        self.command_type == other.command_type
            && self.workflow_definition_code == other.workflow_definition_code
            && self.param(CMD_PARAM_RECOVER_PROCESS_ID) == other.param(CMD_PARAM_RECOVER_PROCESS_ID)
    }
}
