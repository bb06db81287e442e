//! Error types for trigger and control operations.
//!
//! Every failure a caller can observe is a [`ControlError`] variant. Variants
//! are grouped into an [`ErrorKind`] so the transport layer can decide whether
//! to ask the user to fix input, re-fetch and retry, or back off.

use thiserror::Error;

use crate::domain::{ExecuteType, ExecutionStatus};

/// Core error type for schedule lifecycle, backfill and run control.
#[derive(Error, Debug)]
pub enum ControlError {
    /// Validation errors
    #[error("Invalid time window: start {start} must be before end {end}")]
    InvalidTimeWindow { start: String, end: String },

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Failed to parse cron expression: {0}")]
    CronParse(#[from] crate::scheduler::cron::CronError),

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid run mode: {0}")]
    InvalidRunMode(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// State conflicts
    #[error("Process instance {process_instance_id} is already in state {status}")]
    AlreadyChanged {
        process_instance_id: i64,
        status: ExecutionStatus,
    },

    #[error("An equivalent {command_type} command is already queued for workflow {workflow_code}")]
    DuplicateCommandPending {
        workflow_code: i64,
        command_type: String,
    },

    #[error("Schedule {0} is online, take it offline before updating")]
    ScheduleOnlineForbidsUpdate(i64),

    #[error("Schedule {0} is online and cannot be deleted")]
    ScheduleIsOnline(i64),

    #[error("Workflow {0} already has a schedule")]
    ScheduleAlreadyExists(i64),

    #[error("Cannot {operation} process instance in state {status}")]
    IllegalStateTransition {
        status: ExecutionStatus,
        operation: ExecuteType,
    },

    #[error("Task instance {0} is not waiting to be started")]
    TaskNotWaiting(i64),

    /// Preconditions
    #[error("Workflow definition {0} is not released")]
    WorkflowDefinitionNotReleased(i64),

    #[error("No suitable tenant for workflow {0}")]
    NoSuitableTenant(i64),

    #[error("User {user_id} is not allowed to {action} {resource}")]
    PermissionDenied {
        user_id: i64,
        resource: String,
        action: String,
    },

    /// Infrastructure
    #[error("No execution engine node is available")]
    NoExecutionEngineAvailable,

    #[error("Trigger engine sync failed for schedule {schedule_id}: {reason}")]
    TriggerEngineSyncFailed { schedule_id: i64, reason: String },

    /// Not found
    #[error("Schedule {0} not found")]
    ScheduleNotFound(i64),

    #[error("Workflow definition {0} not found")]
    WorkflowDefinitionNotFound(i64),

    #[error("Process instance {0} not found")]
    ProcessInstanceNotFound(i64),

    /// Collaborator faults (storage, serialization)
    #[error(transparent)]
    Repository(#[from] anyhow::Error),
}

/// Result type alias for control operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Coarse category of a [`ControlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller-correctable input.
    Validation,
    /// Stale view or lost race; re-fetch and retry.
    Conflict,
    /// Entity exists but is not in a usable state.
    Precondition,
    /// Infrastructure fault; caller's backoff applies.
    Unavailable,
    /// Terminal for the request.
    NotFound,
    /// Unexpected collaborator error.
    Internal,
}

impl ControlError {
    /// Category used by callers to choose a retry policy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTimeWindow { .. }
            | Self::InvalidCronExpression { .. }
            | Self::CronParse(_)
            | Self::InvalidTimezone(_)
            | Self::InvalidRunMode(_)
            | Self::InvalidParameter { .. } => ErrorKind::Validation,
            Self::AlreadyChanged { .. }
            | Self::DuplicateCommandPending { .. }
            | Self::ScheduleOnlineForbidsUpdate(_)
            | Self::ScheduleIsOnline(_)
            | Self::ScheduleAlreadyExists(_)
            | Self::IllegalStateTransition { .. }
            | Self::TaskNotWaiting(_) => ErrorKind::Conflict,
            Self::WorkflowDefinitionNotReleased(_)
            | Self::NoSuitableTenant(_)
            | Self::PermissionDenied { .. } => ErrorKind::Precondition,
            Self::NoExecutionEngineAvailable | Self::TriggerEngineSyncFailed { .. } => {
                ErrorKind::Unavailable
            }
            Self::ScheduleNotFound(_)
            | Self::WorkflowDefinitionNotFound(_)
            | Self::ProcessInstanceNotFound(_) => ErrorKind::NotFound,
            Self::Repository(_) => ErrorKind::Internal,
        }
    }

    /// Create an invalid time window error from any displayable bounds.
    pub fn invalid_window(start: impl std::fmt::Display, end: impl std::fmt::Display) -> Self {
        Self::InvalidTimeWindow {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    /// Create a permission denied error.
    pub fn permission_denied(
        user_id: i64,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self::PermissionDenied {
            user_id,
            resource: resource.into(),
            action: action.into(),
        }
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(err: serde_json::Error) -> Self {
        ControlError::InvalidParameter {
            name: "parameters".to_string(),
            reason: err.to_string(),
        }
    }
}
