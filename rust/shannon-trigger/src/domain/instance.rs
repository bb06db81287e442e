//! Workflow instance state as seen by the control plane.
//!
//! The execution engine owns the full lifecycle of a [`ProcessInstance`].
//! This crate only reads its status and, for PAUSE and STOP, writes the
//! pending intent back onto the instance.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::command::CommandType;

/// Status of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    SubmittedSuccess,
    RunningExecution,
    ReadyPause,
    Pause,
    ReadyStop,
    Stop,
    Failure,
    Success,
    NeedFaultTolerance,
    Kill,
    WaitingThread,
    WaitingDepend,
    DelayExecution,
    ForcedSuccess,
    SerialWait,
}

impl ExecutionStatus {
    /// Every status, in declaration order.
    pub const ALL: [ExecutionStatus; 15] = [
        Self::SubmittedSuccess,
        Self::RunningExecution,
        Self::ReadyPause,
        Self::Pause,
        Self::ReadyStop,
        Self::Stop,
        Self::Failure,
        Self::Success,
        Self::NeedFaultTolerance,
        Self::Kill,
        Self::WaitingThread,
        Self::WaitingDepend,
        Self::DelayExecution,
        Self::ForcedSuccess,
        Self::SerialWait,
    ];

    /// Status name as stored and displayed.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmittedSuccess => "SUBMITTED_SUCCESS",
            Self::RunningExecution => "RUNNING_EXECUTION",
            Self::ReadyPause => "READY_PAUSE",
            Self::Pause => "PAUSE",
            Self::ReadyStop => "READY_STOP",
            Self::Stop => "STOP",
            Self::Failure => "FAILURE",
            Self::Success => "SUCCESS",
            Self::NeedFaultTolerance => "NEED_FAULT_TOLERANCE",
            Self::Kill => "KILL",
            Self::WaitingThread => "WAITING_THREAD",
            Self::WaitingDepend => "WAITING_DEPEND",
            Self::DelayExecution => "DELAY_EXECUTION",
            Self::ForcedSuccess => "FORCED_SUCCESS",
            Self::SerialWait => "SERIAL_WAIT",
        }
    }

    /// The instance is still executing (including pending pause/stop).
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Self::SubmittedSuccess
                | Self::RunningExecution
                | Self::ReadyPause
                | Self::ReadyStop
                | Self::WaitingThread
                | Self::WaitingDepend
                | Self::DelayExecution
                | Self::SerialWait
        )
    }

    /// The instance reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::ForcedSuccess | Self::Failure | Self::Pause | Self::Stop | Self::Kill
        )
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure | Self::NeedFaultTolerance)
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Pause)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Stop | Self::Kill)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control operation requested against an existing instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecuteType {
    Pause,
    Stop,
    RepeatRunning,
    RecoverSuspendedProcess,
    StartFailureTaskProcess,
}

impl ExecuteType {
    /// All control operations, in declaration order.
    pub const ALL: [ExecuteType; 5] = [
        Self::Pause,
        Self::Stop,
        Self::RepeatRunning,
        Self::RecoverSuspendedProcess,
        Self::StartFailureTaskProcess,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "PAUSE",
            Self::Stop => "STOP",
            Self::RepeatRunning => "REPEAT_RUNNING",
            Self::RecoverSuspendedProcess => "RECOVER_SUSPENDED_PROCESS",
            Self::StartFailureTaskProcess => "START_FAILURE_TASK_PROCESS",
        }
    }

    /// PAUSE and STOP act on the instance directly; the rest enqueue a command.
    #[must_use]
    pub fn mutates_instance(&self) -> bool {
        matches!(self, Self::Pause | Self::Stop)
    }
}

impl fmt::Display for ExecuteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInstance {
    /// Instance identifier.
    pub id: i64,
    /// Code of the workflow definition this instance runs.
    pub workflow_definition_code: i64,
    /// Definition version the instance was started from.
    pub workflow_definition_version: i32,
    /// Current status.
    pub state: ExecutionStatus,
    /// Last command type applied to the instance.
    pub command_type: CommandType,
    /// Most recent command types, oldest first.
    pub command_history: Vec<CommandType>,
    /// Instance name.
    pub name: String,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ProcessInstance {
    /// Create an instance in the given state, started by `START_PROCESS`.
    #[must_use]
    pub fn new(id: i64, workflow_definition_code: i64, state: ExecutionStatus) -> Self {
        Self {
            id,
            workflow_definition_code,
            workflow_definition_version: 1,
            state,
            command_type: CommandType::StartProcess,
            command_history: vec![CommandType::StartProcess],
            name: format!("instance-{id}"),
            updated_at: Utc::now(),
        }
    }

    /// Record a command type, keeping at most `limit` entries.
    pub fn push_history(&mut self, command_type: CommandType, limit: usize) {
        self.command_history.push(command_type);
        if self.command_history.len() > limit {
            let overflow = self.command_history.len() - limit;
            self.command_history.drain(..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_states_count_as_running() {
        assert!(ExecutionStatus::ReadyPause.is_running());
        assert!(ExecutionStatus::ReadyStop.is_running());
        assert!(!ExecutionStatus::Pause.is_running());
    }

    #[test]
    fn test_terminal_families() {
        assert!(ExecutionStatus::Stop.is_finished());
        assert!(ExecutionStatus::Stop.is_cancelled());
        assert!(ExecutionStatus::Kill.is_cancelled());
        assert!(ExecutionStatus::NeedFaultTolerance.is_failure());
        assert!(!ExecutionStatus::NeedFaultTolerance.is_finished());
        assert!(ExecutionStatus::Pause.is_paused());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut instance = ProcessInstance::new(1, 10, ExecutionStatus::RunningExecution);
        for _ in 0..5 {
            instance.push_history(CommandType::Pause, 3);
        }
        assert_eq!(instance.command_history.len(), 3);
        assert!(instance
            .command_history
            .iter()
            .all(|c| *c == CommandType::Pause));
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        let json = serde_json::to_string(&ExecutionStatus::ReadyPause).unwrap();
        assert_eq!(json, "\"READY_PAUSE\"");
    }
}
