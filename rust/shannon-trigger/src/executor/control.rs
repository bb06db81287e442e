//! Run control: pause, stop, rerun, resume and failed-task restart.
//!
//! | Operation | Legal when the instance is | Effect |
//! |-----------|----------------------------|--------|
//! | PAUSE | running | instance marked READY_PAUSE |
//! | STOP | running | instance marked READY_STOP |
//! | REPEAT_RUNNING | finished | REPEAT_RUNNING command queued |
//! | RECOVER_SUSPENDED_PROCESS | paused or cancelled | RECOVER_SUSPENDED_PROCESS command queued |
//! | START_FAILURE_TASK_PROCESS | failed | START_FAILURE_TASK_PROCESS command queued |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use super::command::insert_command;
use super::waiting::{WaitingTask, WaitingTaskCache};
use crate::config::ControlConfig;
use crate::database::{CommandRepository, ProcessInstanceRepository, WorkflowDefinitionRepository};
use crate::domain::{
    CMD_PARAM_RECOVER_PROCESS_ID, CMD_PARAM_START_PARAMS, Command, CommandType, ExecuteType,
    ExecutionStatus, Operator, ProcessInstance, WorkflowDefinition,
};
use crate::error::{ControlError, ControlResult};
use crate::logging::OpTimer;
use crate::runtime::{ExecutionEngineDiscovery, PermissionChecker, ResourceType};
use crate::scheduler::lifecycle::ensure_released;

/// What a legal control operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Write the pending state onto the instance; the engine picks it up.
    Mark {
        target: ExecutionStatus,
        command_type: CommandType,
    },
    /// Queue a recovery command for the instance.
    Enqueue(CommandType),
}

/// Decide whether `operation` is legal against an instance in `status`.
pub fn transition_for(status: ExecutionStatus, operation: ExecuteType) -> ControlResult<Transition> {
    let (legal, transition) = match operation {
        ExecuteType::Pause => (
            status.is_running(),
            Transition::Mark {
                target: ExecutionStatus::ReadyPause,
                command_type: CommandType::Pause,
            },
        ),
        ExecuteType::Stop => (
            status.is_running(),
            Transition::Mark {
                target: ExecutionStatus::ReadyStop,
                command_type: CommandType::Stop,
            },
        ),
        ExecuteType::RepeatRunning => (
            status.is_finished(),
            Transition::Enqueue(CommandType::RepeatRunning),
        ),
        ExecuteType::RecoverSuspendedProcess => (
            status.is_paused() || status.is_cancelled(),
            Transition::Enqueue(CommandType::RecoverSuspendedProcess),
        ),
        ExecuteType::StartFailureTaskProcess => (
            status.is_failure(),
            Transition::Enqueue(CommandType::StartFailureTaskProcess),
        ),
    };

    if legal {
        Ok(transition)
    } else {
        Err(ControlError::IllegalStateTransition { status, operation })
    }
}

/// Applies control operations to workflow instances.
#[derive(Clone)]
pub struct ExecutionStateMachine {
    instances: Arc<dyn ProcessInstanceRepository>,
    definitions: Arc<dyn WorkflowDefinitionRepository>,
    commands: Arc<dyn CommandRepository>,
    permissions: Arc<dyn PermissionChecker>,
    discovery: Arc<dyn ExecutionEngineDiscovery>,
    waiting_tasks: Arc<WaitingTaskCache>,
    config: ControlConfig,
}

impl fmt::Debug for ExecutionStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionStateMachine")
            .field("waiting_tasks", &self.waiting_tasks.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExecutionStateMachine {
    #[must_use]
    pub fn new(
        instances: Arc<dyn ProcessInstanceRepository>,
        definitions: Arc<dyn WorkflowDefinitionRepository>,
        commands: Arc<dyn CommandRepository>,
        permissions: Arc<dyn PermissionChecker>,
        discovery: Arc<dyn ExecutionEngineDiscovery>,
        waiting_tasks: Arc<WaitingTaskCache>,
        config: ControlConfig,
    ) -> Self {
        Self {
            instances,
            definitions,
            commands,
            permissions,
            discovery,
            waiting_tasks,
            config,
        }
    }

    /// Apply `operation` to a workflow instance.
    ///
    /// `start_params` is attached to queued recovery commands when non-empty.
    pub async fn execute(
        &self,
        operator: &Operator,
        process_instance_id: i64,
        operation: ExecuteType,
        start_params: Option<&BTreeMap<String, String>>,
    ) -> ControlResult<()> {
        let timer = OpTimer::new("control", operation.as_str());
        let result = self
            .do_execute(operator, process_instance_id, operation, start_params)
            .await;
        timer.finish_with_result(&result);
        result
    }

    async fn do_execute(
        &self,
        operator: &Operator,
        process_instance_id: i64,
        operation: ExecuteType,
        start_params: Option<&BTreeMap<String, String>>,
    ) -> ControlResult<()> {
        self.check_permission(operator, ResourceType::ProcessInstance, operation.as_str())
            .await?;
        if !self.discovery.has_available_node().await {
            return Err(ControlError::NoExecutionEngineAvailable);
        }

        let mut instance = self
            .instances
            .select_by_id(process_instance_id)
            .await?
            .ok_or(ControlError::ProcessInstanceNotFound(process_instance_id))?;
        let definition = self.load_definition(instance.workflow_definition_code).await?;

        if !operation.mutates_instance() {
            ensure_released(self.definitions.as_ref(), &definition).await?;
        }
        if self.definitions.resolve_tenant(definition.code).await?.is_none() {
            return Err(ControlError::NoSuitableTenant(definition.code));
        }

        match transition_for(instance.state, operation)? {
            Transition::Mark {
                target,
                command_type,
            } => self.mark(&mut instance, target, command_type).await,
            Transition::Enqueue(command_type) => {
                self.enqueue(operator, &instance, command_type, start_params)
                    .await
            }
        }
    }

    /// Release a task instance parked waiting for a slot.
    pub async fn force_start_task(
        &self,
        operator: &Operator,
        task_instance_id: i64,
    ) -> ControlResult<WaitingTask> {
        self.check_permission(operator, ResourceType::TaskInstance, "force_start")
            .await?;

        let task = self
            .waiting_tasks
            .remove(task_instance_id)
            .ok_or(ControlError::TaskNotWaiting(task_instance_id))?;

        info!(
            task_instance_id = task_instance_id,
            process_instance_id = task.process_instance_id,
            "Waiting task force started"
        );
        Ok(task)
    }

    async fn mark(
        &self,
        instance: &mut ProcessInstance,
        target: ExecutionStatus,
        command_type: CommandType,
    ) -> ControlResult<()> {
        if instance.state == target {
            return Err(ControlError::AlreadyChanged {
                process_instance_id: instance.id,
                status: target,
            });
        }

        let previous = instance.state;
        instance.state = target;
        instance.command_type = command_type;
        instance.push_history(command_type, self.config.command_history_limit);
        instance.updated_at = chrono::Utc::now();
        if self.instances.update(instance).await? == 0 {
            return Err(ControlError::ProcessInstanceNotFound(instance.id));
        }

        info!(
            process_instance_id = instance.id,
            from = %previous,
            to = %target,
            "Process instance state changed"
        );
        Ok(())
    }

    async fn enqueue(
        &self,
        operator: &Operator,
        instance: &ProcessInstance,
        command_type: CommandType,
        start_params: Option<&BTreeMap<String, String>>,
    ) -> ControlResult<()> {
        let mut command = Command::new(command_type, instance.workflow_definition_code, operator.id);
        command.process_instance_id = Some(instance.id);
        command.priority = self.config.default_priority;
        command.worker_group = self.config.default_worker_group.clone();
        command
            .parameters
            .insert(CMD_PARAM_RECOVER_PROCESS_ID.to_string(), instance.id.to_string());
        if let Some(params) = start_params.filter(|p| !p.is_empty()) {
            command.parameters.insert(
                CMD_PARAM_START_PARAMS.to_string(),
                serde_json::to_string(params)?,
            );
        }

        if self.commands.exists_pending_equivalent(&command).await? {
            return Err(ControlError::DuplicateCommandPending {
                workflow_code: instance.workflow_definition_code,
                command_type: command_type.to_string(),
            });
        }
        insert_command(self.commands.as_ref(), command).await?;

        info!(
            process_instance_id = instance.id,
            command_type = %command_type,
            "Recovery command queued"
        );
        Ok(())
    }

    async fn check_permission(
        &self,
        operator: &Operator,
        resource: ResourceType,
        action: &str,
    ) -> ControlResult<()> {
        if self.permissions.can_operate(operator, resource, action).await {
            Ok(())
        } else {
            Err(ControlError::permission_denied(
                operator.id,
                resource.to_string(),
                action,
            ))
        }
    }

    async fn load_definition(&self, code: i64) -> ControlResult<WorkflowDefinition> {
        self.definitions
            .select_by_code(code)
            .await?
            .ok_or(ControlError::WorkflowDefinitionNotFound(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_requires_running() {
        assert_eq!(
            transition_for(ExecutionStatus::RunningExecution, ExecuteType::Pause).unwrap(),
            Transition::Mark {
                target: ExecutionStatus::ReadyPause,
                command_type: CommandType::Pause,
            }
        );
        let err = transition_for(ExecutionStatus::Success, ExecuteType::Pause).unwrap_err();
        assert!(matches!(
            err,
            ControlError::IllegalStateTransition {
                status: ExecutionStatus::Success,
                operation: ExecuteType::Pause,
            }
        ));
    }

    #[test]
    fn test_recover_suspended_accepts_paused_and_cancelled() {
        for status in [ExecutionStatus::Pause, ExecutionStatus::Stop, ExecutionStatus::Kill] {
            assert_eq!(
                transition_for(status, ExecuteType::RecoverSuspendedProcess).unwrap(),
                Transition::Enqueue(CommandType::RecoverSuspendedProcess)
            );
        }
        assert!(transition_for(ExecutionStatus::Failure, ExecuteType::RecoverSuspendedProcess)
            .is_err());
    }

    #[test]
    fn test_start_failure_task_accepts_fault_tolerance() {
        assert!(
            transition_for(
                ExecutionStatus::NeedFaultTolerance,
                ExecuteType::StartFailureTaskProcess
            )
            .is_ok()
        );
        assert!(transition_for(ExecutionStatus::Success, ExecuteType::StartFailureTaskProcess)
            .is_err());
    }
}
