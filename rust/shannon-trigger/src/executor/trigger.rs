//! "Run now" and backfill entry point.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use super::command::{CommandFactory, CommandRequest};
use crate::database::WorkflowDefinitionRepository;
use crate::domain::{CommandType, Operator};
use crate::error::{ControlError, ControlResult};
use crate::logging::OpTimer;
use crate::runtime::{ExecutionEngineDiscovery, PermissionChecker, ResourceType};
use crate::scheduler::lifecycle::{ensure_released, sync_warning_group};

/// Checks a run request against the workflow and queues its commands.
#[derive(Clone)]
pub struct WorkflowTrigger {
    definitions: Arc<dyn WorkflowDefinitionRepository>,
    permissions: Arc<dyn PermissionChecker>,
    discovery: Arc<dyn ExecutionEngineDiscovery>,
    factory: CommandFactory,
}

impl fmt::Debug for WorkflowTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowTrigger")
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}

impl WorkflowTrigger {
    #[must_use]
    pub fn new(
        definitions: Arc<dyn WorkflowDefinitionRepository>,
        permissions: Arc<dyn PermissionChecker>,
        discovery: Arc<dyn ExecutionEngineDiscovery>,
        factory: CommandFactory,
    ) -> Self {
        Self {
            definitions,
            permissions,
            discovery,
            factory,
        }
    }

    /// Queue a run (or backfill) of a workflow definition on behalf of
    /// `operator`. Returns the number of commands created.
    pub async fn start(&self, operator: &Operator, request: CommandRequest) -> ControlResult<usize> {
        let timer = OpTimer::new("trigger", request.command_type.as_str());
        let result = self.do_start(operator, request).await;
        timer.finish_with_result(&result);
        result
    }

    async fn do_start(&self, operator: &Operator, mut request: CommandRequest) -> ControlResult<usize> {
        let code = request.workflow_definition_code;

        if !self
            .permissions
            .can_operate(operator, ResourceType::WorkflowDefinition, "start")
            .await
        {
            return Err(ControlError::permission_denied(
                operator.id,
                ResourceType::WorkflowDefinition.to_string(),
                "start",
            ));
        }
        if !self.discovery.has_available_node().await {
            return Err(ControlError::NoExecutionEngineAvailable);
        }

        let definition = self
            .definitions
            .select_by_code(code)
            .await?
            .ok_or(ControlError::WorkflowDefinitionNotFound(code))?;
        ensure_released(self.definitions.as_ref(), &definition).await?;
        if self.definitions.resolve_tenant(code).await?.is_none() {
            return Err(ControlError::NoSuitableTenant(code));
        }

        if request.command_type == CommandType::ComplementData {
            if let Some((start, end)) = request.complement_window {
                if start > end {
                    return Err(ControlError::invalid_window(start, end));
                }
            }
        }

        request.executor_id = operator.id;
        let created = self.factory.build(&request).await?;
        if created > 0 {
            sync_warning_group(self.definitions.as_ref(), &definition, request.warning_group_id)
                .await?;
        }

        info!(
            workflow_code = code,
            command_type = %request.command_type,
            commands = created,
            executor_id = operator.id,
            "Workflow run requested"
        );
        Ok(created)
    }
}
