//! Workflow definitions, as far as triggering needs them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Activation flag shared by workflow definitions and schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseState {
    #[default]
    Offline,
    Online,
}

impl ReleaseState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "OFFLINE",
            Self::Online => "ONLINE",
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A released (or draft) workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Stable definition code.
    pub code: i64,
    pub name: String,
    pub version: i32,
    pub release_state: ReleaseState,
    /// Owner.
    pub user_id: i64,
    /// Tenant the instances run as; resolved by the repository.
    pub tenant_code: Option<String>,
    /// Alert group notified for instances of this definition.
    pub warning_group_id: Option<i64>,
    /// Definitions invoked as sub-workflows.
    pub sub_workflow_codes: Vec<i64>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Create an offline definition owned by `user_id`.
    #[must_use]
    pub fn new(code: i64, name: impl Into<String>, user_id: i64) -> Self {
        Self {
            code,
            name: name.into(),
            version: 1,
            release_state: ReleaseState::Offline,
            user_id,
            tenant_code: None,
            warning_group_id: None,
            sub_workflow_codes: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Mark the definition as released.
    #[must_use]
    pub fn released(mut self) -> Self {
        self.release_state = ReleaseState::Online;
        self
    }

    /// Set the tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_code: impl Into<String>) -> Self {
        self.tenant_code = Some(tenant_code.into());
        self
    }

    /// Add a sub-workflow reference.
    #[must_use]
    pub fn with_sub_workflow(mut self, code: i64) -> Self {
        self.sub_workflow_codes.push(code);
        self
    }
}
