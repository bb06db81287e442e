//! Core domain models.
//!
//! This module contains the entities the control plane reads and writes:
//! commands, workflow instances and workflow definitions.

pub mod command;
pub mod definition;
pub mod instance;

pub use command::*;
pub use definition::*;
pub use instance::*;

use serde::{Deserialize, Serialize};

/// The authenticated user a request is made on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    /// User identifier.
    pub id: i64,
    /// Administrators may act on resources they do not own.
    pub is_admin: bool,
}

impl Operator {
    /// A regular user.
    #[must_use]
    pub fn user(id: i64) -> Self {
        Self { id, is_admin: false }
    }

    /// An administrator.
    #[must_use]
    pub fn admin(id: i64) -> Self {
        Self { id, is_admin: true }
    }

    /// Whether this operator may manage a resource owned by `owner_id`.
    #[must_use]
    pub fn owns_or_admin(&self, owner_id: i64) -> bool {
        self.is_admin || self.id == owner_id
    }
}
