//! Database abstraction layer.
//!
//! Entity persistence belongs to the host application. This module defines
//! the repository traits the control plane consumes and an in-memory store
//! that implements all of them for tests, the CLI and embedded use.

pub mod repository;

pub use repository::{
    CommandRepository, DuplicateKey, InMemoryStore, ProcessInstanceRepository, ScheduleRepository,
    WorkflowDefinitionRepository,
};
