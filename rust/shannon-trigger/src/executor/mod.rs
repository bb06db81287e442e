//! Turning run and control requests into commands.
//!
//! - [`WorkflowTrigger`]: "run now" and backfill requests
//! - [`CommandFactory`]: builds and queues commands
//! - [`BackfillPlanner`]: splits backfill windows
//! - [`ExecutionStateMachine`]: pause, stop and recovery of running instances
//! - [`WaitingTaskCache`]: task instances waiting for a slot

pub mod backfill;
pub mod command;
pub mod control;
pub mod trigger;
pub mod waiting;

pub use backfill::{BackfillPlanner, CronTrigger, PlanEntry};
pub use command::{CommandFactory, CommandRequest};
pub use control::{ExecutionStateMachine, Transition};
pub use trigger::WorkflowTrigger;
pub use waiting::{WaitingTask, WaitingTaskCache};
