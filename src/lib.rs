//! # Task Server
//!
//! An in-process, cooperative task scheduler. Work items ([`Task`]s) are
//! enqueued into per-owner [`Project`] queues, each governed by an
//! [`ActivationCondition`], and a single scheduling loop periodically
//! promotes ready tasks into concurrent execution while tracking which tasks
//! are currently running.
//!
//! ## Architecture Overview
//!
//! - **[`task`]**: tasks, activation conditions, execution handles and task groups
//! - **[`scheduler`]**: projects, the driving loop and active-task bookkeeping
//! - **[`events`]**: lifecycle events, the event bus and the event logger
//! - **[`cli`]**: argument parsing and demo work for the `taskserver` binary
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taskserver::{ActivationCondition, Project, Scheduler, SchedulerConfig, Task};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scheduler = Scheduler::new(SchedulerConfig::default())?;
//!     let project = Project::new("main");
//!     scheduler.add_project(project.clone());
//!
//!     project.enqueue(Task::from_fn("hello", ActivationCondition::simple(), || {
//!         println!("Hello from a task");
//!         Ok(())
//!     }));
//!
//!     scheduler.start()?;
//!     tokio::time::sleep(std::time::Duration::from_millis(100)).await;
//!     scheduler.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod error;

/// Tasks and their readiness policies.
///
/// Provides the task lifecycle, the activation condition variants, execution
/// handles and sequential/concurrent task groups.
pub mod task;

/// The scheduling loop and the project queues it polls.
pub mod scheduler;

/// Lifecycle events, the broadcast bus they travel on and the event logger.
pub mod events;

/// Command line interface for the `taskserver` binary.
pub mod cli;

mod sync;

pub use error::SchedulerError;

// Re-export main task types
pub use task::{
    ActivationCondition, ActivationPolicy, ExecutionHandle, FunctionTask, GroupMode, HandleState,
    RunContext, Task, TaskFailure, TaskGroup, TaskId, TaskLogic, TaskOutcome,
};

// Re-export scheduler types
pub use scheduler::{ActiveTask, Project, ProjectId, Scheduler, SchedulerConfig, SchedulerState};

// Re-export event types
pub use events::{
    EventBus, EventLogger, LogRecord, LogSink, MemorySink, SchedulerEvent, Severity, TaskEvent,
    TaskTransition, TracingSink,
};
