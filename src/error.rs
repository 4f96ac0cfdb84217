//! Error types for scheduler misuse.
//!
//! Failures raised by task logic never show up here: they are captured at the
//! task boundary and reported as [`crate::task::TaskFailure`] payloads on the
//! event bus.

/// Errors returned by the scheduler and execution handles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// `start()` was called while the driving loop is already running.
    #[error("Scheduler is already running")]
    AlreadyRunning,

    /// `stop()` was called on a scheduler that is not running.
    #[error("Scheduler is not running")]
    NotRunning,

    /// The scheduler was started outside of a tokio runtime.
    #[error("No tokio runtime available to drive the scheduler")]
    NoRuntime,

    /// Configuration values that cannot drive a scheduler.
    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    /// The execution handle for this generation was already started.
    #[error("Execution handle for task '{task}' was already launched")]
    HandleAlreadyLaunched { task: String },

    /// The task behind an execution handle has been dropped.
    #[error("Task '{task}' was released before its execution handle launched")]
    TaskReleased { task: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
