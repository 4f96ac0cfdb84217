//! Lifecycle events and their consumers.
//!
//! The scheduler and every running task publish [`SchedulerEvent`]s on an
//! [`EventBus`]. [`EventLogger`] turns them into [`LogRecord`]s for a
//! [`LogSink`].

pub mod bus;
pub mod log;
pub mod types;

pub use bus::EventBus;
pub use log::{EventLogger, LogRecord, LogSink, MemorySink, Severity, TracingSink, to_record};
pub use types::{ActiveChange, SchedulerEvent, TaskEvent, TaskTransition};
