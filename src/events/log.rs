//! # Event logging
//!
//! [`EventLogger`] listens on the event bus and turns lifecycle events into
//! [`LogRecord`]s written to a [`LogSink`]. Records render as
//!
//! ```text
//! (10/18/2026 09:15:02 PM) [ERROR       ]: Task 'sync' failed in project 'main'
//! 	origin: sync
//! 	message: connection refused
//! 		caused by: os error 111
//! ```
//!
//! `SchedulerStopped` is the signal to flush everything buffered.

use super::types::{ActiveChange, SchedulerEvent, TaskTransition};
use crate::sync::lock;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
    /// Scheduler bookkeeping: lifecycle and active-task changes.
    Scheduler,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Scheduler => "SCHEDULER",
        }
    }
}

/// A formatted log entry with optional indented sub-lines.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub severity: Severity,
    pub message: String,
    /// `(indent level, text)`, level 0 being one step below the message.
    pub sub_lines: Vec<(usize, String)>,
    pub at: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            sub_lines: Vec::new(),
            at: Utc::now(),
        }
    }

    pub fn with_sub_line(mut self, level: usize, text: impl Into<String>) -> Self {
        self.sub_lines.push((level, text.into()));
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}) [{:<12}]: {}",
            self.at.format("%m/%d/%Y %I:%M:%S %p"),
            self.severity.label(),
            self.message
        )?;
        for (level, text) in &self.sub_lines {
            write!(f, "\n\t{}{}", "\t".repeat(*level), text)?;
        }
        Ok(())
    }
}

/// Destination for log records.
pub trait LogSink: Send + Sync {
    fn write(&self, record: &LogRecord);

    /// Push out anything buffered.
    fn flush(&self) {}
}

/// Forwards records to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, record: &LogRecord) {
        match record.severity {
            Severity::Info => info!(target: "taskserver::events", "{record}"),
            Severity::Warning => warn!(target: "taskserver::events", "{record}"),
            Severity::Error => error!(target: "taskserver::events", "{record}"),
            Severity::Scheduler => debug!(target: "taskserver::events", "{record}"),
        }
    }
}

/// Keeps records in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
    flushes: Arc<AtomicUsize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        lock(&self.records).clone()
    }

    /// Rendered records, in arrival order.
    pub fn lines(&self) -> Vec<String> {
        lock(&self.records).iter().map(ToString::to_string).collect()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl LogSink for MemorySink {
    fn write(&self, record: &LogRecord) {
        lock(&self.records).push(record.clone());
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Record for `event`, or `None` for events that are not logged.
pub fn to_record(event: &SchedulerEvent) -> Option<LogRecord> {
    let record = match event {
        SchedulerEvent::SchedulerStarted { scheduler, at } => {
            LogRecord::new(Severity::Scheduler, format!("Scheduler '{scheduler}' started"))
                .at(*at)
        }
        SchedulerEvent::SchedulerStopped { scheduler, at } => {
            LogRecord::new(Severity::Scheduler, format!("Scheduler '{scheduler}' stopped"))
                .at(*at)
        }
        SchedulerEvent::UpdateComplete { .. } => return None,
        SchedulerEvent::ActiveTasksChanged {
            project,
            task,
            change,
            active,
            at,
        } => {
            let verb = match change {
                ActiveChange::Added => "added to",
                ActiveChange::Removed => "removed from",
            };
            LogRecord::new(
                Severity::Scheduler,
                format!("Task '{task}' was {verb} the active tasks of project '{project}'"),
            )
            .with_sub_line(0, format!("Active task count: {active}"))
            .at(*at)
        }
        SchedulerEvent::Task(event) => {
            let subject = format!(
                "Task '{}' {} in project '{}'",
                event.task_name,
                event.transition.label(),
                event.project_name
            );
            match &event.transition {
                TaskTransition::Started | TaskTransition::Completed => {
                    LogRecord::new(Severity::Info, subject).at(event.at)
                }
                TaskTransition::Failed(failure) => {
                    let mut record = LogRecord::new(Severity::Error, subject)
                        .with_sub_line(0, format!("origin: {}", failure.origin))
                        .with_sub_line(0, format!("message: {}", failure.message))
                        .at(event.at);
                    for line in &failure.trace {
                        record = record.with_sub_line(1, line.clone());
                    }
                    record
                }
            }
        }
    };
    Some(record)
}

/// Writes bus events to a sink.
pub struct EventLogger<S> {
    sink: S,
}

impl<S: LogSink + 'static> EventLogger<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn handle(&self, event: &SchedulerEvent) {
        if let Some(record) = to_record(event) {
            self.sink.write(&record);
        }
        if matches!(event, SchedulerEvent::SchedulerStopped { .. }) {
            self.sink.flush();
        }
    }

    /// Consume events from `rx` on a background task until the bus closes.
    pub fn spawn(self, mut rx: broadcast::Receiver<SchedulerEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => self.handle(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        let record = LogRecord::new(
                            Severity::Warning,
                            format!("Event logger fell behind; {skipped} events skipped"),
                        );
                        self.sink.write(&record);
                    }
                    Err(RecvError::Closed) => {
                        self.sink.flush();
                        break;
                    }
                }
            }
        })
    }
}
