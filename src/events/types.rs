use crate::scheduler::ProjectId;
use crate::task::{TaskFailure, TaskId};
use chrono::{DateTime, Utc};

/// Everything the scheduler and its tasks report to observers.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// The driving loop was launched.
    SchedulerStarted {
        scheduler: String,
        at: DateTime<Utc>,
    },
    /// One tick finished dispatching its batch.
    UpdateComplete {
        tick: u64,
        dispatched: usize,
        at: DateTime<Utc>,
    },
    /// The driving loop was joined. Observers should flush.
    SchedulerStopped {
        scheduler: String,
        at: DateTime<Utc>,
    },
    /// A lifecycle transition of a single task run.
    Task(TaskEvent),
    /// The active-task bookkeeping changed.
    ActiveTasksChanged {
        project: String,
        task: String,
        change: ActiveChange,
        active: usize,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveChange {
    Added,
    Removed,
}

/// Lifecycle transition of a task run, with the context it ran in.
#[derive(Debug, Clone)]
pub struct TaskEvent {
    pub transition: TaskTransition,
    pub task_id: TaskId,
    pub task_name: String,
    pub project_id: ProjectId,
    pub project_name: String,
    /// Set when the task runs as a child of a task group.
    pub parent: Option<TaskId>,
    pub scheduler: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskTransition {
    Started,
    Completed,
    Failed(TaskFailure),
}

impl TaskTransition {
    pub fn label(&self) -> &'static str {
        match self {
            TaskTransition::Started => "started",
            TaskTransition::Completed => "completed",
            TaskTransition::Failed(_) => "failed",
        }
    }

    /// Whether this transition ends a run.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskTransition::Started)
    }
}

impl TaskEvent {
    pub fn is_started(&self) -> bool {
        matches!(self.transition, TaskTransition::Started)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.transition, TaskTransition::Completed)
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        match &self.transition {
            TaskTransition::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}
