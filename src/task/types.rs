use crate::events::{TaskEvent, TaskTransition};
use crate::sync::lock;
use crate::task::condition::ActivationCondition;
use crate::task::execution::{ExecutionHandle, FunctionTask, RunContext, TaskLogic};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::backtrace::BacktraceStatus;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier for tasks
pub type TaskId = Uuid;

/// A named unit of work governed by an activation condition.
///
/// Tasks are shared as `Arc<Task>`: the project queue, the execution handle
/// and the scheduler all refer to the same object, which is what lets a
/// recurring task be dispatched many times under one identity.
pub struct Task {
    id: TaskId,
    name: String,
    condition: Mutex<ActivationCondition>,
    logic: Box<dyn TaskLogic>,
    handle: Mutex<Option<ExecutionHandle>>,
}

/// How a single run of a task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed,
    Failed(TaskFailure),
}

/// Failure captured at the task boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    pub message: String,
    /// Where the failure was raised (task name, or `panic` for panics).
    pub origin: String,
    /// Cause chain and backtrace lines, outermost first.
    pub trace: Vec<String>,
}

impl Task {
    /// Create a task around arbitrary logic.
    pub fn new(
        name: impl Into<String>,
        condition: ActivationCondition,
        logic: impl TaskLogic + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            condition: Mutex::new(condition),
            logic: Box::new(logic),
            handle: Mutex::new(None),
        })
    }

    /// Create a task from a synchronous closure.
    pub fn from_fn<F>(name: impl Into<String>, condition: ActivationCondition, f: F) -> Arc<Self>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(name, condition, FunctionTask::from_fn(f))
    }

    /// Create a task from an async closure receiving the run context.
    pub fn from_async<F, Fut>(
        name: impl Into<String>,
        condition: ActivationCondition,
        f: F,
    ) -> Arc<Self>
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(name, condition, FunctionTask::from_async(f))
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the activation condition.
    pub fn condition(&self) -> ActivationCondition {
        lock(&self.condition).clone()
    }

    pub fn is_ready(&self) -> bool {
        lock(&self.condition).is_ready()
    }

    pub fn is_ready_at(&self, now: DateTime<Utc>) -> bool {
        lock(&self.condition).is_ready_at(now)
    }

    pub fn scheduled_time(&self) -> DateTime<Utc> {
        lock(&self.condition).scheduled_time()
    }

    pub fn add_back_to_project(&self) -> bool {
        lock(&self.condition).add_back_to_project()
    }

    pub fn awaited(&self) -> bool {
        lock(&self.condition).awaited()
    }

    pub fn has_run_before(&self) -> bool {
        lock(&self.condition).has_run_before()
    }

    /// Moves the condition to its next generation.
    ///
    /// Called by the scheduler once per dispatched run, after the run settles.
    pub fn advance(&self) {
        lock(&self.condition).advance();
    }

    /// The handle of the current generation, if one was created.
    pub fn execution_handle(&self) -> Option<ExecutionHandle> {
        lock(&self.handle).clone()
    }

    /// Returns the handle of the current generation, creating one when there
    /// is none yet, or when the condition asks for resubmission and the
    /// previous handle has settled.
    pub fn get_or_create_execution_handle(self: &Arc<Self>, ctx: &RunContext) -> ExecutionHandle {
        let resubmit = self.add_back_to_project();
        let mut slot = lock(&self.handle);

        let generation = match slot.as_ref() {
            Some(handle) if !(resubmit && handle.is_settled()) => return handle.clone(),
            Some(handle) => handle.generation() + 1,
            None => 1,
        };

        let handle = ExecutionHandle::new(self, generation, ctx.clone());
        debug!(
            "Created execution handle {} (generation {}) for task {}",
            handle.id(),
            generation,
            self.name
        );
        *slot = Some(handle.clone());
        handle
    }

    /// Run the task logic once, reporting the transitions through `ctx`.
    ///
    /// Errors and panics raised by the logic are captured into the returned
    /// outcome and the `Failed` event; they never propagate further.
    pub async fn run(&self, ctx: &RunContext) -> TaskOutcome {
        let scoped = ctx.scoped(self.id, &self.name);

        scoped.emit(self.event(&scoped, TaskTransition::Started));
        lock(&self.condition).mark_run();

        let result = AssertUnwindSafe(self.logic.execute(&scoped))
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(Ok(())) => TaskOutcome::Completed,
            Ok(Err(error)) => TaskOutcome::Failed(TaskFailure::from_error(&self.name, &error)),
            Err(payload) => TaskOutcome::Failed(TaskFailure::from_panic(payload)),
        };

        let transition = match &outcome {
            TaskOutcome::Completed => TaskTransition::Completed,
            TaskOutcome::Failed(failure) => {
                warn!("Task {} failed: {}", self.name, failure.message);
                TaskTransition::Failed(failure.clone())
            }
        };
        scoped.emit(self.event(&scoped, transition));

        outcome
    }

    fn event(&self, ctx: &RunContext, transition: TaskTransition) -> TaskEvent {
        TaskEvent {
            transition,
            task_id: self.id,
            task_name: self.name.clone(),
            project_id: ctx.project_id(),
            project_name: ctx.project_name().to_string(),
            parent: ctx.parent(),
            scheduler: ctx.scheduler().to_string(),
            at: Utc::now(),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("condition", &*lock(&self.condition))
            .finish_non_exhaustive()
    }
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed)
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            TaskOutcome::Failed(failure) => Some(failure),
            TaskOutcome::Completed => None,
        }
    }
}

impl TaskFailure {
    pub fn new(message: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: origin.into(),
            trace: Vec::new(),
        }
    }

    /// Capture an error returned by task logic.
    pub fn from_error(origin: &str, error: &anyhow::Error) -> Self {
        let mut trace: Vec<String> = error
            .chain()
            .skip(1)
            .map(|cause| format!("caused by: {cause}"))
            .collect();

        let backtrace = error.backtrace();
        if backtrace.status() == BacktraceStatus::Captured {
            trace.extend(backtrace.to_string().lines().map(str::to_owned));
        }

        Self {
            message: error.to_string(),
            origin: origin.to_string(),
            trace,
        }
    }

    /// Capture a panic raised by task logic.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "task panicked with a non-string payload".to_string()
        };

        Self::new(message, "panic")
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (in {})", self.message, self.origin)
    }
}
