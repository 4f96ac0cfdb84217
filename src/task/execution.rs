use crate::error::SchedulerError;
use crate::events::{EventBus, SchedulerEvent, TaskEvent};
use crate::scheduler::{ActiveTasks, Project, ProjectId};
use crate::task::types::{Task, TaskFailure, TaskId, TaskOutcome};
use anyhow::Result;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// Context a task runs in: the scheduler and project it was dispatched
/// from, and the channel its lifecycle transitions are reported on.
#[derive(Clone)]
pub struct RunContext {
    scheduler: Arc<str>,
    project_id: ProjectId,
    project_name: Arc<str>,
    project: Weak<Project>,
    bus: EventBus,
    tracker: Option<Arc<ActiveTasks>>,
    parent: Option<TaskId>,
    task: Option<(TaskId, Arc<str>)>,
}

impl RunContext {
    pub fn new(
        scheduler: &str,
        project: &Arc<Project>,
        bus: EventBus,
        tracker: Option<Arc<ActiveTasks>>,
    ) -> Self {
        Self {
            scheduler: Arc::from(scheduler),
            project_id: project.id(),
            project_name: Arc::from(project.name()),
            project: Arc::downgrade(project),
            bus,
            tracker,
            parent: None,
            task: None,
        }
    }

    /// Context for the logic of task `id`.
    pub(crate) fn scoped(&self, id: TaskId, name: &str) -> Self {
        Self {
            task: Some((id, Arc::from(name))),
            ..self.clone()
        }
    }

    /// Context for tasks run as children of the current task.
    pub fn for_children(&self) -> Self {
        Self {
            parent: self.task.as_ref().map(|(id, _)| *id),
            task: None,
            ..self.clone()
        }
    }

    pub fn scheduler(&self) -> &str {
        &self.scheduler
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// The project the task was dispatched from, while it is still alive.
    pub fn project(&self) -> Option<Arc<Project>> {
        self.project.upgrade()
    }

    pub fn parent(&self) -> Option<TaskId> {
        self.parent
    }

    /// Name of the task whose logic is running, if any.
    pub fn task_name(&self) -> Option<&str> {
        self.task.as_ref().map(|(_, name)| name.as_ref())
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Apply the active-task bookkeeping for `event`, then publish it.
    pub(crate) fn emit(&self, event: TaskEvent) {
        let change = self.tracker.as_ref().and_then(|tracker| tracker.apply(&event));
        self.bus.publish(SchedulerEvent::Task(event));
        if let Some(change) = change {
            self.bus.publish(change);
        }
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("scheduler", &self.scheduler)
            .field("project", &self.project_name)
            .field("parent", &self.parent)
            .field("task", &self.task_name())
            .finish()
    }
}

/// Task-specific work executed by [`Task::run`].
#[async_trait::async_trait]
pub trait TaskLogic: Send + Sync {
    async fn execute(&self, ctx: &RunContext) -> Result<()>;
}

type SyncBody = Box<dyn Fn() -> Result<()> + Send + Sync>;
type AsyncBody = Box<dyn Fn(RunContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Task logic wrapping a closure captured at construction.
pub struct FunctionTask {
    body: FunctionBody,
}

enum FunctionBody {
    Sync(SyncBody),
    Async(AsyncBody),
}

impl FunctionTask {
    /// Wrap a synchronous closure. It runs inline on the execution unit.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        Self {
            body: FunctionBody::Sync(Box::new(f)),
        }
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            body: FunctionBody::Async(Box::new(move |ctx| Box::pin(f(ctx)))),
        }
    }
}

#[async_trait::async_trait]
impl TaskLogic for FunctionTask {
    async fn execute(&self, ctx: &RunContext) -> Result<()> {
        match &self.body {
            FunctionBody::Sync(f) => f(),
            FunctionBody::Async(f) => f(ctx.clone()).await,
        }
    }
}

/// Progress of one execution handle.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleState {
    Pending,
    Running,
    Settled(TaskOutcome),
}

impl HandleState {
    pub fn outcome(&self) -> Option<&TaskOutcome> {
        match self {
            HandleState::Settled(outcome) => Some(outcome),
            _ => None,
        }
    }
}

/// One generation of a task's execution: a single run on its own tokio task.
#[derive(Clone)]
pub struct ExecutionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: Uuid,
    generation: u64,
    task: Weak<Task>,
    task_name: String,
    ctx: RunContext,
    state: watch::Sender<HandleState>,
}

impl ExecutionHandle {
    pub(crate) fn new(task: &Arc<Task>, generation: u64, ctx: RunContext) -> Self {
        let (state, _rx) = watch::channel(HandleState::Pending);
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                generation,
                task: Arc::downgrade(task),
                task_name: task.name().to_string(),
                ctx,
                state,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// 1 for the first handle of a task, incremented per resubmission.
    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    pub fn state(&self) -> HandleState {
        self.inner.state.borrow().clone()
    }

    pub fn is_launched(&self) -> bool {
        !matches!(*self.inner.state.borrow(), HandleState::Pending)
    }

    pub fn is_settled(&self) -> bool {
        self.inner.state.borrow().outcome().is_some()
    }

    /// Start the run on its own tokio task. A handle launches at most once.
    pub fn launch(&self) -> Result<(), SchedulerError> {
        let launched = self.inner.state.send_if_modified(|state| {
            if matches!(state, HandleState::Pending) {
                *state = HandleState::Running;
                true
            } else {
                false
            }
        });
        if !launched {
            return Err(SchedulerError::HandleAlreadyLaunched {
                task: self.inner.task_name.clone(),
            });
        }

        let Some(task) = self.inner.task.upgrade() else {
            self.inner.state.send_replace(HandleState::Settled(TaskOutcome::Failed(
                TaskFailure::new("task released before launch", self.inner.task_name.clone()),
            )));
            return Err(SchedulerError::TaskReleased {
                task: self.inner.task_name.clone(),
            });
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = task.run(&inner.ctx).await;
            debug!(
                "Execution handle {} for task {} settled",
                inner.id, inner.task_name
            );
            inner.state.send_replace(HandleState::Settled(outcome));
        });

        Ok(())
    }

    /// Wait until the run has settled. Never resolves for a handle that is
    /// never launched.
    pub async fn settled(&self) -> TaskOutcome {
        let mut rx = self.inner.state.subscribe();
        let outcome = match rx.wait_for(|state| state.outcome().is_some()).await {
            Ok(state) => state.outcome().cloned(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| {
            TaskOutcome::Failed(TaskFailure::new(
                "execution handle closed before settling",
                self.inner.task_name.clone(),
            ))
        })
    }
}

impl fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("id", &self.inner.id)
            .field("generation", &self.inner.generation)
            .field("task", &self.inner.task_name)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl PartialEq for ExecutionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ExecutionHandle {}
