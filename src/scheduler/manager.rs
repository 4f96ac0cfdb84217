use crate::error::{Result, SchedulerError};
use crate::events::{EventBus, SchedulerEvent};
use crate::scheduler::active::{ActiveTask, ActiveTasks};
use crate::scheduler::config::SchedulerConfig;
use crate::scheduler::project::{Project, ProjectId};
use crate::sync::lock;
use crate::task::{RunContext, Task};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Lifecycle of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Drives registered projects: once per tick it pops every ready task and
/// launches each one on its own execution unit.
///
/// A `Scheduler` is an owned value with no global accessor; share it by
/// reference (or inside an `Arc`) with whatever composes the process.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    running: AtomicBool,
    state: Mutex<SchedulerState>,
    projects: Mutex<Vec<Arc<Project>>>,
    active: Arc<ActiveTasks>,
    bus: EventBus,
    ticks: AtomicU64,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let bus = EventBus::new(config.event_capacity);

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                config,
                running: AtomicBool::new(false),
                state: Mutex::new(SchedulerState::Idle),
                projects: Mutex::new(Vec::new()),
                active: Arc::new(ActiveTasks::new()),
                bus,
                ticks: AtomicU64::new(0),
            }),
            driver: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn state(&self) -> SchedulerState {
        *lock(&self.inner.state)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> EventBus {
        self.inner.bus.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.bus.subscribe()
    }

    /// Register a project. Returns `false` if it was already registered.
    pub fn add_project(&self, project: Arc<Project>) -> bool {
        let mut projects = lock(&self.inner.projects);
        if projects.iter().any(|p| p.id() == project.id()) {
            return false;
        }
        info!("Registered project {}", project.name());
        projects.push(project);
        true
    }

    pub fn remove_project(&self, id: ProjectId) -> Option<Arc<Project>> {
        let mut projects = lock(&self.inner.projects);
        let index = projects.iter().position(|p| p.id() == id)?;
        let project = projects.remove(index);
        info!("Removed project {}", project.name());
        Some(project)
    }

    pub fn projects(&self) -> Vec<Arc<Project>> {
        lock(&self.inner.projects).clone()
    }

    /// Launch the driving loop on the current tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SchedulerError::AlreadyRunning);
        }

        let inner = Arc::clone(&self.inner);
        *lock(&self.driver) = Some(runtime.spawn(inner.drive()));
        *lock(&self.inner.state) = SchedulerState::Running;

        info!(
            "Scheduler {} started at {} updates per second",
            self.name(),
            self.inner.config.updates_per_second
        );
        self.inner.bus.publish(SchedulerEvent::SchedulerStarted {
            scheduler: self.name().to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Stop the driving loop and wait for it to exit.
    ///
    /// Tasks already dispatched keep running to completion.
    pub async fn stop(&self) -> Result<()> {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        let driver = lock(&self.driver).take();
        if let Some(driver) = driver {
            if let Err(join_error) = driver.await {
                warn!("Scheduler driver exited abnormally: {}", join_error);
            }
        }
        *lock(&self.inner.state) = SchedulerState::Stopped;

        info!("Scheduler {} stopped", self.name());
        self.inner.bus.publish(SchedulerEvent::SchedulerStopped {
            scheduler: self.name().to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Run a single tick on the caller's task. Returns the number of tasks dispatched.
    pub async fn tick(&self) -> usize {
        self.inner.tick().await
    }

    pub fn ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::SeqCst)
    }

    pub fn active_task_count(&self) -> usize {
        self.inner.active.count()
    }

    pub fn active_task_count_for(&self, project: ProjectId) -> usize {
        self.inner.active.count_for(project)
    }

    pub fn active_tasks(&self) -> Vec<ActiveTask> {
        self.inner.active.snapshot()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }
}

impl SchedulerInner {
    async fn drive(self: Arc<Self>) {
        let mut ticker = interval(self.config.tick_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.tick().await;
        }

        debug!("Scheduler {} driver exited", self.config.name);
    }

    async fn tick(self: &Arc<Self>) -> usize {
        let now = Utc::now();
        let projects = lock(&self.projects).clone();

        let mut batch = Vec::new();
        for project in &projects {
            while let Some(task) = project.pop_ready_at(now) {
                batch.push((Arc::clone(project), task));
            }
        }

        let dispatched = batch.len();
        for (project, task) in batch {
            self.dispatch(project, task).await;
        }

        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        self.bus.publish(SchedulerEvent::UpdateComplete {
            tick,
            dispatched,
            at: Utc::now(),
        });
        dispatched
    }

    async fn dispatch(self: &Arc<Self>, project: Arc<Project>, task: Arc<Task>) {
        let ctx = RunContext::new(
            &self.config.name,
            &project,
            self.bus.clone(),
            Some(Arc::clone(&self.active)),
        );
        let handle = task.get_or_create_execution_handle(&ctx);

        if let Err(error) = handle.launch() {
            warn!("Skipping dispatch of task {}: {}", task.name(), error);
            return;
        }
        debug!(
            "Dispatched task {} from project {} (generation {})",
            task.name(),
            project.name(),
            handle.generation()
        );

        if task.awaited() {
            handle.settled().await;
            Self::resubmit(&project, &task);
        } else {
            tokio::spawn(async move {
                handle.settled().await;
                Self::resubmit(&project, &task);
            });
        }
    }

    /// Advance the task's condition and hand it back to its project if the
    /// condition asks for another generation.
    fn resubmit(project: &Project, task: &Arc<Task>) {
        task.advance();
        if task.add_back_to_project() {
            debug!(
                "Re-enqueueing task {} into project {}",
                task.name(),
                project.name()
            );
            project.enqueue(Arc::clone(task));
        }
    }
}
