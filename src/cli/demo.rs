//! Demo work scheduled by `taskserver run`.

use crate::scheduler::Project;
use crate::task::{ActivationCondition, GroupMode, RunContext, Task, TaskGroup, TaskLogic};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Logic that sleeps through a fixed number of iterations, logging each one.
#[derive(Debug, Clone)]
pub struct IterationTask {
    iterations: u32,
    pause: Duration,
}

impl IterationTask {
    pub fn new(iterations: u32, pause: Duration) -> Self {
        Self { iterations, pause }
    }

    pub fn into_task(self, name: impl Into<String>) -> Arc<Task> {
        Task::new(name, ActivationCondition::simple(), self)
    }
}

#[async_trait]
impl TaskLogic for IterationTask {
    async fn execute(&self, ctx: &RunContext) -> Result<()> {
        let name = ctx.task_name().unwrap_or("iteration");
        for iteration in 1..=self.iterations {
            tokio::time::sleep(self.pause).await;
            info!("{} iteration {}/{}", name, iteration, self.iterations);
        }
        Ok(())
    }
}

/// Build the project the `run` command schedules.
pub fn demo_project() -> Arc<Project> {
    let project = Project::new("demo");
    let now = Utc::now();

    project.enqueue(Task::from_async(
        "heartbeat",
        ActivationCondition::recurring(now, chrono::Duration::seconds(1), None, false),
        |ctx| async move {
            let queued = ctx.project().map(|project| project.len()).unwrap_or(0);
            info!("Heartbeat from {} ({} queued)", ctx.project_name(), queued);
            anyhow::Ok(())
        },
    ));

    project.enqueue(Task::from_fn(
        "countdown",
        ActivationCondition::recurring(now, chrono::Duration::milliseconds(500), Some(5), true),
        || Ok(()),
    ));

    project.enqueue(
        TaskGroup::new(
            GroupMode::Sequential,
            vec![
                IterationTask::new(2, Duration::from_millis(100)).into_task("prepare"),
                IterationTask::new(3, Duration::from_millis(100)).into_task("build"),
                IterationTask::new(1, Duration::from_millis(100)).into_task("publish"),
            ],
        )
        .into_task("pipeline"),
    );

    project.enqueue(
        TaskGroup::new(
            GroupMode::Concurrent,
            (1..=3)
                .map(|n| {
                    IterationTask::new(n, Duration::from_millis(150)).into_task(format!("worker-{n}"))
                })
                .collect(),
        )
        .into_task("fan-out"),
    );

    project.enqueue(Task::from_fn(
        "flaky",
        ActivationCondition::simple(),
        || {
            std::fs::read_to_string("/nonexistent/taskserver/input")
                .map(|_| ())
                .context("Failed to read demo input")
        },
    ));

    project.enqueue(Task::from_fn(
        "report",
        ActivationCondition::scheduled(now + chrono::Duration::seconds(2), false),
        || {
            info!("Scheduled report is due");
            Ok(())
        },
    ));

    project
}
