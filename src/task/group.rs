use crate::task::condition::ActivationCondition;
use crate::task::execution::{RunContext, TaskLogic};
use crate::task::types::Task;
use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// How a group runs its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    /// One child at a time, in order; each runs to completion before the next starts.
    Sequential,
    /// Every child on its own execution unit, joined before the group finishes.
    Concurrent,
}

/// Task logic that runs a fixed, ordered set of child tasks.
///
/// Children belong to the group and are never enqueued into a project. A
/// failing child reports its own `Failed` event; the group carries on with
/// the remaining children and its own outcome only reflects the fan-out.
pub struct TaskGroup {
    mode: GroupMode,
    children: Vec<Arc<Task>>,
}

impl TaskGroup {
    pub fn new(mode: GroupMode, children: Vec<Arc<Task>>) -> Self {
        Self { mode, children }
    }

    /// Wrap the group into a task with a simple activation condition.
    pub fn into_task(self, name: impl Into<String>) -> Arc<Task> {
        self.into_task_with(name, ActivationCondition::simple())
    }

    pub fn into_task_with(self, name: impl Into<String>, condition: ActivationCondition) -> Arc<Task> {
        Task::new(name, condition, self)
    }

    pub fn mode(&self) -> GroupMode {
        self.mode
    }

    pub fn children(&self) -> &[Arc<Task>] {
        &self.children
    }

    async fn run_sequential(&self, group: &str, ctx: &RunContext) {
        for (index, child) in self.children.iter().enumerate() {
            if !child.is_ready() {
                warn!(
                    "Child {} of group {} is not ready; skipping it and {} remaining",
                    child.name(),
                    group,
                    self.children.len() - index - 1
                );
                break;
            }

            let outcome = child.run(ctx).await;
            debug!("Group child {} finished: {:?}", child.name(), outcome);
        }
    }

    async fn run_concurrent(&self, ctx: &RunContext) {
        let units = self.children.iter().map(|child| {
            let child = Arc::clone(child);
            let ctx = ctx.clone();
            tokio::spawn(async move { child.run(&ctx).await })
        });

        for joined in join_all(units).await {
            if let Err(join_error) = joined {
                error!("Group child execution unit aborted: {}", join_error);
            }
        }
    }
}

#[async_trait::async_trait]
impl TaskLogic for TaskGroup {
    async fn execute(&self, ctx: &RunContext) -> Result<()> {
        let group = ctx.task_name().unwrap_or("<unnamed>");
        let children_ctx = ctx.for_children();
        match self.mode {
            GroupMode::Sequential => self.run_sequential(group, &children_ctx).await,
            GroupMode::Concurrent => self.run_concurrent(&children_ctx).await,
        }
        Ok(())
    }
}
