use crate::events::{ActiveChange, SchedulerEvent, TaskEvent, TaskTransition};
use crate::scheduler::ProjectId;
use crate::sync::lock;
use crate::task::TaskId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Tasks currently running, grouped by project, behind one mutex.
#[derive(Debug, Default)]
pub struct ActiveTasks {
    projects: Mutex<HashMap<ProjectId, ProjectActivity>>,
}

#[derive(Debug)]
struct ProjectActivity {
    name: String,
    tasks: HashMap<TaskId, ActiveEntry>,
}

#[derive(Debug)]
struct ActiveEntry {
    name: String,
    started_at: DateTime<Utc>,
    runs: usize,
}

/// Snapshot of one active task.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveTask {
    pub project_id: ProjectId,
    pub project_name: String,
    pub task_id: TaskId,
    pub task_name: String,
    pub started_at: DateTime<Utc>,
    /// Concurrent runs of the same task object.
    pub runs: usize,
}

impl ActiveTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `event` to the bookkeeping and describe the change, if any.
    pub fn apply(&self, event: &TaskEvent) -> Option<SchedulerEvent> {
        let (change, active) = {
            let mut projects = lock(&self.projects);
            let change = match event.transition {
                TaskTransition::Started => {
                    let activity =
                        projects
                            .entry(event.project_id)
                            .or_insert_with(|| ProjectActivity {
                                name: event.project_name.clone(),
                                tasks: HashMap::new(),
                            });
                    activity
                        .tasks
                        .entry(event.task_id)
                        .and_modify(|entry| entry.runs += 1)
                        .or_insert_with(|| ActiveEntry {
                            name: event.task_name.clone(),
                            started_at: event.at,
                            runs: 1,
                        });
                    ActiveChange::Added
                }
                TaskTransition::Completed | TaskTransition::Failed(_) => {
                    let Some(activity) = projects.get_mut(&event.project_id) else {
                        warn!(
                            "Task {} finished but project {} has no active tasks",
                            event.task_name, event.project_name
                        );
                        return None;
                    };
                    let Some(entry) = activity.tasks.get_mut(&event.task_id) else {
                        warn!("Task {} finished but was not active", event.task_name);
                        return None;
                    };
                    entry.runs -= 1;
                    if entry.runs == 0 {
                        activity.tasks.remove(&event.task_id);
                    }
                    if activity.tasks.is_empty() {
                        projects.remove(&event.project_id);
                    }
                    ActiveChange::Removed
                }
            };
            (change, Self::total(&projects))
        };

        debug!(
            "Active tasks after {} of {}: {}",
            event.transition.label(),
            event.task_name,
            active
        );

        Some(SchedulerEvent::ActiveTasksChanged {
            project: event.project_name.clone(),
            task: event.task_name.clone(),
            change,
            active,
            at: Utc::now(),
        })
    }

    /// Total active runs across all projects.
    pub fn count(&self) -> usize {
        Self::total(&lock(&self.projects))
    }

    pub fn count_for(&self, project: ProjectId) -> usize {
        lock(&self.projects)
            .get(&project)
            .map(|activity| activity.tasks.values().map(|entry| entry.runs).sum())
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> Vec<ActiveTask> {
        let projects = lock(&self.projects);
        projects
            .iter()
            .flat_map(|(project_id, activity)| {
                activity.tasks.iter().map(|(task_id, entry)| ActiveTask {
                    project_id: *project_id,
                    project_name: activity.name.clone(),
                    task_id: *task_id,
                    task_name: entry.name.clone(),
                    started_at: entry.started_at,
                    runs: entry.runs,
                })
            })
            .collect()
    }

    fn total(projects: &HashMap<ProjectId, ProjectActivity>) -> usize {
        projects
            .values()
            .flat_map(|activity| activity.tasks.values())
            .map(|entry| entry.runs)
            .sum()
    }
}
