use crate::error::SchedulerError;
use crate::events::{SchedulerEvent, TaskEvent};
use crate::scheduler::*;
use crate::task::{ActivationCondition, GroupMode, Task, TaskGroup};
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Semaphore, broadcast};

fn config() -> SchedulerConfig {
    SchedulerConfig::default()
        .with_name("test")
        .with_updates_per_second(200)
}

fn scheduled(name: &str, at: chrono::DateTime<Utc>) -> Arc<Task> {
    Task::from_fn(name, ActivationCondition::scheduled(at, false), || Ok(()))
}

fn names(project: &Project) -> Vec<String> {
    std::iter::from_fn(|| project.pop_next())
        .map(|task| task.name().to_string())
        .collect()
}

/// Task that records its name into `log` once `gate` hands it a permit.
fn gated(name: &str, gate: &Arc<Semaphore>, log: &Arc<Mutex<Vec<String>>>) -> Arc<Task> {
    let gate = Arc::clone(gate);
    let log = Arc::clone(log);
    let entry = format!("{name}-ran");
    Task::from_async(name, ActivationCondition::simple(), move |_ctx| {
        let gate = Arc::clone(&gate);
        let log = Arc::clone(&log);
        let entry = entry.clone();
        async move {
            let _permit = gate.acquire().await?;
            log.lock().unwrap().push(entry);
            anyhow::Ok(())
        }
    })
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}

async fn next_task_event(rx: &mut broadcast::Receiver<SchedulerEvent>) -> TaskEvent {
    loop {
        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a task event")
            .expect("event bus closed");
        if let SchedulerEvent::Task(event) = event {
            return event;
        }
    }
}

#[test]
fn test_project_pops_in_scheduled_order() {
    let base = Utc::now() + Duration::hours(1);
    let project = Project::new("ordering");

    project.enqueue(scheduled("t3", base + Duration::seconds(3)));
    project.enqueue(scheduled("t1", base + Duration::seconds(1)));
    project.enqueue(scheduled("t2", base + Duration::seconds(2)));

    assert_eq!(project.len(), 3);
    assert_eq!(project.peek_next().map(|t| t.name().to_string()), Some("t1".into()));
    assert_eq!(names(&project), vec!["t1", "t2", "t3"]);
    assert!(project.is_empty());
}

#[test]
fn test_project_keeps_insertion_order_for_equal_keys() {
    let at = Utc::now();
    let project = Project::new("ties");

    for name in ["first", "second", "third"] {
        project.enqueue(scheduled(name, at));
    }

    assert_eq!(names(&project), vec!["first", "second", "third"]);
}

#[test]
fn test_pop_ready_leaves_future_tasks_queued() {
    let now = Utc::now();
    let project = Project::new("readiness");
    project.enqueue(scheduled("due", now - Duration::seconds(1)));
    project.enqueue(scheduled("later", now + Duration::hours(1)));

    assert_eq!(project.pop_ready_at(now).map(|t| t.name().to_string()), Some("due".into()));
    assert!(project.pop_ready_at(now).is_none());
    assert_eq!(project.len(), 1);
}

#[test]
fn test_task_that_is_never_ready_blocks_the_queue_head() {
    let now = Utc::now();
    let project = Project::new("blocked");
    project.enqueue(Task::from_fn(
        "exhausted",
        ActivationCondition::recurring(now - Duration::hours(1), Duration::seconds(1), Some(0), false),
        || Ok(()),
    ));
    project.enqueue(Task::from_fn("simple", ActivationCondition::simple(), || Ok(())));

    assert!(project.pop_ready_at(Utc::now()).is_none());
    assert_eq!(project.len(), 2);
}

#[test]
fn test_invalid_config_is_rejected() {
    let result = Scheduler::new(SchedulerConfig::default().with_updates_per_second(0));
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}

#[test]
fn test_start_requires_a_runtime() {
    let scheduler = Scheduler::new(config()).unwrap();
    assert_eq!(scheduler.start(), Err(SchedulerError::NoRuntime));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[test]
fn test_projects_are_registered_once() {
    let scheduler = Scheduler::new(config()).unwrap();
    let project = Project::new("main");

    assert!(scheduler.add_project(project.clone()));
    assert!(!scheduler.add_project(project.clone()));
    assert_eq!(scheduler.projects().len(), 1);

    let removed = scheduler.remove_project(project.id()).unwrap();
    assert!(Arc::ptr_eq(&removed, &project));
    assert!(scheduler.remove_project(project.id()).is_none());
}

#[tokio::test]
async fn test_start_and_stop_lifecycle() {
    let scheduler = Scheduler::new(config()).unwrap();
    let mut rx = scheduler.subscribe();

    assert_eq!(scheduler.stop().await, Err(SchedulerError::NotRunning));

    scheduler.start().unwrap();
    assert!(scheduler.is_running());
    assert_eq!(scheduler.state(), SchedulerState::Running);
    assert_eq!(scheduler.start(), Err(SchedulerError::AlreadyRunning));

    scheduler.stop().await.unwrap();
    assert!(!scheduler.is_running());
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert_eq!(scheduler.stop().await, Err(SchedulerError::NotRunning));

    let mut saw_started = false;
    let mut saw_stopped = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            SchedulerEvent::SchedulerStarted { scheduler, .. } => {
                assert_eq!(scheduler, "test");
                saw_started = true;
            }
            SchedulerEvent::SchedulerStopped { .. } => saw_stopped = true,
            _ => {}
        }
    }
    assert!(saw_started && saw_stopped);

    // A stopped scheduler can be started again.
    scheduler.start().unwrap();
    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_running_scheduler_dispatches_enqueued_task() {
    let scheduler = Scheduler::new(config()).unwrap();
    let mut rx = scheduler.subscribe();
    let project = Project::new("main");
    scheduler.add_project(project.clone());

    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    project.enqueue(Task::from_fn("T", ActivationCondition::simple(), move || {
        sink.lock().unwrap().push("T-ran".to_string());
        Ok(())
    }));

    scheduler.start().unwrap();

    let started = next_task_event(&mut rx).await;
    assert!(started.is_started());
    assert_eq!(started.task_name, "T");
    assert_eq!(started.project_name, "main");
    assert_eq!(started.scheduler, "test");

    let completed = next_task_event(&mut rx).await;
    assert!(completed.is_completed());
    assert_eq!(*log.lock().unwrap(), vec!["T-ran"]);

    scheduler.stop().await.unwrap();
    assert!(project.is_empty());
    assert!(scheduler.ticks() > 0);
}

#[tokio::test]
async fn test_tick_publishes_update_complete() {
    let scheduler = Scheduler::new(config()).unwrap();
    let mut rx = scheduler.subscribe();
    let project = Project::new("main");
    scheduler.add_project(project.clone());
    project.enqueue(scheduled("now", Utc::now()));
    project.enqueue(scheduled("later", Utc::now() + Duration::hours(1)));

    assert_eq!(scheduler.tick().await, 1);
    assert_eq!(scheduler.tick().await, 0);

    let mut updates = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let SchedulerEvent::UpdateComplete { tick, dispatched, .. } = event {
            updates.push((tick, dispatched));
        }
    }
    assert_eq!(updates, vec![(1, 1), (2, 0)]);
    assert_eq!(project.len(), 1);
}

#[tokio::test]
async fn test_awaited_tasks_finish_before_the_tick_moves_on() {
    let scheduler = Scheduler::new(config()).unwrap();
    let project = Project::new("main");
    scheduler.add_project(project.clone());

    let log = Arc::new(Mutex::new(Vec::new()));
    let now = Utc::now();
    for (name, pause, offset) in [("A", 30, 0), ("B", 0, 1)] {
        let log = Arc::clone(&log);
        project.enqueue(Task::from_async(
            name,
            ActivationCondition::scheduled(now - Duration::seconds(10 - offset), true),
            move |_ctx| {
                let log = Arc::clone(&log);
                async move {
                    tokio::time::sleep(std::time::Duration::from_millis(pause)).await;
                    log.lock().unwrap().push(name);
                    anyhow::Ok(())
                }
            },
        ));
    }

    assert_eq!(scheduler.tick().await, 2);
    assert_eq!(*log.lock().unwrap(), vec!["A", "B"]);
    assert_eq!(scheduler.active_task_count(), 0);
}

#[tokio::test]
async fn test_non_awaited_task_does_not_block_the_tick() {
    let scheduler = Scheduler::new(config()).unwrap();
    let project = Project::new("main");
    scheduler.add_project(project.clone());

    let gate = Arc::new(Semaphore::new(0));
    let log = Arc::new(Mutex::new(Vec::new()));
    project.enqueue(gated("blocked", &gate, &log));

    let dispatched = tokio::time::timeout(std::time::Duration::from_secs(1), scheduler.tick())
        .await
        .expect("tick should not wait for a non-awaited task");
    assert_eq!(dispatched, 1);

    wait_until("task to start", || scheduler.active_task_count() == 1).await;
    assert!(log.lock().unwrap().is_empty());

    gate.add_permits(1);
    wait_until("task to finish", || scheduler.active_task_count() == 0).await;
    assert_eq!(*log.lock().unwrap(), vec!["blocked-ran"]);
}

#[tokio::test]
async fn test_recurring_task_runs_max_iterations_times() {
    let scheduler = Scheduler::new(config()).unwrap();
    let project = Project::new("main");
    scheduler.add_project(project.clone());

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let task = Task::from_fn(
        "recurring",
        ActivationCondition::recurring(
            Utc::now() - Duration::hours(1),
            Duration::milliseconds(1),
            Some(3),
            true,
        ),
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    );
    project.enqueue(task.clone());

    let mut dispatched = Vec::new();
    for _ in 0..5 {
        dispatched.push(scheduler.tick().await);
    }

    assert_eq!(dispatched, vec![1, 1, 1, 0, 0]);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(task.condition().iterations(), Some(3));
    assert!(!task.add_back_to_project());
    assert!(project.is_empty());
    assert_eq!(task.execution_handle().map(|h| h.generation()), Some(3));
}

#[tokio::test]
async fn test_active_tasks_track_running_tasks() {
    let scheduler = Scheduler::new(config()).unwrap();
    let mut rx = scheduler.subscribe();
    let project = Project::new("main");
    scheduler.add_project(project.clone());

    let gate = Arc::new(Semaphore::new(0));
    let log = Arc::new(Mutex::new(Vec::new()));
    project.enqueue(gated("worker", &gate, &log));

    scheduler.start().unwrap();
    wait_until("worker to become active", || scheduler.active_task_count() == 1).await;

    assert_eq!(scheduler.active_task_count_for(project.id()), 1);
    let active = scheduler.active_tasks();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].task_name, "worker");
    assert_eq!(active[0].project_name, "main");
    assert_eq!(active[0].runs, 1);

    gate.add_permits(1);
    wait_until("worker to finish", || scheduler.active_task_count() == 0).await;
    scheduler.stop().await.unwrap();

    let mut counts = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let SchedulerEvent::ActiveTasksChanged { task, active, .. } = event {
            assert_eq!(task, "worker");
            counts.push(active);
        }
    }
    assert_eq!(counts, vec![1, 0]);
    assert_eq!(scheduler.active_task_count_for(project.id()), 0);
}

#[tokio::test]
async fn test_group_children_count_as_active() {
    let scheduler = Scheduler::new(config()).unwrap();
    let project = Project::new("main");
    scheduler.add_project(project.clone());

    let gate = Arc::new(Semaphore::new(0));
    let log = Arc::new(Mutex::new(Vec::new()));
    let group = TaskGroup::new(
        GroupMode::Concurrent,
        vec![gated("left", &gate, &log), gated("right", &gate, &log)],
    )
    .into_task("pair");
    project.enqueue(group);

    scheduler.tick().await;
    wait_until("group and children to start", || scheduler.active_task_count() == 3).await;

    gate.add_permits(2);
    wait_until("group to finish", || scheduler.active_task_count() == 0).await;

    let mut ran = log.lock().unwrap().clone();
    ran.sort();
    assert_eq!(ran, vec!["left-ran", "right-ran"]);
}
