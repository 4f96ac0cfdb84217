use crate::sync::lock;
use crate::task::Task;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Unique identifier for projects
pub type ProjectId = Uuid;

/// A named owner of tasks, holding them ordered by scheduled time.
///
/// The queue key is read from the task's condition once, at enqueue time.
/// Tasks with equal keys come out in insertion order.
pub struct Project {
    id: ProjectId,
    name: String,
    created_at: DateTime<Utc>,
    queue: Mutex<TaskQueue>,
}

#[derive(Default)]
struct TaskQueue {
    heap: BinaryHeap<QueueEntry>,
    next_seq: u64,
}

struct QueueEntry {
    key: DateTime<Utc>,
    seq: u64,
    task: Arc<Task>,
}

// Reversed so the max-heap yields the earliest (key, seq) first.
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl Project {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            queue: Mutex::new(TaskQueue::default()),
        })
    }

    pub fn id(&self) -> ProjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Insert `task` keyed by its current scheduled time.
    pub fn enqueue(&self, task: Arc<Task>) {
        let key = task.scheduled_time();
        let mut queue = lock(&self.queue);
        let seq = queue.next_seq;
        queue.next_seq += 1;
        debug!("Project {} enqueued task {} for {}", self.name, task.name(), key);
        queue.heap.push(QueueEntry { key, seq, task });
    }

    /// The head of the queue, left in place.
    pub fn peek_next(&self) -> Option<Arc<Task>> {
        lock(&self.queue)
            .heap
            .peek()
            .map(|entry| Arc::clone(&entry.task))
    }

    /// Remove and return the head of the queue.
    pub fn pop_next(&self) -> Option<Arc<Task>> {
        lock(&self.queue).heap.pop().map(|entry| entry.task)
    }

    /// Pop the head only if it is ready at `now`, under a single lock.
    pub fn pop_ready_at(&self, now: DateTime<Utc>) -> Option<Arc<Task>> {
        let mut queue = lock(&self.queue);
        if queue.heap.peek()?.task.is_ready_at(now) {
            queue.heap.pop().map(|entry| entry.task)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.queue).heap.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.queue).heap.is_empty()
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("created_at", &self.created_at)
            .field("queued", &self.len())
            .finish()
    }
}
