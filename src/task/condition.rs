use chrono::{DateTime, Duration, Utc};

/// Readiness policy attached to exactly one task.
///
/// The policy decides when the task may be dispatched, where it sorts inside
/// its project's queue, and whether the scheduler hands it back to the
/// project after a run.
#[derive(Clone, Debug)]
pub struct ActivationCondition {
    policy: ActivationPolicy,
    has_run_before: bool,
}

/// The closed set of readiness policies.
#[derive(Clone, Debug, PartialEq)]
pub enum ActivationPolicy {
    /// Always ready, runs once.
    Simple { created_at: DateTime<Utc> },
    /// Ready from `at` onwards, runs once.
    Scheduled { at: DateTime<Utc>, awaited: bool },
    /// Ready every `interval` starting at `start`, optionally bounded.
    Recurring(Recurrence),
}

/// State of a recurring policy.
#[derive(Clone, Debug, PartialEq)]
pub struct Recurrence {
    pub start: DateTime<Utc>,
    pub interval: Duration,
    /// `None` means unbounded.
    pub max_iterations: Option<u32>,
    pub awaited: bool,
    iterations: u32,
}

impl Recurrence {
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    fn has_iterations_left(&self) -> bool {
        match self.max_iterations {
            None => true,
            Some(max) => self.iterations < max,
        }
    }

    fn next_run(&self) -> DateTime<Utc> {
        let steps = i32::try_from(self.iterations).unwrap_or(i32::MAX);
        self.interval
            .checked_mul(steps)
            .and_then(|offset| self.start.checked_add_signed(offset))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl ActivationCondition {
    /// Always-ready, one-shot condition keyed at construction time.
    pub fn simple() -> Self {
        Self::from_policy(ActivationPolicy::Simple {
            created_at: Utc::now(),
        })
    }

    /// One-shot condition that becomes ready at `at`.
    pub fn scheduled(at: DateTime<Utc>, awaited: bool) -> Self {
        Self::from_policy(ActivationPolicy::Scheduled { at, awaited })
    }

    /// Recurring condition firing at `start + interval * n`.
    ///
    /// `max_iterations = Some(0)` produces a condition that is never ready.
    pub fn recurring(
        start: DateTime<Utc>,
        interval: Duration,
        max_iterations: Option<u32>,
        awaited: bool,
    ) -> Self {
        Self::from_policy(ActivationPolicy::Recurring(Recurrence {
            start,
            interval,
            max_iterations,
            awaited,
            iterations: 0,
        }))
    }

    fn from_policy(policy: ActivationPolicy) -> Self {
        Self {
            policy,
            has_run_before: false,
        }
    }

    pub fn policy(&self) -> &ActivationPolicy {
        &self.policy
    }

    /// Whether the task may be dispatched at `now`.
    pub fn is_ready_at(&self, now: DateTime<Utc>) -> bool {
        match &self.policy {
            ActivationPolicy::Simple { .. } => true,
            ActivationPolicy::Scheduled { at, .. } => now >= *at,
            ActivationPolicy::Recurring(r) => {
                now >= r.start && r.has_iterations_left() && now >= r.next_run()
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready_at(Utc::now())
    }

    /// Queue key of the task.
    pub fn scheduled_time(&self) -> DateTime<Utc> {
        match &self.policy {
            ActivationPolicy::Simple { created_at } => *created_at,
            ActivationPolicy::Scheduled { at, .. } => *at,
            ActivationPolicy::Recurring(r) => r.next_run(),
        }
    }

    /// Whether the task goes back into its project after running.
    pub fn add_back_to_project(&self) -> bool {
        match &self.policy {
            ActivationPolicy::Simple { .. } | ActivationPolicy::Scheduled { .. } => false,
            ActivationPolicy::Recurring(r) => r.has_iterations_left(),
        }
    }

    /// Whether the driving loop blocks until this task's run settles.
    pub fn awaited(&self) -> bool {
        match &self.policy {
            ActivationPolicy::Simple { .. } => false,
            ActivationPolicy::Scheduled { awaited, .. } => *awaited,
            ActivationPolicy::Recurring(r) => r.awaited,
        }
    }

    pub fn has_run_before(&self) -> bool {
        self.has_run_before
    }

    pub(crate) fn mark_run(&mut self) {
        self.has_run_before = true;
    }

    /// Completed iterations for recurring policies, `None` otherwise.
    pub fn iterations(&self) -> Option<u32> {
        match &self.policy {
            ActivationPolicy::Recurring(r) => Some(r.iterations),
            _ => None,
        }
    }

    /// Moves a recurring policy to its next iteration. No-op for one-shot policies.
    pub fn advance(&mut self) {
        if let ActivationPolicy::Recurring(r) = &mut self.policy {
            r.iterations = r.iterations.saturating_add(1);
        }
    }
}

impl Default for ActivationCondition {
    fn default() -> Self {
        Self::simple()
    }
}
