use marionette_events::BehaviorUseId;

/// Unique identifier for a sleep request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SleepId(u64);

/// What a suspended handler was processing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SleepKey {
    pub actor: String,
    pub use_id: BehaviorUseId,
    pub message: String,
}

/// Scheduling state of one actor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SleepState {
    Running,
    /// Suspended until the earliest pending wake time
    Sleeping { until: f64 },
}

/// A suspended handler and the data it resumes with
#[derive(Debug)]
pub struct SleepingTask<T> {
    pub id: SleepId,
    pub key: SleepKey,
    /// Absolute game time at which the task may resume
    pub until: f64,
    pub payload: T,
}

/// Per-actor suspension scheduler keyed by absolute game time.
///
/// Tasks are kept in call order; `take_due` hands back every task whose wake
/// time has passed, still in call order.
pub struct SleepManager<T> {
    tasks: Vec<SleepingTask<T>>,
    next_id: u64,
}

impl<T> SleepManager<T> {
    /// Create a new sleep manager
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 0,
        }
    }

    /// Suspend `key` until `now + seconds`
    pub fn schedule(&mut self, key: SleepKey, now: f64, seconds: f64, payload: T) -> SleepId {
        let id = SleepId(self.next_id);
        self.next_id += 1;

        self.tasks.push(SleepingTask {
            id,
            key,
            until: now + seconds,
            payload,
        });
        id
    }

    /// True while a handler for this (actor, use, message) is suspended
    pub fn is_sleeping(&self, actor: &str, use_id: &BehaviorUseId, message: &str) -> bool {
        self.tasks.iter().any(|task| {
            task.key.actor == actor && &task.key.use_id == use_id && task.key.message == message
        })
    }

    pub fn state(&self, actor: &str) -> SleepState {
        self.tasks
            .iter()
            .filter(|task| task.key.actor == actor)
            .map(|task| task.until)
            .reduce(f64::min)
            .map_or(SleepState::Running, |until| SleepState::Sleeping { until })
    }

    /// Abandon every task for a destroyed actor
    pub fn cancel_actor(&mut self, actor: &str) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.key.actor != actor);
        before - self.tasks.len()
    }

    /// Remove and return tasks whose wake time has been reached, in call order
    pub fn take_due(&mut self, now: f64) -> Vec<SleepingTask<T>> {
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|task| now >= task.until);
        self.tasks = pending;
        due
    }

    /// Get the number of suspended handlers
    pub fn pending_count(&self) -> usize {
        self.tasks.len()
    }
}

impl<T> Default for SleepManager<T> {
    fn default() -> Self {
        Self::new()
    }
}
