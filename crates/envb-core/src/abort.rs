use std::{
    collections::HashSet,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use envb_model::TaskId;

/// Externally observed abort flag, keyed by task id.
#[async_trait]
pub trait AbortSignal: Send + Sync {
    async fn is_aborted(&self, task_id: &TaskId) -> bool;
}

/// Abort check bound to one build attempt, polled by the runner.
#[async_trait]
pub trait AbortPoll: Send + Sync {
    async fn poll_abort(&self) -> bool;
}

/// [`AbortPoll`] over an [`AbortSignal`] for a fixed task id.
pub struct TaskAbort<'a> {
    signal: &'a dyn AbortSignal,
    task_id: &'a TaskId,
}

impl<'a> TaskAbort<'a> {
    pub fn new(signal: &'a dyn AbortSignal, task_id: &'a TaskId) -> Self {
        Self { signal, task_id }
    }
}

#[async_trait]
impl AbortPoll for TaskAbort<'_> {
    async fn poll_abort(&self) -> bool {
        self.signal.is_aborted(self.task_id).await
    }
}

#[derive(Default)]
struct Flags {
    running: HashSet<TaskId>,
    raised: HashSet<TaskId>,
}

/// In-memory abort flags for the tasks currently in flight.
///
/// Aborts for tasks that were never tracked, or were already cleared, are ignored, so the
/// registry only ever holds entries for running builds.
#[derive(Clone, Default)]
pub struct AbortRegistry {
    inner: Arc<RwLock<Flags>>,
}

impl AbortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accepting aborts for `task_id`.
    pub fn track(&self, task_id: TaskId) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .running
            .insert(task_id);
    }

    /// Raise the flag for `task_id`.
    ///
    /// Returns `false` if the task is not in flight or the flag was already raised.
    pub fn abort(&self, task_id: TaskId) -> bool {
        let mut flags = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        flags.running.contains(&task_id) && flags.raised.insert(task_id)
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .raised
            .contains(task_id)
    }

    /// Number of tasks in flight.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .running
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget `task_id` once its attempt is over; later aborts for it are ignored.
    pub fn clear(&self, task_id: &TaskId) {
        let mut flags = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        flags.running.remove(task_id);
        flags.raised.remove(task_id);
    }
}

#[async_trait]
impl AbortSignal for AbortRegistry {
    async fn is_aborted(&self, task_id: &TaskId) -> bool {
        self.contains(task_id)
    }
}
