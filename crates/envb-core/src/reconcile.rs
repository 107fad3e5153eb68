//! Detached artifact reconciliation.
//!
//! Artifacts of a finished build may still be referenced by the container engine for a short
//! while, so deletion is retried on a fixed schedule. Each cleanup loop is a supervised task
//! restarted on failure; nothing here ever reports to the caller, the loop logs and gives up
//! after the policy's attempt budget.
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU32, Ordering},
};

use envb_model::{LabelFilter, TaskId};
use taskvisor::{TaskError, TaskFn, TaskRef};
use tokio::{sync::oneshot, time};
use tokio_util::{
    sync::CancellationToken,
    task::{TaskTracker, task_tracker::TaskTrackerToken},
};
use tracing::{debug, info, warn};

use crate::{
    config::RetryPolicy,
    control::ArtifactStore,
    metrics::MetricsBackend,
    supervisor::{TaskSupervisor, task_name},
};

/// Result of one reconciliation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// An attempt removed `removed` images.
    Deleted { attempts: u32, removed: usize },
    /// Every attempt removed no image or failed.
    Exhausted { attempts: u32 },
}

impl ReconcileOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Deleted { .. } => "deleted",
            ReconcileOutcome::Exhausted { .. } => "exhausted",
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ArtifactStore>,
    policy: RetryPolicy,
    supervisor: Arc<TaskSupervisor>,
    tracker: TaskTracker,
    metrics: Arc<dyn MetricsBackend>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        policy: RetryPolicy,
        supervisor: Arc<TaskSupervisor>,
        metrics: Arc<dyn MetricsBackend>,
    ) -> Self {
        Self {
            store,
            policy,
            supervisor,
            tracker: TaskTracker::new(),
            metrics,
        }
    }

    /// Submit a cleanup loop for the artifacts of `task_id` matching `filter`.
    ///
    /// The loop stops at the first attempt that removes at least one image. The receiver
    /// yields its outcome; dropping it does not stop the loop, and [`Reconciler::drain`]
    /// still waits for it.
    pub async fn spawn_detached(
        &self,
        task_id: &TaskId,
        filter: LabelFilter,
    ) -> oneshot::Receiver<ReconcileOutcome> {
        let (done, outcome) = oneshot::channel();
        let cleanup = Arc::new(Cleanup {
            store: Arc::clone(&self.store),
            policy: self.policy,
            metrics: Arc::clone(&self.metrics),
            filter_str: filter.to_strings().join(","),
            filter,
            attempts: AtomicU32::new(0),
            done: Mutex::new(Some((done, self.tracker.token()))),
        });

        let name = task_name("reconcile", task_id);
        let body = Arc::clone(&cleanup);
        let task: TaskRef = TaskFn::arc(name, move |ctx: CancellationToken| {
            let cleanup = Arc::clone(&body);
            async move { cleanup.attempt(&ctx).await }
        });

        if let Err(e) = self
            .supervisor
            .submit_retrying(task, self.policy.delay)
            .await
        {
            warn!(target: "envb.core.reconcile", filter = %cleanup.filter_str, error = %e, "cleanup loop not accepted");
            cleanup.finish(ReconcileOutcome::Exhausted { attempts: 0 });
        }
        outcome
    }

    /// Number of loops still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting new loops and wait for the running ones.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// State of one cleanup loop, shared by every run of its task body.
struct Cleanup {
    store: Arc<dyn ArtifactStore>,
    policy: RetryPolicy,
    metrics: Arc<dyn MetricsBackend>,
    filter: LabelFilter,
    filter_str: String,
    attempts: AtomicU32,
    done: Mutex<Option<(oneshot::Sender<ReconcileOutcome>, TaskTrackerToken)>>,
}

impl Cleanup {
    /// One deletion attempt. `Err` asks the supervisor for another run after the backoff.
    async fn attempt(&self, ctx: &CancellationToken) -> Result<(), TaskError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let budget = self.policy.attempts.max(1);
        let filter = self.filter_str.as_str();

        // The backoff spaces later attempts; the first one waits here.
        if attempt == 1 {
            time::sleep(self.policy.delay).await;
        }

        let reason = match time::timeout(
            self.policy.attempt_timeout,
            self.store.delete_matching(&self.filter),
        )
        .await
        {
            Ok(Ok(removal)) if removal.images > 0 => {
                info!(target: "envb.core.reconcile", filter, attempt, images = removal.images, containers = removal.containers, "artifacts removed");
                self.finish(ReconcileOutcome::Deleted {
                    attempts: attempt,
                    removed: removal.images,
                });
                return Ok(());
            }
            Ok(Ok(removal)) => {
                debug!(target: "envb.core.reconcile", filter, attempt, containers = removal.containers, "no image to delete yet");
                "no image removed".to_string()
            }
            Ok(Err(e)) => {
                warn!(target: "envb.core.reconcile", filter, attempt, error = %e, "artifact deletion failed");
                e.to_string()
            }
            Err(_) => {
                warn!(target: "envb.core.reconcile", filter, attempt, timeout = ?self.policy.attempt_timeout, "artifact deletion timed out");
                "deletion timed out".to_string()
            }
        };

        if attempt >= budget || ctx.is_cancelled() {
            warn!(target: "envb.core.reconcile", filter, attempts = attempt, "giving up on artifact cleanup");
            self.finish(ReconcileOutcome::Exhausted { attempts: attempt });
            return Ok(());
        }
        Err(TaskError::Fail { reason })
    }

    fn finish(&self, outcome: ReconcileOutcome) {
        let Some((done, _token)) = self
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };
        self.metrics.reconcile_finished(&outcome);
        let _ = done.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use envb_model::TaskId;

    use super::*;
    use crate::{control::Removal, error::ServiceError, metrics::NoopMetrics};

    /// Fails once, then prunes a container per call; images show up on the `images_on`-th call.
    struct LateImage {
        calls: AtomicU32,
        images_on: u32,
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl LateImage {
        fn new(images_on: u32) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                images_on,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ArtifactStore for LateImage {
        async fn delete_matching(&self, filter: &LabelFilter) -> Result<Removal, ServiceError> {
            self.seen.lock().unwrap().push(filter.to_strings());
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match n {
                1 => Err(ServiceError::Unavailable("engine busy".into())),
                n if n >= self.images_on => Ok(Removal {
                    containers: 0,
                    images: 3,
                }),
                _ => Ok(Removal {
                    containers: 1,
                    images: 0,
                }),
            }
        }
    }

    struct Hang;

    #[async_trait]
    impl ArtifactStore for Hang {
        async fn delete_matching(&self, _: &LabelFilter) -> Result<Removal, ServiceError> {
            std::future::pending().await
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 10,
            delay: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(10),
        }
    }

    async fn reconciler(store: Arc<dyn ArtifactStore>, policy: RetryPolicy) -> Reconciler {
        Reconciler::new(store, policy, TaskSupervisor::start().await, Arc::new(NoopMetrics))
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_first_attempt_that_removes_an_image() {
        let store = LateImage::new(4);
        let rec = reconciler(store.clone(), policy()).await;
        let filter = LabelFilter::for_cleanup(&TaskId::from("t1"), false);

        let outcome = rec.spawn_detached(&TaskId::from("t1"), filter.clone()).await;

        assert_eq!(
            outcome.await.unwrap(),
            ReconcileOutcome::Deleted { attempts: 4, removed: 3 }
        );
        assert_eq!(store.calls.load(Ordering::SeqCst), 4);
        assert!(store.seen.lock().unwrap().iter().all(|f| *f == filter.to_strings()));
    }

    #[tokio::test(start_paused = true)]
    async fn pruned_containers_alone_keep_the_loop_going() {
        let store = LateImage::new(u32::MAX);
        let rec = reconciler(store.clone(), policy()).await;

        let outcome = rec
            .spawn_detached(&TaskId::from("t1"), LabelFilter::for_cleanup(&TaskId::from("t1"), true))
            .await;

        assert_eq!(outcome.await.unwrap(), ReconcileOutcome::Exhausted { attempts: 10 });
        assert_eq!(store.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempts_are_timed_out() {
        let mut p = policy();
        p.attempts = 2;
        let rec = reconciler(Arc::new(Hang), p).await;

        let outcome = rec
            .spawn_detached(&TaskId::from("t1"), LabelFilter::for_cleanup(&TaskId::from("t1"), false))
            .await;

        assert_eq!(outcome.await.unwrap(), ReconcileOutcome::Exhausted { attempts: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_detached_loops() {
        let store = LateImage::new(2);
        let rec = reconciler(store.clone(), policy()).await;

        let outcome = rec
            .spawn_detached(&TaskId::from("t1"), LabelFilter::for_cleanup(&TaskId::from("t1"), false))
            .await;
        assert_eq!(rec.pending(), 1);
        rec.drain().await;

        assert_eq!(rec.pending(), 0);
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            outcome.await.unwrap(),
            ReconcileOutcome::Deleted { attempts: 2, removed: 3 }
        );
    }
}
