//! Capacity-bounded execution of build attempts.
use std::{
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use envb_model::{BuildTask, TerminalStatus};
use taskvisor::{TaskError, TaskFn, TaskRef};
use tokio::sync::{Semaphore, oneshot};
use tokio_util::{
    sync::CancellationToken,
    task::{TaskTracker, task_tracker::TaskTrackerToken},
};
use tracing::{debug, info};

use crate::{
    attempt::EnvironmentBuilder,
    error::BuildError,
    supervisor::{TaskSupervisor, task_name},
};

/// Resolves to the attempt's result; closed without a value if the attempt panicked.
pub type BuildHandle = oneshot::Receiver<Result<TerminalStatus, BuildError>>;

/// Runs build attempts as supervised tasks, at most `capacity` at a time.
///
/// Submissions past capacity wait for a permit, they are not rejected.
pub struct BuildPool {
    builder: Arc<EnvironmentBuilder>,
    supervisor: Arc<TaskSupervisor>,
    permits: Arc<Semaphore>,
    capacity: usize,
    inflight: TaskTracker,
}

/// A submitted attempt that has not started yet.
struct Queued {
    task: BuildTask,
    project_path: PathBuf,
    done: oneshot::Sender<Result<TerminalStatus, BuildError>>,
    token: TaskTrackerToken,
}

impl BuildPool {
    pub fn new(
        builder: Arc<EnvironmentBuilder>,
        supervisor: Arc<TaskSupervisor>,
        capacity: usize,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            builder,
            supervisor,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            inflight: TaskTracker::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Queue a build attempt.
    pub async fn submit(
        &self,
        task: BuildTask,
        project_path: PathBuf,
    ) -> Result<BuildHandle, BuildError> {
        if self.inflight.is_closed() {
            return Err(BuildError::PoolClosed);
        }

        let name = task_name("build", &task.task_id);
        debug!(target: "envb.core.pool", task_id = %task.task_id, available = self.permits.available_permits(), "build queued");

        let (done, handle) = oneshot::channel();
        let queued = Arc::new(Mutex::new(Some(Queued {
            task,
            project_path,
            done,
            token: self.inflight.token(),
        })));
        let builder = Arc::clone(&self.builder);
        let permits = Arc::clone(&self.permits);

        let job: TaskRef = TaskFn::arc(name, move |_ctx: CancellationToken| {
            let queued = queued
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            let builder = Arc::clone(&builder);
            let permits = Arc::clone(&permits);
            async move {
                let Some(queued) = queued else {
                    return Ok(());
                };
                run_queued(builder, permits, queued).await
            }
        });

        self.supervisor
            .submit_once(job)
            .await
            .map_err(BuildError::Supervisor)?;
        Ok(handle)
    }

    /// Refuse new submissions, wait for queued and running attempts, then for their detached cleanups.
    pub async fn shutdown(&self) {
        self.inflight.close();
        info!(target: "envb.core.pool", pending = self.inflight.len(), "waiting for build attempts");
        self.inflight.wait().await;

        let reconciler = self.builder.reconciler();
        info!(target: "envb.core.pool", pending = reconciler.pending(), "waiting for artifact cleanups");
        reconciler.drain().await;
    }
}

/// Body of a build task.
///
/// The attempt itself runs on its own tokio task so its cleanup completes even when the
/// supervisor cancels the task body at shutdown.
async fn run_queued(
    builder: Arc<EnvironmentBuilder>,
    permits: Arc<Semaphore>,
    queued: Queued,
) -> Result<(), TaskError> {
    let permit = permits
        .acquire_owned()
        .await
        .map_err(|_| TaskError::Fatal {
            reason: "build permits closed".into(),
        })?;

    let Queued {
        task,
        project_path,
        done,
        token,
    } = queued;
    let attempt = tokio::spawn(async move {
        let _token = token;
        let result = builder.build(&task, &project_path).await;
        drop(permit);
        let failed = result.as_ref().err().map(ToString::to_string);
        let _ = done.send(result);
        failed
    });

    match attempt.await {
        Ok(None) => Ok(()),
        Ok(Some(reason)) => Err(TaskError::Fail { reason }),
        Err(e) => Err(TaskError::Fatal {
            reason: format!("build attempt panicked: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use envb_model::{BuildStatus, DEFAULT_SUCCESS_SENTINEL, LabelFilter, TaskId};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        abort::AbortRegistry,
        attempt::Collaborators,
        backend::{BackendExit, BuildBackend, BuildRequest},
        config::{EngineConfig, RetryPolicy},
        control::{ArtifactStore, ClusterJobs, DanglingImages, Removal, StatusSink},
        error::{BackendError, ServiceError},
        logs::LogHub,
        metrics::NoopMetrics,
        reconcile::Reconciler,
        supervisor::TaskSupervisor,
    };

    /// Tracks how many builds overlap.
    #[derive(Default)]
    struct Gauge {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl BuildBackend for Gauge {
        fn name(&self) -> &'static str {
            "gauge"
        }

        async fn build(
            &self,
            _request: BuildRequest,
            output: mpsc::Sender<String>,
            _cancel: CancellationToken,
        ) -> Result<BackendExit, BackendError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = output.send(DEFAULT_SUCCESS_SENTINEL.to_string()).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(BackendExit::SUCCESS)
        }
    }

    #[derive(Default)]
    struct Quiet(Mutex<usize>);

    #[async_trait]
    impl StatusSink for Quiet {
        async fn report(&self, _: &TaskId, _: BuildStatus) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    #[async_trait]
    impl ClusterJobs for Quiet {
        async fn delete_job(&self, _: &str) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    #[async_trait]
    impl DanglingImages for Quiet {
        async fn notify(&self, _: &str, _: &str) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    #[async_trait]
    impl ArtifactStore for Quiet {
        async fn delete_matching(&self, _: &LabelFilter) -> Result<Removal, ServiceError> {
            *self.0.lock().unwrap() += 1;
            Ok(Removal::images(1))
        }
    }

    async fn pool(
        dir: &std::path::Path,
        backend: Arc<Gauge>,
        store: Arc<Quiet>,
        capacity: usize,
    ) -> BuildPool {
        let config = Arc::new(EngineConfig {
            projects_root: dir.join("projects"),
            builds_root: dir.join("builds"),
            complete_logs_dir: None,
            abort_poll_interval: Duration::from_millis(5),
            reconcile: RetryPolicy {
                attempts: 3,
                delay: Duration::from_millis(1),
                attempt_timeout: Duration::from_secs(1),
            },
            ..EngineConfig::default()
        });
        for env in ["e1", "e2", "e3"] {
            let env_dir = config.environment_path(&config.projects_root.join("proj"), env);
            fs::create_dir_all(&env_dir).unwrap();
            fs::write(
                env_dir.join("properties.json"),
                format!(r#"{{"base_image": "python:3.9", "uuid": "{env}"}}"#),
            )
            .unwrap();
            fs::write(env_dir.join("setup_script.sh"), "true\n").unwrap();
        }

        let quiet = Arc::new(Quiet::default());
        let metrics = Arc::new(NoopMetrics);
        let deps = Collaborators {
            backend,
            logs: Arc::new(LogHub::default()),
            abort: Arc::new(AbortRegistry::new()),
            status: quiet.clone(),
            jobs: quiet.clone(),
            dangling: quiet,
            metrics: metrics.clone(),
        };
        let supervisor = TaskSupervisor::start().await;
        let reconciler = Reconciler::new(store, config.reconcile, supervisor.clone(), metrics);
        BuildPool::new(
            Arc::new(EnvironmentBuilder::new(config, deps, reconciler)),
            supervisor,
            capacity,
        )
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let gauge = Arc::new(Gauge::default());
        let pool = pool(dir.path(), gauge.clone(), Arc::new(Quiet::default()), 1).await;

        let mut handles = Vec::new();
        for (i, env) in ["e1", "e2", "e3"].into_iter().enumerate() {
            let task = BuildTask::new(format!("t{i}"), "p1", env);
            handles.push(pool.submit(task, PathBuf::from("proj")).await.unwrap());
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), TerminalStatus::Success);
        }
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn shutdown_drains_cleanups_and_rejects_new_work() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Quiet::default());
        let pool = pool(dir.path(), Arc::new(Gauge::default()), store.clone(), 2).await;

        let handle = pool
            .submit(BuildTask::new("t1", "p1", "e1"), PathBuf::from("proj"))
            .await
            .unwrap();
        pool.shutdown().await;

        assert_eq!(handle.await.unwrap().unwrap(), TerminalStatus::Success);
        assert_eq!(*store.0.lock().unwrap(), 1);
        assert!(matches!(
            pool.submit(BuildTask::new("t2", "p1", "e2"), PathBuf::from("proj"))
                .await,
            Err(BuildError::PoolClosed)
        ));
    }
}
