//! One build attempt, start to finish.
//!
//! Ordering per attempt: STARTED is reported first; the backend runs; the terminal status is
//! reported; cluster jobs are deleted; the detached artifact cleanup is spawned; the control
//! plane is told about dangling images last. Everything after the backend runs on every exit
//! path, and cleanup failures are logged without replacing the attempt's outcome.
use std::{path::Path, sync::Arc, time::Instant};

use envb_model::{BuildStatus, BuildTask, LabelFilter, TerminalStatus};
use tracing::{error, info, instrument, warn};

use crate::{
    abort::{AbortSignal, TaskAbort},
    backend::{BuildBackend, BuildRequest},
    config::EngineConfig,
    context::ContextPreparer,
    control::{ClusterJob, ClusterJobs, DanglingImages, StatusSink},
    error::BuildError,
    logs::{CompleteLog, LogSink},
    metrics::MetricsBackend,
    reconcile::Reconciler,
    runner::StreamedRunner,
};

/// External parties a build attempt talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn BuildBackend>,
    pub logs: Arc<dyn LogSink>,
    pub abort: Arc<dyn AbortSignal>,
    pub status: Arc<dyn StatusSink>,
    pub jobs: Arc<dyn ClusterJobs>,
    pub dangling: Arc<dyn DanglingImages>,
    pub metrics: Arc<dyn MetricsBackend>,
}

pub struct EnvironmentBuilder {
    config: Arc<EngineConfig>,
    preparer: ContextPreparer,
    runner: StreamedRunner,
    reconciler: Reconciler,
    deps: Collaborators,
}

impl EnvironmentBuilder {
    pub fn new(config: Arc<EngineConfig>, deps: Collaborators, reconciler: Reconciler) -> Self {
        Self {
            preparer: ContextPreparer::new(config.clone()),
            runner: StreamedRunner::new(&config),
            config,
            reconciler,
            deps,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Run one build attempt.
    ///
    /// Returns the terminal status of the attempt; `Err` carries the validation or infrastructure
    /// failure after FAILURE has been reported and cleanup has run.
    #[instrument(
        name = "build",
        skip_all,
        fields(task_id = %task.task_id, project_id = %task.project_id, environment_id = %task.environment_id)
    )]
    pub async fn build(
        &self,
        task: &BuildTask,
        project_path: &Path,
    ) -> Result<TerminalStatus, BuildError> {
        let started = Instant::now();
        self.deps.metrics.build_started();
        self.report(task, BuildStatus::Started).await;

        let outcome = self.attempt(task, project_path).await;
        let status = match &outcome {
            Ok(status) => *status,
            Err(e) if e.is_validation() => {
                warn!(target: "envb.core.attempt", error = %e, "environment rejected");
                TerminalStatus::Failure
            }
            Err(e) => {
                error!(target: "envb.core.attempt", error = %e, "build attempt failed");
                TerminalStatus::Failure
            }
        };

        self.report(task, status.into()).await;
        self.cleanup(task, status).await;

        let elapsed = started.elapsed();
        self.deps.metrics.build_finished(status, elapsed);
        info!(target: "envb.core.attempt", %status, elapsed_ms = elapsed.as_millis() as u64, "build attempt finished");

        outcome
    }

    async fn attempt(
        &self,
        task: &BuildTask,
        project_path: &Path,
    ) -> Result<TerminalStatus, BuildError> {
        let prepared = self.preparer.prepare(task, project_path).await?;

        let request = BuildRequest {
            task: task.clone(),
            context: prepared.context().clone(),
            image: self.config.image_reference(task),
        };
        let backend = self.deps.backend.clone();
        info!(target: "envb.core.attempt", backend = backend.name(), image = %request.image, "starting backend");

        let archive = self.open_archive(task).await;
        let abort = TaskAbort::new(self.deps.abort.as_ref(), &task.task_id);
        let channel = task.log_channel();

        let result = self
            .runner
            .run_archived(
                move |tx, cancel| async move { backend.build(request, tx, cancel).await },
                &channel,
                self.deps.logs.as_ref(),
                &abort,
                archive,
            )
            .await;

        // The guard would also remove it on drop; releasing here surfaces the error.
        let snapshot = prepared.context().snapshot_path.clone();
        if let Err(e) = prepared.release().await {
            warn!(target: "envb.core.attempt", path = %snapshot.display(), error = %e, "failed to remove snapshot");
        }

        Ok(result?)
    }

    async fn open_archive(&self, task: &BuildTask) -> Option<CompleteLog> {
        let path = self.config.complete_log_path(task)?;
        match CompleteLog::create(&path).await {
            Ok(log) => Some(log),
            Err(e) => {
                warn!(target: "envb.core.attempt", path = %path.display(), error = %e, "complete log unavailable");
                None
            }
        }
    }

    async fn report(&self, task: &BuildTask, status: BuildStatus) {
        if let Err(e) = self.deps.status.report(&task.task_id, status).await {
            warn!(target: "envb.core.attempt", %status, error = %e, "status update failed");
        }
    }

    async fn cleanup(&self, task: &BuildTask, status: TerminalStatus) {
        for job in ClusterJob::ALL {
            let name = job.name_for(&task.task_id);
            if let Err(e) = self.deps.jobs.delete_job(&name).await {
                warn!(target: "envb.core.attempt", job = %name, error = %e, "cluster job deletion failed");
            }
        }

        let aborted = status == TerminalStatus::Aborted
            || self.deps.abort.is_aborted(&task.task_id).await;
        let filter = LabelFilter::for_cleanup(&task.task_id, aborted);
        info!(target: "envb.core.attempt", aborted, filter = ?filter.to_strings(), "spawning artifact cleanup");
        drop(self.reconciler.spawn_detached(&task.task_id, filter).await);

        if let Err(e) = self
            .deps
            .dangling
            .notify(&task.project_id, &task.environment_id)
            .await
        {
            warn!(target: "envb.core.attempt", error = %e, "dangling image notification failed");
        }
    }
}
