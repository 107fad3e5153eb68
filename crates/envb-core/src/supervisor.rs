//! Task supervision shared by the build pool and the artifact reconciler.
//!
//! Build attempts and cleanup loops are submitted to one `taskvisor` supervisor through its
//! controller; restart and backoff policies decide how often a task body runs.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use envb_model::TaskId;
use taskvisor::{
    BackoffPolicy, ControllerConfig, ControllerSpec, Event, EventKind, JitterPolicy,
    RestartPolicy, Subscribe, Supervisor, TaskRef, TaskSpec,
};
use tracing::{debug, info, trace, warn};

pub struct TaskSupervisor {
    sup: Arc<Supervisor>,
}

impl TaskSupervisor {
    /// Start the supervisor loop in the background and wait until it accepts tasks.
    pub async fn start() -> Arc<Self> {
        let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(EventLog)];
        let sup = Supervisor::builder(Default::default())
            .with_controller(ControllerConfig::default())
            .with_subscribers(subscribers)
            .build();

        let runner = Arc::clone(&sup);
        tokio::spawn(async move {
            let _ = runner.run(Vec::new()).await;
        });
        sup.wait_ready().await;

        info!(target: "envb.core.supervisor", "supervisor is ready");
        Arc::new(Self { sup })
    }

    /// Run `task` once.
    pub(crate) async fn submit_once(&self, task: TaskRef) -> Result<(), String> {
        self.submit(task, RestartPolicy::Never, BackoffPolicy::default())
            .await
    }

    /// Run `task` until it succeeds, `delay` apart. The task body decides when to stop failing.
    pub(crate) async fn submit_retrying(&self, task: TaskRef, delay: Duration) -> Result<(), String> {
        let backoff = BackoffPolicy {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
            ..BackoffPolicy::default()
        };
        self.submit(task, RestartPolicy::OnFailure, backoff).await
    }

    async fn submit(
        &self,
        task: TaskRef,
        restart: RestartPolicy,
        backoff: BackoffPolicy,
    ) -> Result<(), String> {
        let spec = TaskSpec::new(task, restart, backoff, None);
        debug!(target: "envb.core.supervisor", "submitting via controller");
        self.sup
            .submit(ControllerSpec::queue(spec))
            .await
            .map_err(|e| e.to_string())
    }
}

/// Unique task name for the supervisor registry.
///
/// `TaskFn` names are `'static`, so the string is leaked once per submitted task.
pub(crate) fn task_name(kind: &str, task_id: &TaskId) -> &'static str {
    Box::leak(format!("envb-{kind}-{task_id}").into_boxed_str())
}

/// Mirrors supervisor events into the engine's log targets.
struct EventLog;

#[async_trait]
impl Subscribe for EventLog {
    async fn on_event(&self, event: &Event) {
        let task = event.task.as_deref().unwrap_or("unknown");
        let reason = event.reason.as_deref().unwrap_or("");
        match event.kind {
            EventKind::TaskStarting => {
                trace!(target: "envb.core.supervisor", task, attempt = event.attempt.unwrap_or(0), "task starting")
            }
            EventKind::TaskFailed => {
                debug!(target: "envb.core.supervisor", task, attempt = event.attempt.unwrap_or(0), reason, "task attempt failed")
            }
            EventKind::BackoffScheduled => {
                trace!(target: "envb.core.supervisor", task, delay_ms = event.delay_ms.unwrap_or(0), "next attempt scheduled")
            }
            EventKind::TimeoutHit => {
                warn!(target: "envb.core.supervisor", task, "task exceeded its timeout")
            }
            EventKind::ActorDead => {
                warn!(target: "envb.core.supervisor", task, reason, "task terminated permanently")
            }
            EventKind::ControllerRejected => {
                warn!(target: "envb.core.supervisor", task, reason, "task rejected by controller")
            }
            EventKind::GraceExceeded => {
                warn!(target: "envb.core.supervisor", "tasks did not stop within the shutdown grace")
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "envb-event-log"
    }

    fn queue_capacity(&self) -> usize {
        1024
    }
}
