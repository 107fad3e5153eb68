mod config;
mod http;
mod intake;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use envb_core::{
    AbortRegistry, BuildPool, Collaborators, EngineConfig, EnvironmentBuilder, LogHub, Reconciler,
    TaskSupervisor,
};
use envb_exec::CommandBackend;
use envb_model::{BuildTask, TaskId};
use envb_observe::logger_init;
use envb_prometheus::PrometheusMetrics;
use envb_remote::{DockerArtifactStore, HttpDanglingNotifier, HttpStatusReporter, KubeJobClient};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use crate::{
    config::AgentConfig,
    intake::{Request, parse_line},
};

struct Agent {
    pool: BuildPool,
    hub: LogHub,
    abort: AbortRegistry,
    watchers: TaskTracker,
}

impl Agent {
    async fn submit(&self, task: BuildTask, project_path: PathBuf) {
        let channel = task.log_channel();
        let mut lines = self.hub.subscribe(&channel);

        self.abort.track(task.task_id.clone());
        let handle = match self.pool.submit(task.clone(), project_path).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(target: "envb.agentd", task_id = %task.task_id, error = %e, "build not accepted");
                self.abort.clear(&task.task_id);
                return;
            }
        };
        info!(target: "envb.agentd", task_id = %task.task_id, %channel, "build accepted");

        let echo = tokio::spawn(async move {
            loop {
                match lines.recv().await {
                    Ok(line) => eprintln!("[{channel}] {line}"),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "envb.agentd", skipped, "build log echo fell behind")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let (hub, abort) = (self.hub.clone(), self.abort.clone());
        self.watchers.spawn(async move {
            match handle.await {
                Ok(Ok(status)) => {
                    info!(target: "envb.agentd", task_id = %task.task_id, %status, "build finished")
                }
                Ok(Err(e)) => {
                    warn!(target: "envb.agentd", task_id = %task.task_id, error = %e, "build failed")
                }
                Err(_) => {
                    error!(target: "envb.agentd", task_id = %task.task_id, "build attempt ended without a result")
                }
            }
            echo.abort();
            abort.clear(&task.task_id);
            hub.prune();
        });
    }

    fn abort(&self, task_id: TaskId) {
        if self.abort.abort(task_id.clone()) {
            info!(target: "envb.agentd", %task_id, "abort requested");
        } else {
            debug!(target: "envb.agentd", %task_id, "abort ignored; task not in flight or already aborted");
        }
    }

    async fn shutdown(&self) {
        self.pool.shutdown().await;
        self.watchers.close();
        self.watchers.wait().await;
    }
}

async fn wire(cfg: &AgentConfig, metrics: Arc<PrometheusMetrics>) -> anyhow::Result<Agent> {
    let engine: Arc<EngineConfig> = Arc::new(cfg.engine.clone());
    let hub = LogHub::default();
    let abort = AbortRegistry::new();

    let deps = Collaborators {
        backend: Arc::new(CommandBackend::new(cfg.command.clone()).with_name("docker")),
        logs: Arc::new(hub.clone()),
        abort: Arc::new(abort.clone()),
        status: Arc::new(HttpStatusReporter::new(&cfg.remote)?),
        jobs: Arc::new(
            KubeJobClient::new(&cfg.remote)
                .await
                .context("cluster client")?,
        ),
        dangling: Arc::new(HttpDanglingNotifier::new(&cfg.remote)?),
        metrics: metrics.clone(),
    };
    let supervisor = TaskSupervisor::start().await;
    let reconciler = Reconciler::new(
        Arc::new(DockerArtifactStore::new(&cfg.remote)?),
        engine.reconcile,
        supervisor.clone(),
        metrics,
    );

    let builder = Arc::new(EnvironmentBuilder::new(engine.clone(), deps, reconciler));
    Ok(Agent {
        pool: BuildPool::new(builder, supervisor, engine.build_concurrency),
        hub,
        abort,
        watchers: TaskTracker::new(),
    })
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(target: "envb.agentd", error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!(target: "envb.agentd", error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!(target: "envb.agentd", "interrupted"),
        _ = terminate => info!(target: "envb.agentd", "terminated"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AgentConfig::from_env()?;
    logger_init(&cfg.logger)?;
    info!(target: "envb.agentd", "logger initialized");

    let metrics = Arc::new(PrometheusMetrics::new()?);
    let agent = wire(&cfg, metrics.clone()).await?;
    info!(
        target: "envb.agentd",
        concurrency = agent.pool.capacity(),
        builds_root = %cfg.engine.builds_root.display(),
        api = %cfg.remote.api_address,
        "build agent ready"
    );

    let stop = CancellationToken::new();
    let server = cfg.metrics_addr.map(|addr| {
        let (metrics, stop) = (metrics.clone(), stop.clone());
        tokio::spawn(async move {
            if let Err(e) = http::serve_metrics(addr, metrics, stop).await {
                error!(target: "envb.agentd.http", error = %e, "metrics endpoint failed");
            }
        })
    });

    let signal = shutdown_signal();
    tokio::pin!(signal);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_line(&line) {
                    Ok(Some(Request::Build { task, project_path })) => agent.submit(task, project_path).await,
                    Ok(Some(Request::Abort(task_id))) => agent.abort(task_id),
                    Ok(None) => {}
                    Err(e) => warn!(target: "envb.agentd", error = %e, "malformed request"),
                },
                Ok(None) => {
                    info!(target: "envb.agentd", "input closed");
                    break;
                }
                Err(e) => {
                    error!(target: "envb.agentd", error = %e, "failed to read requests");
                    break;
                }
            },
            _ = &mut signal => break,
        }
    }

    info!(target: "envb.agentd", "draining builds and cleanups");
    agent.shutdown().await;

    stop.cancel();
    if let Some(server) = server {
        let _ = server.await;
    }
    info!(target: "envb.agentd", "shut down");
    Ok(())
}
