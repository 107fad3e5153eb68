//! Streamed build runner.
//!
//! The backend invocation runs on its own task while this side tails its output, forwards
//! it to the log channel and polls the abort flag. The terminal status of the user portion
//! is taken from the sentinel lines, not from the backend's exit code alone.
mod route;

use std::{future::Future, time::Duration};

use envb_model::{LogEvent, Sentinels, TerminalStatus};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    abort::AbortPoll,
    backend::BackendExit,
    config::EngineConfig,
    error::{BackendError, RunError},
    logs::{CompleteLog, LogSink},
};
use route::Router;

pub struct StreamedRunner {
    sentinels: Sentinels,
    poll_interval: Duration,
    abort_grace: Duration,
    line_buffer: usize,
}

impl StreamedRunner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            sentinels: config.sentinels.clone(),
            poll_interval: config.abort_poll_interval,
            abort_grace: config.abort_grace,
            line_buffer: config.line_buffer.max(1),
        }
    }

    /// Run `build_fn` and stream its output to `sink` under the `identity` channel.
    ///
    /// `build_fn` receives the output sender and a cancellation token; it is spawned and runs
    /// in parallel with the tailing loop.
    pub async fn run<F, Fut>(
        &self,
        build_fn: F,
        identity: &str,
        sink: &dyn LogSink,
        abort: &dyn AbortPoll,
    ) -> Result<TerminalStatus, RunError>
    where
        F: FnOnce(mpsc::Sender<String>, CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<BackendExit, BackendError>> + Send + 'static,
    {
        self.run_archived(build_fn, identity, sink, abort, None)
            .await
    }

    /// Like [`StreamedRunner::run`], additionally archiving every raw line to `archive`.
    pub async fn run_archived<F, Fut>(
        &self,
        build_fn: F,
        identity: &str,
        sink: &dyn LogSink,
        abort: &dyn AbortPoll,
        archive: Option<CompleteLog>,
    ) -> Result<TerminalStatus, RunError>
    where
        F: FnOnce(mpsc::Sender<String>, CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<BackendExit, BackendError>> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel(self.line_buffer);
        let cancel = CancellationToken::new();
        let mut handle = tokio::spawn(build_fn(tx, cancel.clone()));

        let mut router = Router::new(identity, sink, &self.sentinels, archive);
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut exit = None;
        let mut lines_open = true;

        while exit.is_none() || lines_open {
            tokio::select! {
                biased;

                _ = ticker.tick() => {
                    if abort.poll_abort().await {
                        info!(target: "envb.core.runner", channel = identity, "abort observed; terminating backend");
                        cancel.cancel();
                        if exit.is_none() {
                            self.terminate(&mut handle, &mut rx).await;
                        }
                        router.finish().await;
                        return Ok(TerminalStatus::Aborted);
                    }
                }
                line = rx.recv(), if lines_open => match line {
                    Some(line) => router.route(line).await,
                    None => lines_open = false,
                },
                joined = &mut handle, if exit.is_none() => {
                    exit = Some(joined);
                }
            }
        }

        let outcome = router.outcome();
        router.finish().await;

        let exit = match exit {
            Some(Ok(res)) => res?,
            Some(Err(e)) => return Err(RunError::Panicked(e.to_string())),
            None => return Err(RunError::Panicked("backend task vanished".into())),
        };

        Ok(resolve(outcome, exit, identity))
    }

    /// Wait up to `abort_grace` for a cancelled backend to stop, then drop it and wait for that.
    ///
    /// Output produced meanwhile is discarded so the backend never blocks on a full channel.
    async fn terminate(
        &self,
        handle: &mut JoinHandle<Result<BackendExit, BackendError>>,
        rx: &mut mpsc::Receiver<String>,
    ) {
        let deadline = time::sleep(self.abort_grace);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut *handle => return,
                Some(_) = rx.recv() => {}
                _ = &mut deadline => {
                    warn!(target: "envb.core.runner", grace = ?self.abort_grace, "backend ignored cancellation; dropping it");
                    handle.abort();
                    let _ = (&mut *handle).await;
                    return;
                }
            }
        }
    }
}

fn resolve(outcome: Option<LogEvent>, exit: BackendExit, identity: &str) -> TerminalStatus {
    match outcome {
        Some(LogEvent::UserScriptFailed) => TerminalStatus::Failure,
        Some(LogEvent::UserScriptSucceeded) if exit.success() => TerminalStatus::Success,
        Some(LogEvent::UserScriptSucceeded) => {
            warn!(target: "envb.core.runner", channel = identity, code = ?exit.code, "backend failed after the user script succeeded");
            TerminalStatus::Failure
        }
        _ => {
            debug!(target: "envb.core.runner", channel = identity, code = ?exit.code, "backend finished without a sentinel");
            TerminalStatus::Failure
        }
    }
}

#[cfg(test)]
mod tests;
