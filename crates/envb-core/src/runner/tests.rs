use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use envb_model::{DEFAULT_FAILURE_SENTINEL, DEFAULT_SUCCESS_SENTINEL, TerminalStatus};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::StreamedRunner;
use crate::{
    abort::AbortPoll,
    backend::BackendExit,
    config::EngineConfig,
    error::{BackendError, RunError, ServiceError},
    logs::{CompleteLog, LogSink},
};

#[derive(Default)]
struct Collect(Mutex<Vec<String>>);

impl Collect {
    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogSink for Collect {
    async fn publish(&self, channel: &str, line: &str) -> Result<(), ServiceError> {
        assert_eq!(channel, "p1-e1");
        self.0.lock().unwrap().push(line.to_string());
        Ok(())
    }
}

struct Unreachable;

#[async_trait]
impl LogSink for Unreachable {
    async fn publish(&self, _: &str, _: &str) -> Result<(), ServiceError> {
        Err(ServiceError::Unavailable("down".into()))
    }
}

#[derive(Default)]
struct Flag(Arc<AtomicBool>);

#[async_trait]
impl AbortPoll for Flag {
    async fn poll_abort(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn runner() -> StreamedRunner {
    let mut cfg = EngineConfig::default();
    cfg.abort_poll_interval = Duration::from_millis(10);
    cfg.abort_grace = Duration::from_millis(50);
    StreamedRunner::new(&cfg)
}

fn emit(
    lines: Vec<String>,
    code: i32,
) -> impl FnOnce(
    mpsc::Sender<String>,
    CancellationToken,
) -> std::pin::Pin<
    Box<dyn std::future::Future<Output = Result<BackendExit, BackendError>> + Send>,
> + Send {
    move |tx, _cancel| {
        Box::pin(async move {
            for line in lines {
                let _ = tx.send(line).await;
            }
            Ok(BackendExit { code: Some(code) })
        })
    }
}

fn owned(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| l.to_string()).collect()
}

#[tokio::test]
async fn success_sentinel_and_clean_exit_is_success() {
    let sink = Collect::default();
    let lines = owned(&["Step 1/9", "installing", DEFAULT_SUCCESS_SENTINEL]);

    let status = runner()
        .run(emit(lines.clone(), 0), "p1-e1", &sink, &Flag::default())
        .await
        .unwrap();

    assert_eq!(status, TerminalStatus::Success);
    assert_eq!(sink.lines(), lines);
}

#[tokio::test]
async fn failure_sentinel_wins_over_exit_code() {
    let sink = Collect::default();
    let lines = owned(&["pip install x", "No matching distribution", DEFAULT_FAILURE_SENTINEL]);

    let status = runner()
        .run(emit(lines, 0), "p1-e1", &sink, &Flag::default())
        .await
        .unwrap();

    assert_eq!(status, TerminalStatus::Failure);
}

#[tokio::test]
async fn success_sentinel_with_failed_backend_is_failure() {
    let sink = Collect::default();
    let lines = owned(&[DEFAULT_SUCCESS_SENTINEL, "exporting layers", "error: no space left"]);

    let status = runner()
        .run(emit(lines, 1), "p1-e1", &sink, &Flag::default())
        .await
        .unwrap();

    assert_eq!(status, TerminalStatus::Failure);
}

#[tokio::test]
async fn missing_sentinel_is_failure() {
    let sink = Collect::default();
    let status = runner()
        .run(emit(owned(&["pulling base image"]), 0), "p1-e1", &sink, &Flag::default())
        .await
        .unwrap();

    assert_eq!(status, TerminalStatus::Failure);
}

#[tokio::test]
async fn lines_after_sentinel_are_archived_not_published() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t1.txt");
    let archive = CompleteLog::create(&path).await.unwrap();
    let sink = Collect::default();

    let lines = owned(&["installing", DEFAULT_SUCCESS_SENTINEL, "exporting layers", "writing image"]);
    let status = runner()
        .run_archived(emit(lines, 0), "p1-e1", &sink, &Flag::default(), Some(archive))
        .await
        .unwrap();

    assert_eq!(status, TerminalStatus::Success);
    assert_eq!(sink.lines(), owned(&["installing", DEFAULT_SUCCESS_SENTINEL]));

    let archived = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        archived,
        format!("installing\n{DEFAULT_SUCCESS_SENTINEL}\nexporting layers\nwriting image\n")
    );
}

#[tokio::test]
async fn unavailable_log_channel_does_not_fail_build() {
    let lines = owned(&["installing", DEFAULT_SUCCESS_SENTINEL]);
    let status = runner()
        .run(emit(lines, 0), "p1-e1", &Unreachable, &Flag::default())
        .await
        .unwrap();

    assert_eq!(status, TerminalStatus::Success);
}

#[tokio::test]
async fn abort_mid_build_cancels_backend() {
    let sink = Arc::new(Collect::default());
    let flag = Flag::default();
    let raised = flag.0.clone();
    let cancelled = Arc::new(AtomicBool::new(false));
    let seen = cancelled.clone();

    let build = move |tx: mpsc::Sender<String>, cancel: CancellationToken| async move {
        for i in 0..3 {
            let _ = tx.send(format!("line {i}")).await;
        }
        raised.store(true, Ordering::SeqCst);
        cancel.cancelled().await;
        seen.store(true, Ordering::SeqCst);
        Ok::<_, BackendError>(BackendExit { code: None })
    };

    let status = runner()
        .run(build, "p1-e1", sink.as_ref(), &flag)
        .await
        .unwrap();

    assert_eq!(status, TerminalStatus::Aborted);
    assert!(sink.lines().len() <= 3);
    assert!(cancelled.load(Ordering::SeqCst));
}

/// Sets the flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn backend_ignoring_cancellation_is_dropped_before_aborted_is_returned() {
    let flag = Flag::default();
    let raised = flag.0.clone();
    let dropped = Arc::new(AtomicBool::new(false));
    let guard = DropFlag(dropped.clone());

    let build = move |tx: mpsc::Sender<String>, _cancel: CancellationToken| async move {
        let _guard = guard;
        raised.store(true, Ordering::SeqCst);
        for i in 0..3 {
            let _ = tx.send(format!("still building {i}")).await;
        }
        std::future::pending::<()>().await;
        Ok::<_, BackendError>(BackendExit::SUCCESS)
    };

    let status = runner()
        .run(build, "p1-e1", &Collect::default(), &flag)
        .await
        .unwrap();

    assert_eq!(status, TerminalStatus::Aborted);
    assert!(dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn backend_error_is_propagated() {
    let build = |_tx: mpsc::Sender<String>, _cancel: CancellationToken| async {
        Err::<BackendExit, _>(BackendError::Spawn("docker: not found".into()))
    };

    let err = runner()
        .run(build, "p1-e1", &Collect::default(), &Flag::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Backend(BackendError::Spawn(_))));
}
