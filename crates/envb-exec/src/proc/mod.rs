use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use envb_core::{BackendError, BackendExit, BuildBackend, BuildRequest};
use tokio::{process::Command, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    error::ExecError,
    util::{kill_graceful, pump_lines},
};

/// How the build program is invoked.
///
/// Arguments may contain `{context}`, `{descriptor}`, `{image}` and `{task_id}`; they are
/// substituted per build.
#[derive(Clone, Debug)]
pub struct CommandConfig {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Time between SIGTERM and SIGKILL on cancellation.
    pub grace: Duration,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            args: ["build", "--file", "{descriptor}", "--tag", "{image}", "{context}"]
                .into_iter()
                .map(String::from)
                .collect(),
            env: Vec::new(),
            grace: Duration::from_secs(5),
        }
    }
}

impl CommandConfig {
    /// Arguments with placeholders resolved for `request`.
    pub fn render_args(&self, request: &BuildRequest) -> Vec<String> {
        let context = request.context.snapshot_path.display().to_string();
        let descriptor = request.context.descriptor_file().display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{context}", &context)
                    .replace("{descriptor}", &descriptor)
                    .replace("{image}", &request.image)
                    .replace("{task_id}", request.task.task_id.as_str())
            })
            .collect()
    }
}

/// [`BuildBackend`] running a local program; stdout and stderr are merged line by line.
pub struct CommandBackend {
    name: &'static str,
    cfg: CommandConfig,
}

impl CommandBackend {
    pub fn new(cfg: CommandConfig) -> Self {
        Self { name: "command", cfg }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

#[async_trait]
impl BuildBackend for CommandBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn build(
        &self,
        request: BuildRequest,
        output: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<BackendExit, BackendError> {
        if self.cfg.program.is_empty() {
            return Err(ExecError::MissingProgram.into());
        }

        let args = self.cfg.render_args(&request);
        trace!(target: "envb.exec.proc", program = %self.cfg.program, ?args, "spawn");

        let mut cmd = Command::new(&self.cfg.program);
        cmd.args(&args)
            .current_dir(&request.context.snapshot_path)
            .envs(self.cfg.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::Spawn(format!("{}: {e}", self.cfg.program)))?;

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(pump_lines(stdout, output.clone(), "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(pump_lines(stderr, output.clone(), "stderr"));
        }
        drop(output);

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(ExecError::from)?;
                // Collect the output tail.
                for reader in readers {
                    let _ = reader.await;
                }
                debug!(target: "envb.exec.proc", code = ?status.code(), "build program exited");
                Ok(BackendExit { code: status.code() })
            }
            _ = cancel.cancelled() => {
                info!(target: "envb.exec.proc", task_id = %request.task.task_id, "cancelled; stopping build program");
                if let Err(e) = kill_graceful(&mut child, self.cfg.grace).await {
                    warn!(target: "envb.exec.proc", error = %e, "failed to kill build program");
                }
                for reader in readers {
                    reader.abort();
                }
                Ok(BackendExit { code: None })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use envb_core::BuildContext;
    use envb_model::{BuildLabels, BuildTask};

    use super::*;

    fn request(dir: &std::path::Path) -> BuildRequest {
        let task = BuildTask::new("t1", "p1", "e1");
        BuildRequest {
            context: BuildContext {
                snapshot_path: dir.to_path_buf(),
                base_image: "python:3.9".into(),
                descriptor_path: PathBuf::from("Dockerfile"),
                labels: BuildLabels::new(&task.task_id, "p1", "e1"),
            },
            image: "orchest-env-p1-e1:t1".into(),
            task,
        }
    }

    fn sh(script: &str) -> CommandBackend {
        CommandBackend::new(CommandConfig {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            env: vec![("ENVB_GREETING".into(), "hello".into())],
            grace: Duration::from_millis(100),
        })
    }

    async fn collect(mut rx: mpsc::Receiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn placeholders_are_rendered() {
        let dir = PathBuf::from("/builds/t1");
        let args = CommandConfig::default().render_args(&request(&dir));
        assert_eq!(
            args,
            vec![
                "build",
                "--file",
                "/builds/t1/Dockerfile",
                "--tag",
                "orchest-env-p1-e1:t1",
                "/builds/t1"
            ]
        );
    }

    #[tokio::test]
    async fn merges_stdout_and_stderr_and_reports_exit_code() {
        let dir = std::env::temp_dir();
        let (tx, rx) = mpsc::channel(16);
        let backend = sh("echo \"$ENVB_GREETING\"; echo oops >&2; exit 3");

        let exit = backend
            .build(request(&dir), tx, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(exit, BackendExit { code: Some(3) });
        let mut lines = collect(rx).await;
        lines.sort();
        assert_eq!(lines, vec!["hello", "oops"]);
    }

    #[tokio::test]
    async fn cancellation_stops_the_program() {
        let dir = std::env::temp_dir();
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let backend = sh("echo started; sleep 30");

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let exit = backend.build(request(&dir), tx, cancel).await.unwrap();

        assert!(!exit.success());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let backend = CommandBackend::new(CommandConfig {
            program: "envb-definitely-not-installed".into(),
            ..CommandConfig::default()
        });
        let (tx, _rx) = mpsc::channel(1);

        let err = backend
            .build(request(&std::env::temp_dir()), tx, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Spawn(_)));
    }
}
