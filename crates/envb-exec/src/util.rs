use std::time::Duration;

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Child,
    sync::mpsc,
    task::JoinHandle,
    time,
};
use tracing::{debug, trace};

/// Forward every line of `reader` into `tx` until EOF or until the receiver is gone.
pub(crate) fn pump_lines<R>(reader: R, tx: mpsc::Sender<String>, stream: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        trace!(target: "envb.exec.proc", stream, "output receiver dropped");
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(target: "envb.exec.proc", stream, error = %e, "output stream failed");
                    break;
                }
            }
        }
    })
}

/// SIGTERM, then SIGKILL if the child is still alive after `grace`.
#[cfg(target_family = "unix")]
pub(crate) async fn kill_graceful(child: &mut Child, grace: Duration) -> std::io::Result<()> {
    if let Some(id) = child.id()
        && let Ok(pid) = libc::pid_t::try_from(id)
    {
        // SAFETY: plain kill(2) on our own child's pid.
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
        if time::timeout(grace, child.wait()).await.is_ok() {
            return Ok(());
        }
        debug!(target: "envb.exec.proc", pid, "child ignored SIGTERM; killing");
    }
    child.kill().await
}

#[cfg(target_family = "windows")]
pub(crate) async fn kill_graceful(child: &mut Child, _grace: Duration) -> std::io::Result<()> {
    child.kill().await
}
