use std::path::{Path, PathBuf};

use tokio::{
    fs::{self, File},
    io::{AsyncWriteExt, BufWriter},
};
use tracing::warn;

/// Operator-facing archive of the full backend output of one build.
///
/// Write failures disable the archive after a single warning; they never fail the build.
pub struct CompleteLog {
    path: PathBuf,
    out: Option<BufWriter<File>>,
}

impl CompleteLog {
    /// Create (or truncate) the archive at `path`.
    pub async fn create(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = File::create(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            out: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&mut self, line: &str) {
        let Some(out) = self.out.as_mut() else {
            return;
        };
        let res = async {
            out.write_all(line.as_bytes()).await?;
            out.write_all(b"\n").await
        }
        .await;
        if let Err(e) = res {
            warn!(target: "envb.core.logs", path = %self.path.display(), error = %e, "complete log disabled");
            self.out = None;
        }
    }

    pub async fn finish(mut self) {
        if let Some(mut out) = self.out.take()
            && let Err(e) = out.flush().await
        {
            warn!(target: "envb.core.logs", path = %self.path.display(), error = %e, "failed to flush complete log");
        }
    }
}
