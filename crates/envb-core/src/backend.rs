use async_trait::async_trait;
use envb_model::BuildTask;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{context::BuildContext, error::BackendError};

/// Everything a backend needs to build one image.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub task: BuildTask,
    pub context: BuildContext,
    /// Reference the produced image is tagged with.
    pub image: String,
}

/// How the backend invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendExit {
    /// Process exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl BackendExit {
    pub const SUCCESS: BackendExit = BackendExit { code: Some(0) };

    #[inline]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Container-build backend.
///
/// Implementations push every line of combined output into `output` as it is produced and
/// stop as soon as `cancel` fires. A non-zero exit is a normal [`BackendExit`]; `Err` is
/// reserved for failures to run the backend at all.
#[async_trait]
pub trait BuildBackend: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn build(
        &self,
        request: BuildRequest,
        output: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<BackendExit, BackendError>;
}
