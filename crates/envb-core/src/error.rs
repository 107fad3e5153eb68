use std::{io, path::PathBuf};

use envb_model::SpecViolation;
use thiserror::Error;

/// Validation and snapshot failures of the context preparer.
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("project path {0} does not exist")]
    MissingProject(PathBuf),
    #[error("environment path {0} does not exist")]
    MissingEnvironment(PathBuf),
    #[error("environment properties file {0} not found")]
    MissingSpec(PathBuf),
    #[error("environment setup script {0} not found")]
    MissingSetupScript(PathBuf),
    #[error("invalid environment properties: {0}")]
    InvalidSpec(String),
    #[error("snapshot io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PrepareError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PrepareError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` for errors raised before any snapshot I/O.
    pub fn is_validation(&self) -> bool {
        !matches!(self, PrepareError::Io { .. })
    }
}

impl From<SpecViolation> for PrepareError {
    fn from(v: SpecViolation) -> Self {
        PrepareError::InvalidSpec(v.to_string())
    }
}

/// Failure to drive the container backend itself (not a failing user script).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("backend error: {0}")]
    Other(String),
}

impl From<io::Error> for BackendError {
    fn from(e: io::Error) -> Self {
        BackendError::Io(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("backend invocation panicked: {0}")]
    Panicked(String),
}

/// Failure of a remote collaborator (status store, cluster, container engine, control plane).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Prepare(#[from] PrepareError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("build pool is closed")]
    PoolClosed,
    #[error("supervisor rejected build: {0}")]
    Supervisor(String),
}

impl BuildError {
    pub fn is_validation(&self) -> bool {
        matches!(self, BuildError::Prepare(e) if e.is_validation())
    }
}
