//! Remote collaborators of a build attempt.
use async_trait::async_trait;
use envb_model::{BuildStatus, LabelFilter, TaskId};

use crate::error::ServiceError;

/// Remote store of build lifecycle transitions.
///
/// Updates are idempotent; implementations do not retry.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn report(&self, task_id: &TaskId, status: BuildStatus) -> Result<(), ServiceError>;
}

/// Control-plane trigger that evaluates superseded images of an environment.
#[async_trait]
pub trait DanglingImages: Send + Sync {
    async fn notify(&self, project_id: &str, environment_id: &str) -> Result<(), ServiceError>;
}

/// Orchestrator-level job objects created to run a build.
#[async_trait]
pub trait ClusterJobs: Send + Sync {
    async fn delete_job(&self, name: &str) -> Result<(), ServiceError>;
}

/// Container artifacts (stopped containers, images, layers) addressable by label.
#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    /// Delete everything matching `filter`.
    async fn delete_matching(&self, filter: &LabelFilter) -> Result<Removal, ServiceError>;
}

/// What one deletion pass removed.
///
/// Containers and images are counted apart: a pruned container says nothing about whether
/// the image it was building is visible yet.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Removal {
    pub containers: usize,
    pub images: usize,
}

impl Removal {
    pub fn images(images: usize) -> Self {
        Self {
            containers: 0,
            images,
        }
    }
}

/// The two cluster jobs every build attempt creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterJob {
    ImageCache,
    ImageBuild,
}

impl ClusterJob {
    /// Deletion order used after a build.
    pub const ALL: [ClusterJob; 2] = [ClusterJob::ImageCache, ClusterJob::ImageBuild];

    pub fn name_for(&self, task_id: &TaskId) -> String {
        match self {
            ClusterJob::ImageCache => format!("image-cache-task-{task_id}"),
            ClusterJob::ImageBuild => format!("image-build-task-{task_id}"),
        }
    }
}
