//! Build context preparation.
//!
//! All validation happens before any snapshot I/O; a rejected environment never leaves a
//! directory behind. Once created, the snapshot is owned by a [`PreparedContext`] and removed
//! when it is released or dropped.
mod snapshot;

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use envb_model::{BuildLabels, BuildTask, EnvironmentProperties, EnvironmentSpec};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::EngineConfig,
    descriptor::{BuildDescriptor, DescriptorInput, IGNORE_FILE},
    error::PrepareError,
};

/// File names reserved inside a snapshot, namespaced by project and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedNames {
    pub descriptor: String,
    pub script: String,
}

impl ReservedNames {
    pub fn for_build(task: &BuildTask) -> Self {
        let (p, e) = (&task.project_id, &task.environment_id);
        Self {
            descriptor: format!(".orchest-reserved-env-dockerfile-{p}-{e}"),
            script: format!(".orchest-reserved-env-setup-script-{p}-{e}.sh"),
        }
    }
}

/// A prepared build context.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub snapshot_path: PathBuf,
    pub base_image: String,
    /// Recipe path, relative to `snapshot_path`.
    pub descriptor_path: PathBuf,
    pub labels: BuildLabels,
}

impl BuildContext {
    pub fn descriptor_file(&self) -> PathBuf {
        self.snapshot_path.join(&self.descriptor_path)
    }
}

/// [`BuildContext`] plus ownership of its snapshot directory.
#[derive(Debug)]
pub struct PreparedContext {
    context: BuildContext,
    guard: SnapshotGuard,
}

impl PreparedContext {
    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    /// Remove the snapshot directory now.
    pub async fn release(mut self) -> io::Result<()> {
        let path = self.guard.disarm();
        remove_snapshot(&path).await
    }
}

/// Removes the snapshot when dropped, unless it was released explicitly.
#[derive(Debug)]
struct SnapshotGuard {
    path: Option<PathBuf>,
}

impl SnapshotGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn disarm(&mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take()
            && let Err(e) = std::fs::remove_dir_all(&path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(target: "envb.core.context", path = %path.display(), error = %e, "failed to remove snapshot");
        }
    }
}

async fn remove_snapshot(path: &Path) -> io::Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

pub struct ContextPreparer {
    config: Arc<EngineConfig>,
}

impl ContextPreparer {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Validate the environment, snapshot the project and write the recipe into the snapshot.
    ///
    /// `project_path` is resolved against the configured projects root.
    #[instrument(level = "debug", skip(self, task), fields(task_id = %task.task_id))]
    pub async fn prepare(
        &self,
        task: &BuildTask,
        project_path: &Path,
    ) -> Result<PreparedContext, PrepareError> {
        let project_root = self.config.project_path(project_path);
        let (spec, script_source) = self.validate(task, &project_root).await?;

        let names = ReservedNames::for_build(task);
        let snapshot_path = self.config.snapshot_path(task);

        tokio::fs::create_dir_all(&self.config.builds_root)
            .await
            .map_err(|e| PrepareError::io(&self.config.builds_root, e))?;
        if tokio::fs::try_exists(&snapshot_path).await.unwrap_or(false) {
            debug!(target: "envb.core.context", path = %snapshot_path.display(), "removing stale snapshot");
            remove_snapshot(&snapshot_path)
                .await
                .map_err(|e| PrepareError::io(&snapshot_path, e))?;
        }

        let guard = SnapshotGuard::new(snapshot_path.clone());
        let copied = {
            let (src, dst) = (project_root.clone(), snapshot_path.clone());
            tokio::task::spawn_blocking(move || {
                let rules = snapshot::IgnoreRules::load(&src)?;
                snapshot::copy_tree(&src, &dst, &rules)
            })
            .await
            .map_err(|e| PrepareError::io(&snapshot_path, io::Error::other(e)))?
            .map_err(|e| PrepareError::io(&snapshot_path, e))?
        };

        let descriptor = BuildDescriptor::generate(
            &DescriptorInput {
                base_image: &spec.base_image,
                task,
                workdir: &self.config.image_workdir,
                script: &names.script,
                descriptor: &names.descriptor,
                metadata_dir: &self.config.metadata_dir,
            },
            &self.config.sentinels,
        );

        write(&snapshot_path.join(&names.descriptor), descriptor.render()).await?;
        let script_target = snapshot_path.join(&names.script);
        tokio::fs::copy(&script_source, &script_target)
            .await
            .map_err(|e| PrepareError::io(&script_target, e))?;
        write(&snapshot_path.join(IGNORE_FILE), descriptor.render_ignore()).await?;

        info!(
            target: "envb.core.context",
            snapshot = %snapshot_path.display(),
            base_image = %spec.base_image,
            files = copied,
            "build context prepared"
        );

        Ok(PreparedContext {
            context: BuildContext {
                snapshot_path,
                base_image: spec.base_image,
                descriptor_path: PathBuf::from(names.descriptor),
                labels: BuildLabels::new(&task.task_id, &task.project_id, &task.environment_id),
            },
            guard,
        })
    }

    /// Returns the validated spec and the path of the setup script.
    async fn validate(
        &self,
        task: &BuildTask,
        project_root: &Path,
    ) -> Result<(EnvironmentSpec, PathBuf), PrepareError> {
        if !is_dir(project_root).await {
            return Err(PrepareError::MissingProject(project_root.to_path_buf()));
        }

        let env_dir = self
            .config
            .environment_path(project_root, &task.environment_id);
        if !is_dir(&env_dir).await {
            return Err(PrepareError::MissingEnvironment(env_dir));
        }

        let properties = env_dir.join(&self.config.properties_file);
        if !is_file(&properties).await {
            return Err(PrepareError::MissingSpec(properties));
        }

        let script = env_dir.join(&self.config.setup_script_file);
        if !is_file(&script).await {
            return Err(PrepareError::MissingSetupScript(script));
        }

        let raw = tokio::fs::read_to_string(&properties)
            .await
            .map_err(|e| PrepareError::InvalidSpec(format!("{}: {e}", properties.display())))?;
        let props: EnvironmentProperties = serde_json::from_str(&raw)
            .map_err(|e| PrepareError::InvalidSpec(format!("{}: {e}", properties.display())))?;
        let spec = props.validate(&task.environment_id)?;

        Ok((spec, script))
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn write(path: &Path, content: String) -> Result<(), PrepareError> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| PrepareError::io(path, e))
}
