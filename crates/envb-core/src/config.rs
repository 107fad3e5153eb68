use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use envb_model::{BuildTask, Sentinels};

/// Bounded, fixed-delay retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub attempts: u32,
    /// Sleep before every attempt.
    pub delay: Duration,
    /// Upper bound for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Engine configuration, built once at process start and shared by every component.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory project paths are resolved against.
    pub projects_root: PathBuf,
    /// Directory holding one snapshot per build attempt.
    pub builds_root: PathBuf,
    /// Where full backend output is archived; `None` disables archiving.
    pub complete_logs_dir: Option<PathBuf>,

    /// Project metadata directory (hidden from produced images).
    pub metadata_dir: String,
    /// Subdirectory of `metadata_dir` containing one directory per environment.
    pub environments_dir: String,
    pub properties_file: String,
    pub setup_script_file: String,

    /// Where the project is copied inside the produced image.
    pub image_workdir: String,
    /// Image repository, with `{project_id}` and `{environment_id}` placeholders.
    pub image_name_template: String,

    pub sentinels: Sentinels,
    /// How often the runner asks whether the build was aborted.
    pub abort_poll_interval: Duration,
    /// How long an aborted backend gets to stop before it is dropped.
    ///
    /// Cleanup of an aborted attempt starts only after the backend stopped or was dropped.
    pub abort_grace: Duration,
    /// Capacity of the backend output channel (lines).
    pub line_buffer: usize,

    /// Artifact deletion schedule after a build.
    pub reconcile: RetryPolicy,
    /// Number of build attempts allowed to run at the same time.
    pub build_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            projects_root: PathBuf::from("/userdir/projects"),
            builds_root: PathBuf::from("/userdir/.orchest/env-builds"),
            complete_logs_dir: Some(PathBuf::from("/tmp/environment_builds_logs")),
            metadata_dir: ".orchest".to_string(),
            environments_dir: "environments".to_string(),
            properties_file: "properties.json".to_string(),
            setup_script_file: "setup_script.sh".to_string(),
            image_workdir: "/project-dir".to_string(),
            image_name_template: "orchest-env-{project_id}-{environment_id}".to_string(),
            sentinels: Sentinels::default(),
            abort_poll_interval: Duration::from_millis(250),
            abort_grace: Duration::from_secs(10),
            line_buffer: 1024,
            reconcile: RetryPolicy::default(),
            build_concurrency: 1,
        }
    }
}

impl EngineConfig {
    /// Absolute project directory for a path relative to `projects_root`.
    pub fn project_path(&self, project_path: &Path) -> PathBuf {
        self.projects_root.join(project_path)
    }

    /// Environment directory inside a project tree.
    pub fn environment_path(&self, project_root: &Path, environment_id: &str) -> PathBuf {
        project_root
            .join(&self.metadata_dir)
            .join(&self.environments_dir)
            .join(environment_id)
    }

    /// Snapshot directory owned by one build attempt.
    pub fn snapshot_path(&self, task: &BuildTask) -> PathBuf {
        self.builds_root.join(task.task_id.as_str())
    }

    /// Image repository name of an environment.
    pub fn image_name(&self, task: &BuildTask) -> String {
        self.image_name_template
            .replace("{project_id}", &task.project_id)
            .replace("{environment_id}", &task.environment_id)
    }

    /// Reference the backend tags its output with.
    ///
    /// Tagged with the task id so two attempts of one environment never share an artifact name.
    pub fn image_reference(&self, task: &BuildTask) -> String {
        format!("{}:{}", self.image_name(task), task.task_id)
    }

    pub fn complete_log_path(&self, task: &BuildTask) -> Option<PathBuf> {
        self.complete_logs_dir
            .as_ref()
            .map(|dir| dir.join(self.image_name(task)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_names_follow_the_template() {
        let cfg = EngineConfig::default();
        let task = BuildTask::new("t1", "p1", "e1");
        assert_eq!(cfg.image_name(&task), "orchest-env-p1-e1");
        assert_eq!(cfg.image_reference(&task), "orchest-env-p1-e1:t1");
        assert_eq!(
            cfg.complete_log_path(&task),
            Some(PathBuf::from("/tmp/environment_builds_logs/orchest-env-p1-e1"))
        );
    }

    #[test]
    fn paths_are_derived_from_roots() {
        let cfg = EngineConfig::default();
        let task = BuildTask::new("t1", "p1", "e1");
        assert_eq!(
            cfg.snapshot_path(&task),
            PathBuf::from("/userdir/.orchest/env-builds/t1")
        );
        let project = cfg.project_path(Path::new("my-project"));
        assert_eq!(project, PathBuf::from("/userdir/projects/my-project"));
        assert_eq!(
            cfg.environment_path(&project, "e1"),
            PathBuf::from("/userdir/projects/my-project/.orchest/environments/e1")
        );
    }
}
