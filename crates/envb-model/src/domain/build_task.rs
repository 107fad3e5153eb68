use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ChannelId;

/// Identifier of one build attempt.
///
/// Unique per attempt, not per environment: two builds of the same environment always carry different ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a build attempt: `(task_id, project_id, environment_id)`.
///
/// The task queue owns the lifecycle of the attempt; the engine only publishes
/// transitions of it through the status reporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTask {
    pub task_id: TaskId,
    pub project_id: String,
    pub environment_id: String,
}

impl BuildTask {
    pub fn new(
        task_id: impl Into<TaskId>,
        project_id: impl Into<String>,
        environment_id: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            project_id: project_id.into(),
            environment_id: environment_id.into(),
        }
    }

    /// Channel the build output is published on.
    pub fn log_channel(&self) -> ChannelId {
        format!("{}-{}", self.project_id, self.environment_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_channel_is_keyed_by_project_and_environment() {
        let task = BuildTask::new("t1", "p1", "e1");
        assert_eq!(task.log_channel(), "p1-e1");

        let retry = BuildTask::new("t2", "p1", "e1");
        assert_eq!(task.log_channel(), retry.log_channel());
        assert_ne!(task.task_id, retry.task_id);
    }

    #[test]
    fn task_id_is_transparent_in_json() {
        let json = serde_json::to_string(&TaskId::from("abc")).unwrap();
        assert_eq!(json, r#""abc""#);
    }
}
