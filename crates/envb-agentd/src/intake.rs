//! Line-delimited JSON requests read from stdin.
use std::path::PathBuf;

use envb_model::{BuildTask, TaskId};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum Wire {
    Abort {
        abort: String,
    },
    Build {
        #[serde(default)]
        task_id: Option<String>,
        project_id: String,
        environment_id: String,
        project_path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Build { task: BuildTask, project_path: PathBuf },
    Abort(TaskId),
}

/// Parse one request line. Blank lines yield `Ok(None)`.
///
/// Builds without a `task_id` get a fresh one, so every attempt is unique.
pub fn parse_line(line: &str) -> Result<Option<Request>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let request = match serde_json::from_str::<Wire>(line)? {
        Wire::Abort { abort } => Request::Abort(TaskId::new(abort)),
        Wire::Build {
            task_id,
            project_id,
            environment_id,
            project_path,
        } => {
            let task_id = task_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            Request::Build {
                task: BuildTask::new(task_id, project_id, environment_id),
                project_path,
            }
        }
    };
    Ok(Some(request))
}
