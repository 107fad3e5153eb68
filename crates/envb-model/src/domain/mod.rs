mod build_task;
pub use build_task::{BuildTask, TaskId};

mod build_status;
pub use build_status::{BuildStatus, TerminalStatus};

mod labels;
pub use labels::{
    BuildLabels, Label, LabelFilter, LABEL_ENVIRONMENT_ID, LABEL_INTERMEDIATE, LABEL_PROJECT_ID,
    LABEL_TASK_ID,
};

mod environment;
pub use environment::{EnvironmentProperties, EnvironmentSpec, SpecViolation};

mod log_event;
pub use log_event::{DEFAULT_FAILURE_SENTINEL, DEFAULT_SUCCESS_SENTINEL, LogEvent, Sentinels};

/// Name of a log channel, `"{project_id}-{environment_id}"`.
pub type ChannelId = String;
