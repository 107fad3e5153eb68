use std::io::IsTerminal;

use crate::logger::{format::LoggerFormat, level::LoggerLevel};

/// Dependency targets that are only interesting when something is wrong.
pub const QUIET_TARGETS: &[&str] = &["hyper_util", "hyper", "reqwest", "h2", "taskvisor"];

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    pub level: LoggerLevel,
    pub with_targets: bool,
    pub use_color: bool,
    /// Log a record with the elapsed time whenever a span (e.g. one build attempt) closes.
    pub span_timings: bool,
    /// Cap [`QUIET_TARGETS`] at `warn` unless `level` names them itself.
    pub quiet_dependencies: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::default(),
            level: LoggerLevel::default(),
            with_targets: true,
            use_color: cfg!(test) || std::io::stdout().is_terminal(),
            span_timings: false,
            quiet_dependencies: true,
        }
    }
}
