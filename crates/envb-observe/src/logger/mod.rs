//! Process-wide `tracing` subscriber for the build engine.
//!
//! Components log under `envb.<crate>.<component>` targets; build attempts run inside a
//! `build` span carrying the task, project and environment ids, which every output format
//! attaches to the records emitted within it.
mod config;
mod error;
mod format;
mod install;
mod level;

pub use config::{LoggerConfig, QUIET_TARGETS};
pub use error::LoggerError;
pub use format::LoggerFormat;
pub use level::LoggerLevel;

/// Install the global subscriber described by `cfg`.
///
/// Can succeed only once per process; later calls return [`LoggerError::AlreadyInstalled`].
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    install::install(cfg)
}
