use std::fmt;

use serde::{Deserialize, Serialize};

/// Externally visible lifecycle state of a build attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    /// The attempt has been picked up by a worker.
    Started,
    /// The user script ran to completion and the image was produced.
    Success,
    /// Validation, user script or infrastructure failure.
    Failure,
    /// The attempt was cancelled through the abort flag.
    Aborted,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Started => "STARTED",
            BuildStatus::Success => "SUCCESS",
            BuildStatus::Failure => "FAILURE",
            BuildStatus::Aborted => "ABORTED",
        }
    }

    /// Returns `true` if the status ends the attempt.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BuildStatus::Started)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the streamed build runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalStatus {
    Success,
    Failure,
    Aborted,
}

impl TerminalStatus {
    pub fn as_str(&self) -> &'static str {
        BuildStatus::from(*self).as_str()
    }
}

impl From<TerminalStatus> for BuildStatus {
    fn from(value: TerminalStatus) -> Self {
        match value {
            TerminalStatus::Success => BuildStatus::Success,
            TerminalStatus::Failure => BuildStatus::Failure,
            TerminalStatus::Aborted => BuildStatus::Aborted,
        }
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
