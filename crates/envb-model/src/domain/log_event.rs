use serde::{Deserialize, Serialize};

/// Marker printed by the build recipe once the user script exited with status 0.
pub const DEFAULT_SUCCESS_SENTINEL: &str = "_ORCHEST_RESERVED_LOG_TERMINATION_FLAG_";
/// Marker printed by the build recipe when the user script failed.
pub const DEFAULT_FAILURE_SENTINEL: &str = "_ORCHEST_RESERVED_ERROR_FLAG_";

/// The two control strings embedded in the otherwise unstructured build output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentinels {
    pub success: String,
    pub failure: String,
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            success: DEFAULT_SUCCESS_SENTINEL.to_string(),
            failure: DEFAULT_FAILURE_SENTINEL.to_string(),
        }
    }
}

impl Sentinels {
    /// Classify one raw output line.
    ///
    /// Backends may prefix step output (`#7 1.25 ...`), so a sentinel only has to end the line.
    pub fn classify(&self, line: &str) -> LogEvent {
        let trimmed = line.trim_end();
        if trimmed.ends_with(self.failure.as_str()) {
            LogEvent::UserScriptFailed
        } else if trimmed.ends_with(self.success.as_str()) {
            LogEvent::UserScriptSucceeded
        } else {
            LogEvent::Info
        }
    }
}

/// What a line of build output means to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvent {
    /// Plain output.
    Info,
    UserScriptSucceeded,
    UserScriptFailed,
}

impl LogEvent {
    #[inline]
    pub fn is_sentinel(&self) -> bool {
        !matches!(self, LogEvent::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_raw_and_prefixed_sentinels() {
        let s = Sentinels::default();
        assert_eq!(s.classify(DEFAULT_SUCCESS_SENTINEL), LogEvent::UserScriptSucceeded);
        assert_eq!(
            s.classify(&format!("#9 12.01 {DEFAULT_FAILURE_SENTINEL}\r\n")),
            LogEvent::UserScriptFailed
        );
        assert_eq!(s.classify("Collecting numpy"), LogEvent::Info);
    }

    #[test]
    fn sentinel_inside_a_command_echo_is_plain_output() {
        let s = Sentinels::default();
        let echo = format!("RUN bash x.sh && echo \"{DEFAULT_SUCCESS_SENTINEL}\"; exit $status");
        assert_eq!(s.classify(&echo), LogEvent::Info);
        assert!(!s.classify(&echo).is_sentinel());
    }
}
