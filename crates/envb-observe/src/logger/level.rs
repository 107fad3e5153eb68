use std::fmt;

use tracing_subscriber::EnvFilter;

use crate::logger::error::LoggerError;

/// A validated `EnvFilter` directive such as `info` or `envb=debug,reqwest=warn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerLevel(String);

impl LoggerLevel {
    pub fn new(directive: impl Into<String>) -> Result<Self, LoggerError> {
        let directive = directive.into();
        EnvFilter::try_new(&directive)
            .map_err(|_| LoggerError::InvalidFilter(directive.clone()))?;
        Ok(Self(directive))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a directive names `target` (or one of its children) explicitly.
    pub fn mentions(&self, target: &str) -> bool {
        self.0.split(',').any(|directive| {
            let name = directive
                .split(['=', '['])
                .next()
                .unwrap_or_default()
                .trim();
            name == target || name.starts_with(&format!("{target}::"))
        })
    }
}

impl Default for LoggerLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}

impl fmt::Display for LoggerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_directives() {
        assert_eq!(LoggerLevel::new("envb=debug,info").unwrap().as_str(), "envb=debug,info");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            LoggerLevel::new("envb=loud"),
            Err(LoggerError::InvalidFilter(_))
        ));
    }

    #[test]
    fn finds_named_targets() {
        let level = LoggerLevel::new("info,reqwest=debug,hyper_util::client=trace").unwrap();
        assert!(level.mentions("reqwest"));
        assert!(level.mentions("hyper_util"));
        assert!(!level.mentions("hyper"));
        assert!(!level.mentions("taskvisor"));
    }
}
