//! Process configuration, read once from `ENVB_*` environment variables.
use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use envb_core::EngineConfig;
use envb_exec::CommandConfig;
use envb_observe::{LoggerConfig, LoggerFormat, LoggerLevel};
use envb_remote::RemoteConfig;

pub struct AgentConfig {
    pub logger: LoggerConfig,
    pub engine: EngineConfig,
    pub remote: RemoteConfig,
    pub command: CommandConfig,
    pub metrics_addr: Option<SocketAddr>,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or empty keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut logger = LoggerConfig::default();
        if let Some(v) = get("ENVB_LOG_FORMAT") {
            logger.format = LoggerFormat::from_str(&v)?;
        }
        if let Some(v) = get("ENVB_LOG_LEVEL") {
            logger.level = LoggerLevel::new(v)?;
        }
        if let Some(v) = get("ENVB_LOG_SPANS") {
            logger.span_timings = parse("ENVB_LOG_SPANS", &v)?;
        }

        let mut engine = EngineConfig::default();
        if let Some(v) = get("ENVB_PROJECTS_ROOT") {
            engine.projects_root = PathBuf::from(v);
        }
        if let Some(v) = get("ENVB_BUILDS_ROOT") {
            engine.builds_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("ENVB_COMPLETE_LOGS_DIR") {
            engine.complete_logs_dir = (!v.trim().is_empty()).then(|| PathBuf::from(v));
        }
        if let Some(v) = get("ENVB_IMAGE_NAME_TEMPLATE") {
            engine.image_name_template = v;
        }
        if let Some(v) = get("ENVB_BUILD_CONCURRENCY") {
            engine.build_concurrency = parse("ENVB_BUILD_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("ENVB_ABORT_POLL_MS") {
            engine.abort_poll_interval = millis("ENVB_ABORT_POLL_MS", &v)?;
        }
        if let Some(v) = get("ENVB_RECONCILE_ATTEMPTS") {
            engine.reconcile.attempts = parse("ENVB_RECONCILE_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("ENVB_RECONCILE_DELAY_MS") {
            engine.reconcile.delay = millis("ENVB_RECONCILE_DELAY_MS", &v)?;
        }

        let mut remote = RemoteConfig::default();
        if let Some(v) = get("ENVB_API_ADDRESS") {
            remote.api_address = v;
        }
        if let Some(v) = get("ENVB_ENGINE_ENDPOINT") {
            remote.engine_endpoint = v;
        }
        if let Some(v) = get("ENVB_REQUEST_TIMEOUT_MS") {
            remote.request_timeout = millis("ENVB_REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("ENVB_CLUSTER_API_SERVER") {
            remote.cluster.api_server = v;
        }
        if let Some(v) = get("ENVB_CLUSTER_NAMESPACE") {
            remote.cluster.namespace = v;
        }
        if let Some(v) = get("ENVB_CLUSTER_TOKEN_FILE") {
            remote.cluster.token_file = Some(PathBuf::from(v));
        }

        let mut command = CommandConfig::default();
        if let Some(v) = get("ENVB_BACKEND_PROGRAM") {
            command.program = v;
        }
        if let Some(v) = get("ENVB_BACKEND_ARGS") {
            command.args = v.split_whitespace().map(String::from).collect();
        }

        let metrics_addr = get("ENVB_METRICS_ADDR")
            .map(|v| parse::<SocketAddr>("ENVB_METRICS_ADDR", &v))
            .transpose()?;

        Ok(Self {
            logger,
            engine,
            remote,
            command,
            metrics_addr,
        })
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{key}: invalid value {value:?}"))
}

fn millis(key: &str, value: &str) -> Result<Duration> {
    parse::<u64>(key, value).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<AgentConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AgentConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_match_reference_deployment() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.engine.builds_root, PathBuf::from("/userdir/.orchest/env-builds"));
        assert_eq!(cfg.engine.reconcile.attempts, 10);
        assert_eq!(cfg.remote.api_address, "http://orchest-api:80/api");
        assert_eq!(cfg.command.program, "docker");
        assert!(cfg.metrics_addr.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = load(&[
            ("ENVB_BUILD_CONCURRENCY", "4"),
            ("ENVB_ABORT_POLL_MS", "100"),
            ("ENVB_COMPLETE_LOGS_DIR", ""),
            ("ENVB_BACKEND_ARGS", "build -f {descriptor} {context}"),
            ("ENVB_METRICS_ADDR", "127.0.0.1:9100"),
            ("ENVB_LOG_FORMAT", "json"),
            ("ENVB_LOG_SPANS", "true"),
        ])
        .unwrap();

        assert_eq!(cfg.engine.build_concurrency, 4);
        assert_eq!(cfg.engine.abort_poll_interval, Duration::from_millis(100));
        assert!(cfg.engine.complete_logs_dir.is_none());
        assert_eq!(cfg.command.args, vec!["build", "-f", "{descriptor}", "{context}"]);
        assert_eq!(cfg.metrics_addr, Some("127.0.0.1:9100".parse().unwrap()));
        assert_eq!(cfg.logger.format, LoggerFormat::Json);
        assert!(cfg.logger.span_timings);
    }

    #[test]
    fn malformed_numbers_name_the_variable() {
        let err = load(&[("ENVB_RECONCILE_ATTEMPTS", "ten")]).err().unwrap();
        assert!(err.to_string().contains("ENVB_RECONCILE_ATTEMPTS"));
    }
}
