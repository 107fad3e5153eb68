use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan, time::OffsetTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::logger::{
    config::{LoggerConfig, QUIET_TARGETS},
    error::LoggerError,
    format::LoggerFormat,
};

type Output = Box<dyn Layer<Registry> + Send + Sync + 'static>;

pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    if tracing::dispatcher::has_been_set() {
        return Err(LoggerError::AlreadyInstalled);
    }

    let filter = filter(cfg)?;
    let output = output(cfg)?;
    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .map_err(|e| LoggerError::Setup(e.to_string()))
}

/// The configured directive, plus `warn` caps for noisy dependencies it leaves unnamed.
pub(crate) fn filter(cfg: &LoggerConfig) -> Result<EnvFilter, LoggerError> {
    let directive = cfg.level.as_str();
    let mut filter = EnvFilter::try_new(directive)
        .map_err(|_| LoggerError::InvalidFilter(directive.to_string()))?;

    if cfg.quiet_dependencies {
        for target in QUIET_TARGETS {
            if cfg.level.mentions(target) {
                continue;
            }
            let cap = format!("{target}=warn");
            let cap = cap
                .parse()
                .map_err(|_| LoggerError::InvalidFilter(cap.clone()))?;
            filter = filter.add_directive(cap);
        }
    }
    Ok(filter)
}

fn output(cfg: &LoggerConfig) -> Result<Output, LoggerError> {
    let spans = if cfg.span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match cfg.format {
        LoggerFormat::Text => Ok(fmt::layer()
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_timer(timer())
            .with_span_events(spans)
            .boxed()),
        LoggerFormat::Json => Ok(fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(cfg.with_targets)
            .with_timer(timer())
            .with_span_events(spans)
            .boxed()),
        LoggerFormat::Journald => journald(),
    }
}

fn timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald() -> Result<Output, LoggerError> {
    tracing_journald::layer()
        .map(|layer| layer.boxed())
        .map_err(|e| LoggerError::Setup(format!("journald: {e}")))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald() -> Result<Output, LoggerError> {
    Err(LoggerError::JournaldUnavailable)
}
