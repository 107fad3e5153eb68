use std::time::Duration;

use envb_core::{MetricsBackend, ReconcileOutcome};
use envb_model::TerminalStatus;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Build durations span seconds (cached layers) to tens of minutes (heavy setup scripts).
const DURATION_BUCKETS: &[f64] = &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 3600.0];

#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    started: IntCounter,
    finished: IntCounterVec,
    duration: HistogramVec,
    reconciled: IntCounterVec,
}

impl PrometheusMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> prometheus::Result<Self> {
        let started = IntCounter::new("envb_builds_started_total", "Build attempts started")?;
        let finished = IntCounterVec::new(
            Opts::new("envb_builds_finished_total", "Build attempts finished"),
            &["status"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new("envb_build_duration_seconds", "Build attempt wall time")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["status"],
        )?;
        let reconciled = IntCounterVec::new(
            Opts::new("envb_reconcile_total", "Artifact cleanup loops finished"),
            &["outcome"],
        )?;

        registry.register(Box::new(started.clone()))?;
        registry.register(Box::new(finished.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(reconciled.clone()))?;

        Ok(Self {
            registry,
            started,
            finished,
            duration,
            reconciled,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn build_started(&self) {
        self.started.inc();
    }

    fn build_finished(&self, status: TerminalStatus, elapsed: Duration) {
        let label = [status.as_str()];
        self.finished.with_label_values(&label).inc();
        self.duration
            .with_label_values(&label)
            .observe(elapsed.as_secs_f64());
    }

    fn reconcile_finished(&self, outcome: &ReconcileOutcome) {
        self.reconciled
            .with_label_values(&[outcome.as_label()])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_builds_and_cleanups() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.build_started();
        metrics.build_started();
        metrics.build_finished(TerminalStatus::Success, Duration::from_secs(42));
        metrics.build_finished(TerminalStatus::Aborted, Duration::from_secs(3));
        metrics.reconcile_finished(&ReconcileOutcome::Deleted {
            attempts: 4,
            removed: 2,
        });

        assert_eq!(metrics.started.get(), 2);
        assert_eq!(metrics.finished.with_label_values(&["SUCCESS"]).get(), 1);
        assert_eq!(metrics.finished.with_label_values(&["ABORTED"]).get(), 1);
        assert_eq!(metrics.reconciled.with_label_values(&["deleted"]).get(), 1);

        let text = metrics.render().unwrap();
        assert!(text.contains("envb_builds_started_total 2"));
        assert!(text.contains(r#"envb_build_duration_seconds_count{status="SUCCESS"} 1"#));
    }

    #[test]
    fn registries_are_independent() {
        let a = PrometheusMetrics::new().unwrap();
        let b = PrometheusMetrics::new().unwrap();
        a.build_started();
        assert_eq!(b.started.get(), 0);
    }
}
