use std::time::Duration;

use envb_model::TerminalStatus;

use crate::reconcile::ReconcileOutcome;

/// Hook for build metrics; see `envb-prometheus` for a Prometheus implementation.
pub trait MetricsBackend: Send + Sync + 'static {
    fn build_started(&self);
    fn build_finished(&self, status: TerminalStatus, elapsed: Duration);
    fn reconcile_finished(&self, outcome: &ReconcileOutcome);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsBackend for NoopMetrics {
    fn build_started(&self) {}
    fn build_finished(&self, _status: TerminalStatus, _elapsed: Duration) {}
    fn reconcile_finished(&self, _outcome: &ReconcileOutcome) {}
}
