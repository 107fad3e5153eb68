//! Prometheus metrics backend for the environment build engine.
//!
//! [`PrometheusMetrics`] implements [`envb_core::MetricsBackend`] on its own [`Registry`].
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use envb_core::MetricsBackend;
//! use envb_prometheus::PrometheusMetrics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let handle: Arc<dyn MetricsBackend> = Arc::new(metrics.clone());
//! handle.build_started();
//!
//! let text = metrics.render()?;
//! assert!(text.contains("envb_builds_started_total 1"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `envb_builds_started_total` - Counter
//! - `envb_builds_finished_total{status}` - Counter
//! - `envb_build_duration_seconds{status}` - Histogram
//! - `envb_reconcile_total{outcome}` - Counter
//!
//! ## HTTP Server
//! This crate does NOT serve `/metrics`; `envb-agentd` does, using [`PrometheusMetrics::render`].

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
