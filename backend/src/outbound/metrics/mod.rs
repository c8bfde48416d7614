//! Outbound adapters for metrics exporting.
//!
//! Prometheus-backed implementations of domain metrics ports, compiled only
//! with the `metrics` feature.

mod prometheus_render_jobs;

pub use prometheus_render_jobs::PrometheusRenderJobMetrics;
