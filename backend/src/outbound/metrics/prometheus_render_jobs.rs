//! Prometheus adapter for render job counters.
//!
//! Writes the shared multi-job family (`jobs_total{type,status}`), a
//! render-specific family labelled with the failure reason and a histogram
//! of render durations.

use async_trait::async_trait;
use prometheus::{CounterVec, Histogram, HistogramOpts, Opts, Registry};

use crate::domain::ports::{
    RenderJobFailure, RenderJobMetrics, RenderJobMetricsError, RenderJobSuccess,
};

const RENDER_TYPE_LABEL: &str = "Render";
const SUCCESS_REASON: &str = "none";

/// Prometheus-backed recorder for render job outcomes.
pub struct PrometheusRenderJobMetrics {
    jobs_total: CounterVec,
    render_jobs_total: CounterVec,
    render_duration_seconds: Histogram,
}

impl PrometheusRenderJobMetrics {
    /// Create and register the metric families with `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error when Prometheus rejects metric registration.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let jobs_total = CounterVec::new(
            Opts::new("jobs_total", "Total jobs by type and status"),
            &["type", "status"],
        )?;
        let render_jobs_total = CounterVec::new(
            Opts::new(
                "render_jobs_total",
                "Total map render jobs by status and failure reason",
            ),
            &["status", "reason"],
        )?;
        let render_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "render_duration_seconds",
                "Wall-clock time of successful map renders",
            )
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )?;
        registry.register(Box::new(jobs_total.clone()))?;
        registry.register(Box::new(render_jobs_total.clone()))?;
        registry.register(Box::new(render_duration_seconds.clone()))?;
        Ok(Self {
            jobs_total,
            render_jobs_total,
            render_duration_seconds,
        })
    }

    fn record(&self, status: &str, reason: &str) {
        self.jobs_total
            .with_label_values(&[RENDER_TYPE_LABEL, status])
            .inc();
        self.render_jobs_total
            .with_label_values(&[status, reason])
            .inc();
    }
}

#[async_trait]
impl RenderJobMetrics for PrometheusRenderJobMetrics {
    async fn record_success(
        &self,
        payload: &RenderJobSuccess,
    ) -> Result<(), RenderJobMetricsError> {
        self.record("success", SUCCESS_REASON);
        self.render_duration_seconds
            .observe(payload.render_duration.as_secs_f64());
        Ok(())
    }

    async fn record_failure(
        &self,
        payload: &RenderJobFailure,
    ) -> Result<(), RenderJobMetricsError> {
        self.record("failure", payload.kind.as_label());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for render job counters.

    use std::time::Duration;

    use super::*;
    use crate::domain::ports::RenderJobFailureKind;
    use rstest::rstest;

    fn make_metrics() -> (Registry, PrometheusRenderJobMetrics) {
        let registry = Registry::new();
        let metrics = PrometheusRenderJobMetrics::new(&registry)
            .expect("metric registration should succeed");
        (registry, metrics)
    }

    #[test]
    fn registers_families_with_registry() {
        let (registry, metrics) = make_metrics();
        metrics.record("success", SUCCESS_REASON);
        let names: Vec<_> = registry
            .gather()
            .iter()
            .map(|family| family.name().to_owned())
            .collect();

        assert!(names.iter().any(|name| name == "jobs_total"));
        assert!(names.iter().any(|name| name == "render_jobs_total"));
    }

    #[rstest]
    #[tokio::test]
    async fn success_updates_counters_and_histogram() {
        let (_registry, metrics) = make_metrics();

        metrics
            .record_success(&RenderJobSuccess {
                render_duration: Duration::from_millis(1_500),
                image_bytes: 2_048,
            })
            .await
            .expect("recording success should not fail");

        let jobs_total = metrics
            .jobs_total
            .with_label_values(&[RENDER_TYPE_LABEL, "success"]);
        assert_eq!(jobs_total.get() as u64, 1);
        assert_eq!(metrics.render_duration_seconds.get_sample_count(), 1);
    }

    #[rstest]
    #[case::timed_out(RenderJobFailureKind::TimedOut, "timed_out")]
    #[case::panicked(RenderJobFailureKind::Panicked, "panicked")]
    #[case::persistence(RenderJobFailureKind::PersistenceFailed, "persistence_failed")]
    #[tokio::test]
    async fn failure_is_labelled_with_reason(
        #[case] kind: RenderJobFailureKind,
        #[case] reason: &str,
    ) {
        let (_registry, metrics) = make_metrics();

        metrics
            .record_failure(&RenderJobFailure { kind })
            .await
            .expect("recording failure should not fail");

        let render_total = metrics
            .render_jobs_total
            .with_label_values(&["failure", reason]);
        assert_eq!(render_total.get() as u64, 1);
        assert_eq!(metrics.render_duration_seconds.get_sample_count(), 0);
    }
}
