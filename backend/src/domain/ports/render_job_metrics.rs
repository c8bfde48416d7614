//! Domain port surface for render job success/failure counters.
//!
//! Keeps render observability at the domain boundary so adapters can emit
//! Prometheus counters without leaking exporter details into the scheduler.

use std::time::Duration;

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors exposed when recording render metrics.
    pub enum RenderJobMetricsError {
        /// Metric exporter rejected the write.
        Export { message: String } =>
            "render metrics exporter failed: {message}",
    }
}

/// Failure reason labels for render jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RenderJobFailureKind {
    /// The renderer reported an error or produced unusable output.
    RendererFailed,
    /// The render exceeded the configured timeout.
    TimedOut,
    /// The renderer panicked.
    Panicked,
    /// The artifact could not be stored.
    PersistenceFailed,
}

impl RenderJobFailureKind {
    /// Metric label for the failure kind.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::RendererFailed => "renderer_failed",
            Self::TimedOut => "timed_out",
            Self::Panicked => "panicked",
            Self::PersistenceFailed => "persistence_failed",
        }
    }
}

/// Success metric payload for one render job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJobSuccess {
    /// Wall-clock time spent in the renderer.
    pub render_duration: Duration,
    /// Size of the stored image.
    pub image_bytes: u64,
}

/// Failure metric payload for one render job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJobFailure {
    /// Domain-level failure reason.
    pub kind: RenderJobFailureKind,
}

/// Metrics recording port for render job counters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RenderJobMetrics: Send + Sync {
    /// Record a render job that reached `Completed`.
    async fn record_success(&self, payload: &RenderJobSuccess)
    -> Result<(), RenderJobMetricsError>;

    /// Record a render job that reached `Error`.
    async fn record_failure(&self, payload: &RenderJobFailure)
    -> Result<(), RenderJobMetricsError>;
}

/// No-op implementation used when metrics are disabled or in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRenderJobMetrics;

#[async_trait]
impl RenderJobMetrics for NoOpRenderJobMetrics {
    async fn record_success(
        &self,
        _payload: &RenderJobSuccess,
    ) -> Result<(), RenderJobMetricsError> {
        Ok(())
    }

    async fn record_failure(
        &self,
        _payload: &RenderJobFailure,
    ) -> Result<(), RenderJobMetricsError> {
        Ok(())
    }
}
