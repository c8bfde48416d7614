//! Bounded, isolated invocation of the map renderer.
//!
//! Each render runs on its own Tokio task so a panic is caught at the join
//! boundary instead of unwinding through the worker. The worker waits at most
//! `timeout`; a render that overruns is detached and its eventual result is
//! dropped.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tracing::warn;

use crate::domain::TraceId;
use crate::domain::job_registry::ClaimedJob;
use crate::domain::ports::{MapRenderer, RenderError, RenderedMap};

/// Wraps a [`MapRenderer`] with a timeout and failure classification.
#[derive(Clone)]
pub struct RenderAdapter {
    renderer: Arc<dyn MapRenderer>,
    timeout: Duration,
}

impl RenderAdapter {
    pub fn new(renderer: Arc<dyn MapRenderer>, timeout: Duration) -> Self {
        Self { renderer, timeout }
    }

    /// Render the claimed job, giving up after the configured timeout.
    ///
    /// # Errors
    /// - [`RenderError::TimedOut`] when the renderer overruns;
    /// - [`RenderError::Panicked`] when it panics;
    /// - [`RenderError::InvalidOutput`] when it returns an empty image;
    /// - whatever the renderer itself reported.
    pub async fn render(&self, job: &ClaimedJob) -> Result<RenderedMap, RenderError> {
        let renderer = Arc::clone(&self.renderer);
        let request = job.request.clone();
        let handle = tokio::spawn(TraceId::scope_optional(job.trace_id, async move {
            renderer.render(&request).await
        }));

        match tokio::time::timeout(self.timeout, handle).await {
            Err(_elapsed) => {
                warn!(
                    fingerprint = %job.fingerprint,
                    timeout_ms = timeout_millis(self.timeout),
                    "render overran its timeout; abandoning it"
                );
                Err(RenderError::timed_out(timeout_millis(self.timeout)))
            }
            Ok(Err(join_error)) => Err(classify_join_error(join_error)),
            Ok(Ok(result)) => result.and_then(check_output),
        }
    }
}

fn check_output(rendered: RenderedMap) -> Result<RenderedMap, RenderError> {
    if rendered.image.is_empty() {
        return Err(RenderError::invalid_output("image is empty"));
    }
    Ok(rendered)
}

fn classify_join_error(error: JoinError) -> RenderError {
    if error.is_panic() {
        RenderError::panicked(panic_message(error.into_panic()))
    } else {
        RenderError::failed("render task was cancelled")
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&'static str>()
            .map_or_else(|| "non-string panic payload".to_owned(), |s| (*s).to_owned()),
    }
}

fn timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}
