//! Bounded pool of workers draining the job registry.
//!
//! Workers claim `Pending` jobs in FIFO order, render them through the
//! [`RenderAdapter`], store the artifact and only then flip the job to
//! `Completed`. Any failure along the way ends the job in `Error`; the worker
//! itself keeps running. The pool size is the concurrency limit on renders.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::future::join_all;
use mockable::Clock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::TraceId;
use crate::domain::job_registry::{ClaimedJob, JobRegistry};
use crate::domain::ports::{
    ArtifactStore, MapRenderer, NewArtifact, RenderError, RenderJobFailure, RenderJobFailureKind,
    RenderJobMetrics, RenderJobSuccess,
};

mod adapter;

pub use adapter::RenderAdapter;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSchedulerConfig {
    /// Number of workers, and so the maximum number of concurrent renders.
    pub worker_count: usize,
    /// Upper bound on one render.
    pub render_timeout: Duration,
    /// Longest an idle worker sleeps before re-checking the queue.
    pub idle_poll: Duration,
}

impl Default for RenderSchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            render_timeout: Duration::from_secs(120),
            idle_poll: Duration::from_millis(500),
        }
    }
}

/// Port bundle required by the scheduler.
pub struct RenderSchedulerPorts {
    /// Shared job registry.
    pub registry: Arc<JobRegistry>,
    /// Rendering collaborator.
    pub renderer: Arc<dyn MapRenderer>,
    /// Durable artifact storage.
    pub store: Arc<dyn ArtifactStore>,
    /// Render job counters.
    pub metrics: Arc<dyn RenderJobMetrics>,
    /// Source of artifact timestamps.
    pub clock: Arc<dyn Clock>,
}

/// Running worker pool.
///
/// Must be started from within a Tokio runtime.
pub struct RenderScheduler {
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl RenderScheduler {
    /// Spawn `config.worker_count` workers (at least one).
    pub fn start(ports: RenderSchedulerPorts, config: RenderSchedulerConfig) -> Self {
        let worker_count = config.worker_count.max(1);
        let context = Arc::new(WorkerContext {
            adapter: RenderAdapter::new(ports.renderer, config.render_timeout),
            registry: ports.registry,
            store: ports.store,
            metrics: ports.metrics,
            clock: ports.clock,
            idle_poll: config.idle_poll,
        });
        let shutdown = CancellationToken::new();
        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&context),
                    shutdown.child_token(),
                ))
            })
            .collect();
        info!(worker_count, "render scheduler started");
        Self { shutdown, workers }
    }

    /// Number of running workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop claiming new jobs and wait for in-progress jobs to finish.
    ///
    /// Renders are still bounded by the render timeout, so this returns within
    /// roughly one timeout.
    pub async fn shutdown(self) {
        info!("render scheduler shutting down");
        self.shutdown.cancel();
        for (worker_id, joined) in join_all(self.workers).await.into_iter().enumerate() {
            if let Err(join_error) = joined {
                error!(worker_id, error = %join_error, "render worker ended abnormally");
            }
        }
        info!("render scheduler stopped");
    }
}

struct WorkerContext {
    adapter: RenderAdapter,
    registry: Arc<JobRegistry>,
    store: Arc<dyn ArtifactStore>,
    metrics: Arc<dyn RenderJobMetrics>,
    clock: Arc<dyn Clock>,
    idle_poll: Duration,
}

async fn worker_loop(worker_id: usize, context: Arc<WorkerContext>, shutdown: CancellationToken) {
    debug!(worker_id, "render worker started");
    while !shutdown.is_cancelled() {
        let Some(job) = context.registry.claim() else {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = context.registry.work_available() => {}
                () = tokio::time::sleep(context.idle_poll) => {}
            }
            continue;
        };
        let fingerprint = job.fingerprint;
        let trace_id = job.trace_id;
        let processed = AssertUnwindSafe(TraceId::scope_optional(trace_id, context.process(job)))
            .catch_unwind()
            .await;
        if processed.is_err() {
            error!(worker_id, %fingerprint, "render worker panicked while finishing a job");
            if let Err(registry_error) = context
                .registry
                .mark_error(&fingerprint, "internal error while finishing the job")
            {
                error!(error = %registry_error, "could not mark job as failed");
            }
        }
    }
    debug!(worker_id, "render worker stopped");
}

impl WorkerContext {
    async fn process(&self, job: ClaimedJob) {
        info!(fingerprint = %job.fingerprint, "rendering map");
        let started = Instant::now();
        let rendered = match self.adapter.render(&job).await {
            Ok(rendered) => rendered,
            Err(render_error) => {
                let kind = failure_kind(&render_error);
                self.fail(&job, render_error.to_string(), kind).await;
                return;
            }
        };
        let render_duration = started.elapsed();

        let artifact = NewArtifact {
            fingerprint: job.fingerprint,
            image: &rendered.image,
            table: &rendered.table,
            stored_at: self.clock.utc(),
        };
        let metadata = match self.store.put(artifact).await {
            Ok(metadata) => metadata,
            Err(store_error) => {
                self.fail(
                    &job,
                    format!("could not store artifact: {store_error}"),
                    RenderJobFailureKind::PersistenceFailed,
                )
                .await;
                return;
            }
        };

        match self.registry.mark_completed(&job.fingerprint) {
            Ok(_) => info!(
                fingerprint = %job.fingerprint,
                version = %metadata.version,
                elapsed_ms = u64::try_from(render_duration.as_millis()).unwrap_or(u64::MAX),
                "map rendered"
            ),
            Err(registry_error) => {
                error!(error = %registry_error, "completed job vanished from the registry");
                return;
            }
        }

        let payload = RenderJobSuccess {
            render_duration,
            image_bytes: metadata.image_bytes,
        };
        if let Err(metrics_error) = self.metrics.record_success(&payload).await {
            warn!(error = %metrics_error, "failed to record render success");
        }
    }

    async fn fail(&self, job: &ClaimedJob, detail: String, kind: RenderJobFailureKind) {
        warn!(fingerprint = %job.fingerprint, %detail, "map render failed");
        if let Err(registry_error) = self.registry.mark_error(&job.fingerprint, detail) {
            error!(error = %registry_error, "failed job vanished from the registry");
            return;
        }
        if let Err(metrics_error) = self.metrics.record_failure(&RenderJobFailure { kind }).await {
            warn!(error = %metrics_error, "failed to record render failure");
        }
    }
}

fn failure_kind(error: &RenderError) -> RenderJobFailureKind {
    match error {
        RenderError::TimedOut { .. } => RenderJobFailureKind::TimedOut,
        RenderError::Panicked { .. } => RenderJobFailureKind::Panicked,
        RenderError::Failed { .. } | RenderError::InvalidOutput { .. } => {
            RenderJobFailureKind::RendererFailed
        }
    }
}
