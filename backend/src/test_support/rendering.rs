//! Test doubles for the render pipeline: a scripted renderer, a store that
//! refuses writes, and a metrics sink that remembers what it saw.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::domain::ports::{
    Artifact, ArtifactMetadata, ArtifactStore, ArtifactStoreError, FixtureMapRenderer,
    MapRenderer, NewArtifact, RenderError, RenderJobFailure, RenderJobFailureKind,
    RenderJobMetrics, RenderJobMetricsError, RenderJobSuccess, RenderedMap,
};
use crate::domain::{Fingerprint, GenerationRequest};

/// What a [`ScriptedRenderer`] does on one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderStep {
    /// Return the fixture output.
    Succeed,
    /// Return [`RenderError::Failed`] with the message.
    Fail(String),
    /// Panic with the message.
    Panic(String),
    /// Never return.
    Hang,
    /// Sleep, then return the fixture output.
    Delay(Duration),
}

/// Renderer following a script, one step per call.
///
/// Once the script runs dry every call uses the fallback step. An optional
/// gate holds each call until the test releases a permit.
pub struct ScriptedRenderer {
    steps: Mutex<VecDeque<RenderStep>>,
    fallback: RenderStep,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
    active: Arc<AtomicUsize>,
    max_active: AtomicUsize,
}

impl ScriptedRenderer {
    pub fn succeeding() -> Self {
        Self::always(RenderStep::Succeed)
    }

    pub fn always(step: RenderStep) -> Self {
        Self::scripted([], step)
    }

    pub fn scripted(steps: impl IntoIterator<Item = RenderStep>, fallback: RenderStep) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fallback,
            gate: None,
            calls: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Hold every call until `gate` hands out a permit.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Largest number of calls observed running at the same time.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> RenderStep {
        lock(&self.steps)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MapRenderer for ScriptedRenderer {
    async fn render(&self, request: &GenerationRequest) -> Result<RenderedMap, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active_now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(Arc::clone(&self.active));
        self.max_active.fetch_max(active_now, Ordering::SeqCst);
        let step = self.next_step();

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        match step {
            RenderStep::Succeed => FixtureMapRenderer.render(request).await,
            RenderStep::Fail(message) => Err(RenderError::failed(message)),
            RenderStep::Panic(message) => panic!("{message}"),
            RenderStep::Hang => std::future::pending().await,
            RenderStep::Delay(delay) => {
                tokio::time::sleep(delay).await;
                FixtureMapRenderer.render(request).await
            }
        }
    }
}

/// Artifact store whose writes (and optionally reads) always fail.
#[derive(Debug, Clone)]
pub struct FailingArtifactStore {
    message: String,
    fail_reads: bool,
}

impl FailingArtifactStore {
    /// Reads find nothing; writes fail.
    pub fn on_write(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fail_reads: false,
        }
    }

    /// Every operation fails.
    pub fn on_everything(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fail_reads: true,
        }
    }

    fn read<T>(&self, empty: T) -> Result<T, ArtifactStoreError> {
        if self.fail_reads {
            Err(ArtifactStoreError::io(self.message.clone()))
        } else {
            Ok(empty)
        }
    }
}

#[async_trait]
impl ArtifactStore for FailingArtifactStore {
    async fn put(
        &self,
        _artifact: NewArtifact<'_>,
    ) -> Result<ArtifactMetadata, ArtifactStoreError> {
        Err(ArtifactStoreError::io(self.message.clone()))
    }

    async fn get(
        &self,
        _fingerprint: &Fingerprint,
    ) -> Result<Option<Artifact>, ArtifactStoreError> {
        self.read(None)
    }

    async fn metadata(
        &self,
        _fingerprint: &Fingerprint,
    ) -> Result<Option<ArtifactMetadata>, ArtifactStoreError> {
        self.read(None)
    }

    async fn list(&self) -> Result<Vec<ArtifactMetadata>, ArtifactStoreError> {
        self.read(Vec::new())
    }

    async fn remove(
        &self,
        _fingerprint: &Fingerprint,
        _version: &str,
    ) -> Result<bool, ArtifactStoreError> {
        self.read(false)
    }
}

/// Metrics sink keeping every payload it receives.
#[derive(Debug, Default)]
pub struct RecordingRenderJobMetrics {
    successes: Mutex<Vec<RenderJobSuccess>>,
    failures: Mutex<Vec<RenderJobFailure>>,
}

impl RecordingRenderJobMetrics {
    pub fn success_count(&self) -> usize {
        lock(&self.successes).len()
    }

    pub fn failure_kinds(&self) -> Vec<RenderJobFailureKind> {
        lock(&self.failures)
            .iter()
            .map(|failure| failure.kind)
            .collect()
    }
}

#[async_trait]
impl RenderJobMetrics for RecordingRenderJobMetrics {
    async fn record_success(
        &self,
        payload: &RenderJobSuccess,
    ) -> Result<(), RenderJobMetricsError> {
        lock(&self.successes).push(payload.clone());
        Ok(())
    }

    async fn record_failure(
        &self,
        payload: &RenderJobFailure,
    ) -> Result<(), RenderJobMetricsError> {
        lock(&self.failures).push(payload.clone());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("test double mutex poisoned"),
    }
}
