//! Builders wiring outbound adapters into the domain service, the worker pool
//! and the HTTP state.

use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use mockable::{Clock, DefaultClock};
use tracing::info;

use choropleth::config::MapServiceSettings;
use choropleth::domain::ports::{
    ArtifactStore, FixtureMapRenderer, MapRenderer, NoOpRenderJobMetrics, RenderJobMetrics,
};
use choropleth::domain::{
    DEFAULT_RECORD_LIMIT, FingerprintBuilder, JobRegistry, MapCatalog, MapGenerationService,
    RenderSchedulerPorts,
};
use choropleth::inbound::http::state::HttpState;
use choropleth::outbound::artifact_store::FilesystemArtifactStore;
#[cfg(feature = "metrics")]
use choropleth::outbound::metrics::PrometheusRenderJobMetrics;
use choropleth::outbound::renderer::CommandMapRenderer;

use super::ServerConfig;

/// Adapters shared by the service and the worker pool.
pub(crate) struct ComponentPorts {
    pub(crate) renderer: Arc<dyn MapRenderer>,
    pub(crate) store: Arc<dyn ArtifactStore>,
    pub(crate) metrics: Arc<dyn RenderJobMetrics>,
    pub(crate) clock: Arc<dyn Clock>,
}

/// How long artifacts and finished job records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetentionPolicy {
    /// Artifact retention window; `None` keeps artifacts forever.
    pub(crate) artifacts: Option<Duration>,
    /// Job records kept before the oldest finished ones are evicted.
    pub(crate) job_records: usize,
}

impl RetentionPolicy {
    pub(crate) fn from_settings(settings: &MapServiceSettings) -> Self {
        Self {
            artifacts: settings.retention(),
            job_records: settings.job_record_limit(),
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            artifacts: None,
            job_records: DEFAULT_RECORD_LIMIT,
        }
    }
}

/// Everything `main` needs to serve requests and run workers.
pub(crate) struct MapComponents {
    pub(crate) http_state: web::Data<HttpState>,
    pub(crate) service: Arc<MapGenerationService>,
    pub(crate) scheduler_ports: RenderSchedulerPorts,
}

/// Use the configured command renderer, or the placeholder renderer when no
/// command is set.
pub(crate) fn build_renderer(command_line: Option<&str>) -> Arc<dyn MapRenderer> {
    match command_line.and_then(CommandMapRenderer::from_command_line) {
        Some(renderer) => {
            info!(command = command_line, "using command renderer");
            Arc::new(renderer)
        }
        None => {
            info!("no renderer command configured; using placeholder renderer");
            Arc::new(FixtureMapRenderer)
        }
    }
}

/// Open the filesystem artifact store under the configured directory.
///
/// # Errors
/// Returns [`std::io::Error`] when the directory is unusable.
pub(crate) fn build_artifact_store(
    settings: &MapServiceSettings,
) -> std::io::Result<Arc<dyn ArtifactStore>> {
    let root = settings.artifact_dir().map_err(std::io::Error::other)?;
    let store = FilesystemArtifactStore::open(&root).map_err(|err| {
        std::io::Error::other(format!("failed to open artifact store at {root}: {err}"))
    })?;
    info!(root = %root, "artifact store opened");
    Ok(Arc::new(store))
}

/// Register Prometheus render counters when a registry is configured.
///
/// # Errors
/// Returns [`std::io::Error`] if Prometheus metric registration fails.
#[cfg(feature = "metrics")]
pub(crate) fn build_render_job_metrics(
    config: &ServerConfig,
) -> std::io::Result<Arc<dyn RenderJobMetrics>> {
    match config.metrics() {
        Some(prom) => {
            let metrics = PrometheusRenderJobMetrics::new(&prom.registry).map_err(|e| {
                std::io::Error::other(format!("render metrics registration failed: {e}"))
            })?;
            Ok(Arc::new(metrics))
        }
        None => Ok(Arc::new(NoOpRenderJobMetrics)),
    }
}

/// Render counters are disabled without the `metrics` feature.
///
/// # Errors
/// Never fails; the signature matches the metrics-enabled build.
#[cfg(not(feature = "metrics"))]
pub(crate) fn build_render_job_metrics(
    _config: &ServerConfig,
) -> std::io::Result<Arc<dyn RenderJobMetrics>> {
    Ok(Arc::new(NoOpRenderJobMetrics))
}

/// Assemble ports backed by the real adapters.
///
/// # Errors
/// Returns [`std::io::Error`] when the store or metrics cannot be set up.
pub(crate) fn build_component_ports(
    settings: &MapServiceSettings,
    config: &ServerConfig,
) -> std::io::Result<ComponentPorts> {
    Ok(ComponentPorts {
        renderer: build_renderer(settings.renderer_command()),
        store: build_artifact_store(settings)?,
        metrics: build_render_job_metrics(config)?,
        clock: Arc::new(DefaultClock),
    })
}

/// Share one registry between the service and the workers.
pub(crate) fn build_map_components(
    catalog: MapCatalog,
    retention: RetentionPolicy,
    ports: ComponentPorts,
) -> MapComponents {
    let ComponentPorts {
        renderer,
        store,
        metrics,
        clock,
    } = ports;
    let registry =
        Arc::new(JobRegistry::new(Arc::clone(&clock)).with_record_limit(retention.job_records));
    let service = Arc::new(
        MapGenerationService::new(
            FingerprintBuilder::new(Arc::new(catalog)),
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&clock),
        )
        .with_retention(retention.artifacts),
    );
    let http_state = web::Data::new(HttpState::new(service.clone(), service.clone()));
    MapComponents {
        http_state,
        service,
        scheduler_ports: RenderSchedulerPorts {
            registry,
            renderer,
            store,
            metrics,
            clock,
        },
    }
}
