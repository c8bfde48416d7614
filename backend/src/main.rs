//! Service entry-point: loads settings, starts the render workers and serves
//! the map API until the HTTP server stops.

mod server;

use std::io;

use actix_web::web;
#[cfg(feature = "metrics")]
use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use ortho_config::OrthoConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use choropleth::config::MapServiceSettings;
use choropleth::domain::RenderScheduler;
use choropleth::inbound::http::health::HealthState;
use server::{
    RetentionPolicy, ServerConfig, build_component_ports, build_map_components, create_server,
};

/// Application bootstrap.
#[actix_web::main]
async fn main() -> io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = MapServiceSettings::load()
        .map_err(|err| io::Error::other(format!("failed to load settings: {err}")))?;
    run(settings).await
}

async fn run(settings: MapServiceSettings) -> io::Result<()> {
    let catalog = settings.load_catalog().map_err(io::Error::other)?;
    let server_config = ServerConfig::from_settings(&settings).map_err(io::Error::other)?;
    let bind_addr = server_config.bind_addr();
    #[cfg(feature = "metrics")]
    let server_config = server_config.with_metrics(initialize_metrics(|| {
        PrometheusMetricsBuilder::new("choropleth")
            .endpoint("/metrics")
            .build()
    }));

    let ports = build_component_ports(&settings, &server_config)?;
    let components =
        build_map_components(catalog, RetentionPolicy::from_settings(&settings), ports);
    let scheduler = RenderScheduler::start(components.scheduler_ports, settings.scheduler());
    let sweeper_shutdown = CancellationToken::new();
    let sweeper = server::spawn_retention_sweeper(
        components.service,
        settings.sweep_interval(),
        sweeper_shutdown.clone(),
    );

    let health_state = web::Data::new(HealthState::new());
    let server = create_server(
        health_state.clone(),
        components.http_state,
        server_config,
    )?;
    info!(%bind_addr, workers = scheduler.worker_count(), "choropleth service listening");

    let served = server.await;

    health_state.mark_unhealthy();
    sweeper_shutdown.cancel();
    if let Err(join_error) = sweeper.await {
        warn!(error = %join_error, "retention sweeper ended abnormally");
    }
    scheduler.shutdown().await;
    served
}

/// Build Prometheus middleware, logging and continuing without it on failure.
#[cfg(feature = "metrics")]
fn initialize_metrics<F, E>(make_metrics: F) -> Option<PrometheusMetrics>
where
    F: FnOnce() -> Result<PrometheusMetrics, E>,
    E: std::fmt::Display,
{
    match make_metrics() {
        Ok(metrics) => Some(metrics),
        Err(error) => {
            warn!(%error, "failed to initialise Prometheus metrics; continuing without");
            None
        }
    }
}

#[cfg(test)]
mod tests;
