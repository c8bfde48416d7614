//! Tests for the service bootstrap: readiness signalling, metrics
//! initialisation and the retention sweeper.

use std::sync::Arc;
use std::time::Duration;

use super::server::{
    ComponentPorts, MapComponents, RetentionPolicy, ServerConfig, build_map_components,
    create_server,
};
#[cfg(feature = "metrics")]
use super::{PrometheusMetricsBuilder, initialize_metrics};
use actix_web::web;
use choropleth::config::MapServiceSettings;
use choropleth::domain::ports::{
    ArtifactStore, FixtureMapRenderer, MapRenderer, NewArtifact, NoOpRenderJobMetrics,
};
use choropleth::domain::{
    ClassCountBounds, District, FingerprintBuilder, MapCatalog, MapParameters,
};
use choropleth::inbound::http::health::HealthState;
use choropleth::outbound::artifact_store::InMemoryArtifactStore;
use choropleth::test_support::MutableClock;
use mockable::Clock;
use rstest::{fixture, rstest};
use tokio_util::sync::CancellationToken;

#[fixture]
fn health_state() -> web::Data<HealthState> {
    web::Data::new(HealthState::new())
}

fn catalog() -> MapCatalog {
    MapCatalog::new(
        [District {
            code: "SK0101".into(),
            name: "Bratislava I".into(),
        }],
        ["viridis".to_owned()],
        ClassCountBounds::default(),
    )
    .expect("catalog")
}

fn components_with(
    store: Arc<InMemoryArtifactStore>,
    clock: Arc<MutableClock>,
    retention: Option<Duration>,
) -> MapComponents {
    build_map_components(
        catalog(),
        RetentionPolicy {
            artifacts: retention,
            ..RetentionPolicy::default()
        },
        ComponentPorts {
            renderer: Arc::new(FixtureMapRenderer),
            store,
            metrics: Arc::new(NoOpRenderJobMetrics),
            clock,
        },
    )
}

#[cfg(feature = "metrics")]
#[test]
fn initialize_metrics_returns_none_on_error() {
    let metrics = initialize_metrics(|| -> Result<_, &str> { Err("boom") });
    assert!(metrics.is_none(), "expected metrics to be absent on error");
}

#[cfg(feature = "metrics")]
#[test]
fn initialize_metrics_returns_metrics_on_success() {
    let metrics = initialize_metrics(|| {
        PrometheusMetricsBuilder::new("test")
            .endpoint("/metrics")
            .build()
    });

    assert!(
        metrics.is_some(),
        "expected metrics to be present on success"
    );
}

#[rstest]
#[case(Some("127.0.0.1:9090"), 9090)]
#[case(None, 8080)]
fn server_config_reads_bind_address(#[case] configured: Option<&str>, #[case] port: u16) {
    let settings = MapServiceSettings {
        bind_addr: configured.map(str::to_owned),
        ..MapServiceSettings::default()
    };

    let config = ServerConfig::from_settings(&settings).expect("valid address");

    assert_eq!(config.bind_addr().port(), port);
}

#[rstest]
fn server_config_rejects_unparsable_address() {
    let settings = MapServiceSettings {
        bind_addr: Some("not-an-address".to_owned()),
        ..MapServiceSettings::default()
    };

    assert!(ServerConfig::from_settings(&settings).is_err());
}

#[rstest]
#[actix_web::test]
async fn create_server_marks_ready(health_state: web::Data<HealthState>) {
    assert!(!health_state.is_ready(), "state should start unready");
    let components = components_with(
        Arc::new(InMemoryArtifactStore::default()),
        Arc::new(MutableClock::frozen()),
        None,
    );
    let config = ServerConfig::new("127.0.0.1:0".parse().expect("address"));
    assert_eq!(config.bind_addr().port(), 0);

    let _server = create_server(health_state.clone(), components.http_state, config)
        .expect("server should bind");

    assert!(
        health_state.is_ready(),
        "server creation should mark readiness"
    );
}

#[rstest]
#[tokio::test]
async fn retention_sweeper_removes_expired_artifacts() {
    let store = Arc::new(InMemoryArtifactStore::default());
    let clock = Arc::new(MutableClock::frozen());
    let components = components_with(
        Arc::clone(&store),
        Arc::clone(&clock),
        Some(Duration::from_secs(60)),
    );
    let keyed = FingerprintBuilder::new(Arc::new(catalog()))
        .build(&MapParameters::new("SK0101", 5, "viridis"))
        .expect("valid parameters");
    let rendered = FixtureMapRenderer
        .render(&keyed.request)
        .await
        .expect("placeholder render");
    store
        .put(NewArtifact {
            fingerprint: keyed.fingerprint,
            image: &rendered.image,
            table: &rendered.table,
            stored_at: clock.utc(),
        })
        .await
        .expect("store artifact");
    clock.advance_seconds(61);

    let shutdown = CancellationToken::new();
    let sweeper = super::server::spawn_retention_sweeper(
        components.service,
        Duration::from_millis(10),
        shutdown.clone(),
    );
    let mut remaining = store.metadata(&keyed.fingerprint).await.expect("metadata");
    for _ in 0..100 {
        if remaining.is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        remaining = store.metadata(&keyed.fingerprint).await.expect("metadata");
    }
    shutdown.cancel();
    sweeper.await.expect("sweeper stops cleanly");

    assert!(remaining.is_none(), "expired artifact should be swept");
}
