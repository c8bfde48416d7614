//! Shared HTTP adapter state.
//!
//! Handlers receive this through `actix_web::web::Data` so they depend only on
//! the driving ports and stay testable without workers or storage.

use std::sync::Arc;

use crate::domain::ports::{MapGenerationCommand, MapGenerationQuery};

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub maps: Arc<dyn MapGenerationCommand>,
    pub maps_query: Arc<dyn MapGenerationQuery>,
}

impl HttpState {
    /// Construct state from the submission and query ports.
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    ///
    /// use choropleth::domain::{FingerprintBuilder, JobRegistry, MapCatalog, MapGenerationService};
    /// use choropleth::domain::ClassCountBounds;
    /// use choropleth::domain::District;
    /// use choropleth::inbound::http::state::HttpState;
    /// use choropleth::outbound::artifact_store::InMemoryArtifactStore;
    /// use mockable::DefaultClock;
    ///
    /// let catalog = MapCatalog::new(
    ///     [District { code: "SK0101".into(), name: "Bratislava I".into() }],
    ///     ["viridis".to_owned()],
    ///     ClassCountBounds::default(),
    /// )
    /// .expect("catalog");
    /// let registry = Arc::new(JobRegistry::new(Arc::new(DefaultClock)));
    /// let service = Arc::new(MapGenerationService::new(
    ///     FingerprintBuilder::new(Arc::new(catalog)),
    ///     registry,
    ///     Arc::new(InMemoryArtifactStore::default()),
    ///     Arc::new(DefaultClock),
    /// ));
    /// let state = HttpState::new(service.clone(), service);
    /// assert_eq!(state.maps_query.districts().len(), 1);
    /// ```
    pub fn new(maps: Arc<dyn MapGenerationCommand>, maps_query: Arc<dyn MapGenerationQuery>) -> Self {
        Self { maps, maps_query }
    }
}
