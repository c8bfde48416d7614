//! Driving port for polling map jobs and fetching finished artifacts.
//!
//! All operations are pure reads of the job registry and artifact store; none
//! waits on a worker, so pollers can call them as often as they like.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{DataTable, District, Error, Fingerprint, Job, MapParameters};

/// Finished map image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapImage {
    /// Identity of the rendered request.
    pub fingerprint: Fingerprint,
    /// Encoded PNG bytes.
    pub bytes: Vec<u8>,
    /// When the artifact was stored.
    pub stored_at: DateTime<Utc>,
}

/// Palette choices and class-count limits advertised to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaletteOptions {
    /// Configured named palettes.
    pub palettes: Vec<String>,
    /// Palette applied when a request omits one.
    pub default_palette: String,
    /// Smallest accepted class count.
    pub min_class_count: u8,
    /// Largest accepted class count.
    pub max_class_count: u8,
    /// Class count applied when a request omits one.
    pub default_class_count: u8,
}

/// Port for read-only map queries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MapGenerationQuery: Send + Sync {
    /// Current job for the parameters; `not_found` if never submitted.
    async fn status(&self, parameters: MapParameters) -> Result<Job, Error>;

    /// Finished image; `not_ready` unless the job is `Completed`.
    async fn image(&self, parameters: MapParameters) -> Result<MapImage, Error>;

    /// Finished data table; `not_ready` unless the job is `Completed`.
    async fn data_table(&self, parameters: MapParameters) -> Result<DataTable, Error>;

    /// Renderable districts ordered by code.
    fn districts(&self) -> Vec<District>;

    /// Palette and class-count options.
    fn palette_options(&self) -> PaletteOptions;
}
