//! Domain ports and supporting types for the hexagonal boundary.
//!
//! Driven ports (`MapRenderer`, `ArtifactStore`, `RenderJobMetrics`) are
//! implemented by outbound adapters. Driving ports (`MapGenerationCommand`,
//! `MapGenerationQuery`) are implemented by the domain and consumed by the
//! HTTP adapter.

mod macros;
pub(crate) use macros::define_port_error;

mod artifact_store;
mod map_generation_command;
mod map_generation_query;
mod map_renderer;
mod render_job_metrics;

pub use artifact_store::{
    Artifact, ArtifactMetadata, ArtifactStore, ArtifactStoreError, NewArtifact,
};
#[cfg(test)]
pub use map_generation_command::MockMapGenerationCommand;
pub use map_generation_command::{MapGenerationCommand, MapSubmission, SubmissionReceipt};
#[cfg(test)]
pub use map_generation_query::MockMapGenerationQuery;
pub use map_generation_query::{MapGenerationQuery, MapImage, PaletteOptions};
#[cfg(test)]
pub use map_renderer::MockMapRenderer;
pub use map_renderer::{FixtureMapRenderer, MapRenderer, PLACEHOLDER_PNG, RenderError, RenderedMap};
#[cfg(test)]
pub use render_job_metrics::MockRenderJobMetrics;
pub use render_job_metrics::{
    NoOpRenderJobMetrics, RenderJobFailure, RenderJobFailureKind, RenderJobMetrics,
    RenderJobMetricsError, RenderJobSuccess,
};
