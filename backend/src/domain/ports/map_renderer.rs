//! Driven port for the opaque map rendering routine.
//!
//! Implementations receive a validated request and return the image bytes
//! and data table. They may block, fail in arbitrary ways, or take arbitrarily
//! long: the domain's render adapter wraps every call with a timeout and
//! classifies failures, so implementations only report what went wrong.

use async_trait::async_trait;
use serde_json::json;

use super::define_port_error;
use crate::domain::{DataTable, GenerationRequest, Palette, TableColumn};

define_port_error! {
    /// Errors reported by map renderers and the render adapter.
    pub enum RenderError {
        /// The renderer reported a failure.
        Failed { message: String } => "render failed: {message}",
        /// The renderer produced output the core cannot use.
        InvalidOutput { message: String } => "renderer produced invalid output: {message}",
        /// The renderer exceeded the configured timeout.
        TimedOut { timeout_ms: u64 } => "render timed out after {timeout_ms} ms",
        /// The renderer panicked.
        Panicked { message: String } => "renderer panicked: {message}",
    }
}

/// Output of a successful render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMap {
    /// Encoded PNG image.
    pub image: Vec<u8>,
    /// Data behind the map.
    pub table: DataTable,
}

/// Port for the rendering collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MapRenderer: Send + Sync {
    /// Render `request` into an image and data table.
    async fn render(&self, request: &GenerationRequest) -> Result<RenderedMap, RenderError>;
}

/// Smallest valid PNG: a single transparent pixel.
pub const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Deterministic renderer used when no rendering command is configured.
///
/// Produces a placeholder image and a one-row table echoing the request so
/// the whole job pipeline can run without the GIS toolchain.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureMapRenderer;

#[async_trait]
impl MapRenderer for FixtureMapRenderer {
    async fn render(&self, request: &GenerationRequest) -> Result<RenderedMap, RenderError> {
        let palette_kind = match request.palette() {
            Palette::Named(_) => "named",
            Palette::Custom(_) => "custom",
        };
        let table = DataTable::new(
            vec![
                TableColumn {
                    key: "LAU1_CODE".into(),
                    label: "District code (LAU1_CODE)".into(),
                },
                TableColumn {
                    key: "CLASSES".into(),
                    label: "Class count (CLASSES)".into(),
                },
                TableColumn {
                    key: "PALETTE".into(),
                    label: format!("Palette, {palette_kind} (PALETTE)"),
                },
            ],
            vec![vec![
                json!(request.district().as_str()),
                json!(request.class_count()),
                json!(request.palette().to_string()),
            ]],
        )
        .map_err(|err| RenderError::invalid_output(err.to_string()))?;
        Ok(RenderedMap {
            image: PLACEHOLDER_PNG.to_vec(),
            table,
        })
    }
}
