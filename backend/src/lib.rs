//! Choropleth map generation service.
//!
//! Clients submit a district, class count and palette; the service
//! fingerprints the request, renders it once on a bounded worker pool and
//! serves the cached PNG and data table to pollers.

pub mod config;
pub mod doc;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Public OpenAPI surface used by Swagger UI and tooling.
pub use doc::ApiDoc;
pub use middleware::Trace;
