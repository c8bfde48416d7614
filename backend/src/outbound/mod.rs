//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **artifact_store**: filesystem and in-memory artifact persistence
//! - **renderer**: external-command map renderer
//! - **metrics**: Prometheus-backed render job metrics (feature-gated)
//!
//! Adapters translate between domain types and infrastructure
//! representations. They contain no business logic.

pub mod artifact_store;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod renderer;
