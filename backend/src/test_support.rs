//! Test utilities for the choropleth crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`).
//! Compiled for tests and behind the `test-support` feature.

pub mod clock;
pub mod rendering;

pub use clock::MutableClock;
pub use rendering::{
    FailingArtifactStore, RecordingRenderJobMetrics, RenderStep, ScriptedRenderer,
};
