//! Artifact store adapters.
//!
//! - [`FilesystemArtifactStore`] persists artifacts under a directory and
//!   survives restarts.
//! - [`InMemoryArtifactStore`] keeps them in process memory for tests and
//!   throwaway runs.

mod filesystem;
mod memory;

pub use filesystem::FilesystemArtifactStore;
pub use memory::InMemoryArtifactStore;
