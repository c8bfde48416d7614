//! Driven port for durable artifact storage.
//!
//! Contract:
//! - `put` returns only after the artifact is durable and readable, so the
//!   caller may flip the job to `Completed` straight afterwards;
//! - `get` never observes a partially written artifact;
//! - each `put` creates a new version that replaces the previous one for the
//!   same fingerprint as a unit;
//! - `remove` deletes only the named version, so a sweep racing with a fresh
//!   render cannot delete the newer artifact.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::define_port_error;
use crate::domain::{DataTable, Fingerprint};

define_port_error! {
    /// Errors exposed by artifact store adapters.
    pub enum ArtifactStoreError {
        /// Underlying storage failed.
        Io { message: String } => "artifact storage failed: {message}",
        /// Stored data could not be decoded.
        Corrupt { message: String } => "stored artifact is corrupt: {message}",
    }
}

/// Descriptive data about a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    /// Identity of the rendered request.
    pub fingerprint: Fingerprint,
    /// Opaque version label unique per `put`.
    pub version: String,
    /// When the artifact was written.
    pub stored_at: DateTime<Utc>,
    /// Size of the encoded image.
    pub image_bytes: u64,
    /// Number of rows in the data table.
    pub row_count: usize,
}

/// A stored artifact: image plus data table.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Version information.
    pub metadata: ArtifactMetadata,
    /// Encoded PNG image.
    pub image: Vec<u8>,
    /// Data behind the map.
    pub table: DataTable,
}

/// Artifact contents handed to [`ArtifactStore::put`].
#[derive(Debug, Clone, Copy)]
pub struct NewArtifact<'a> {
    /// Identity of the rendered request.
    pub fingerprint: Fingerprint,
    /// Encoded PNG image.
    pub image: &'a [u8],
    /// Data behind the map.
    pub table: &'a DataTable,
    /// Write timestamp recorded in the metadata.
    pub stored_at: DateTime<Utc>,
}

/// Port for artifact persistence keyed by fingerprint.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Durably store a new version of an artifact.
    async fn put(&self, artifact: NewArtifact<'_>) -> Result<ArtifactMetadata, ArtifactStoreError>;

    /// Read the current version of an artifact.
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Artifact>, ArtifactStoreError>;

    /// Read only the metadata of the current version.
    async fn metadata(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<ArtifactMetadata>, ArtifactStoreError>;

    /// List metadata for every stored artifact.
    async fn list(&self) -> Result<Vec<ArtifactMetadata>, ArtifactStoreError>;

    /// Remove `version` of the artifact if it is still current.
    ///
    /// Returns whether anything was removed.
    async fn remove(
        &self,
        fingerprint: &Fingerprint,
        version: &str,
    ) -> Result<bool, ArtifactStoreError>;
}
