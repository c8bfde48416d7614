//! Process-local artifact store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::Fingerprint;
use crate::domain::ports::{
    Artifact, ArtifactMetadata, ArtifactStore, ArtifactStoreError, NewArtifact,
};

/// Artifact store backed by a mutex-guarded map.
///
/// Every `put` swaps the whole entry under the lock, so readers see either
/// the previous artifact or the new one.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: Mutex<HashMap<Fingerprint, Artifact>>,
}

impl InMemoryArtifactStore {
    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, Artifact>> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, artifact: NewArtifact<'_>) -> Result<ArtifactMetadata, ArtifactStoreError> {
        let metadata = ArtifactMetadata {
            fingerprint: artifact.fingerprint,
            version: Uuid::new_v4().simple().to_string(),
            stored_at: artifact.stored_at,
            image_bytes: u64::try_from(artifact.image.len()).unwrap_or(u64::MAX),
            row_count: artifact.table.row_count(),
        };
        self.lock().insert(
            artifact.fingerprint,
            Artifact {
                metadata: metadata.clone(),
                image: artifact.image.to_vec(),
                table: artifact.table.clone(),
            },
        );
        Ok(metadata)
    }

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Artifact>, ArtifactStoreError> {
        Ok(self.lock().get(fingerprint).cloned())
    }

    async fn metadata(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<ArtifactMetadata>, ArtifactStoreError> {
        Ok(self
            .lock()
            .get(fingerprint)
            .map(|artifact| artifact.metadata.clone()))
    }

    async fn list(&self) -> Result<Vec<ArtifactMetadata>, ArtifactStoreError> {
        Ok(self
            .lock()
            .values()
            .map(|artifact| artifact.metadata.clone())
            .collect())
    }

    async fn remove(
        &self,
        fingerprint: &Fingerprint,
        version: &str,
    ) -> Result<bool, ArtifactStoreError> {
        let mut artifacts = self.lock();
        let is_current = artifacts
            .get(fingerprint)
            .is_some_and(|artifact| artifact.metadata.version == version);
        if is_current {
            artifacts.remove(fingerprint);
        }
        Ok(is_current)
    }
}
