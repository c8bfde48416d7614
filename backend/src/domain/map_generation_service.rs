//! Domain service behind the map submission and polling ports.
//!
//! Composes the fingerprint builder, job registry and artifact store. The
//! service never renders anything itself: submissions only register work for
//! the scheduler, and every query is a read of the registry and the store.
//!
//! Retention: an artifact older than the configured window is treated as
//! absent. Lookups that find a `Completed` record backed by an expired or
//! missing artifact forget the record, so the next submission renders afresh.
//! The periodic sweep also forgets `Completed` and `Error` records that have
//! not changed within the window.
//!
//! Store reads race with workers finishing renders, so every read is paired
//! with the registry record version seen before it. The registry ignores a
//! read taken against a record that has since changed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::domain::ports::{
    Artifact, ArtifactMetadata, ArtifactStore, ArtifactStoreError, MapGenerationCommand,
    MapGenerationQuery, MapImage, MapSubmission, PaletteOptions, SubmissionReceipt,
};
use crate::domain::{
    DataTable, District, Error, Fingerprint, FingerprintBuilder, Job, JobRegistry, JobSnapshot,
    JobState, KeyedRequest, MapParameters, RequestValidationError, StoreEvidence, StoredArtifact,
};

/// Map generation service implementing the driving ports.
#[derive(Clone)]
pub struct MapGenerationService {
    builder: FingerprintBuilder,
    registry: Arc<JobRegistry>,
    store: Arc<dyn ArtifactStore>,
    clock: Arc<dyn Clock>,
    retention: Option<Duration>,
}

impl MapGenerationService {
    /// Create a service keeping artifacts forever.
    pub fn new(
        builder: FingerprintBuilder,
        registry: Arc<JobRegistry>,
        store: Arc<dyn ArtifactStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            builder,
            registry,
            store,
            clock,
            retention: None,
        }
    }

    /// Treat artifacts older than `retention` as absent. `None` keeps them
    /// forever.
    #[must_use]
    pub fn with_retention(mut self, retention: Option<Duration>) -> Self {
        self.retention = retention;
        self
    }

    /// Forget stale terminal jobs and delete expired artifacts.
    ///
    /// `Completed` and `Error` records unchanged for the whole retention
    /// window are dropped from the registry. Artifact deletion is conditional
    /// on the artifact version, so an artifact rewritten by a concurrent
    /// render survives the sweep. Returns the number of artifacts removed.
    ///
    /// # Errors
    /// Returns `service_unavailable` when the store cannot be listed.
    pub async fn sweep_expired(&self) -> Result<usize, Error> {
        let Some(cutoff) = self.retention_cutoff() else {
            return Ok(0);
        };
        let forgotten = self.registry.forget_terminal_before(cutoff);
        let listed = self.store.list().await.map_err(store_unavailable)?;
        let mut removed = 0;
        for metadata in listed.iter().filter(|metadata| metadata.stored_at <= cutoff) {
            match self
                .store
                .remove(&metadata.fingerprint, &metadata.version)
                .await
            {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(store_error) => warn!(
                    fingerprint = %metadata.fingerprint,
                    error = %store_error,
                    "failed to remove expired artifact"
                ),
            }
        }
        if removed > 0 || forgotten > 0 {
            info!(removed, forgotten, "expired artifacts swept");
        }
        Ok(removed)
    }

    fn keyed(&self, parameters: &MapParameters) -> Result<KeyedRequest, Error> {
        self.builder.build(parameters).map_err(invalid_request)
    }

    /// Anything stored or updated at or before this instant has expired.
    fn retention_cutoff(&self) -> Option<DateTime<Utc>> {
        let window = TimeDelta::from_std(self.retention?).ok()?;
        self.clock.utc().checked_sub_signed(window)
    }

    fn is_expired(&self, metadata: &ArtifactMetadata) -> bool {
        self.retention_cutoff()
            .is_some_and(|cutoff| metadata.stored_at <= cutoff)
    }

    async fn stored_artifact(&self, fingerprint: &Fingerprint) -> Result<StoredArtifact, Error> {
        let metadata = self
            .store
            .metadata(fingerprint)
            .await
            .map_err(store_unavailable)?;
        Ok(match metadata {
            Some(metadata) if !self.is_expired(&metadata) => StoredArtifact::Valid,
            _ => StoredArtifact::Absent,
        })
    }

    async fn lookup_job(&self, fingerprint: &Fingerprint) -> Result<JobSnapshot, Error> {
        if let Some(snapshot) = self.registry.observe(fingerprint) {
            if snapshot.job.state == JobState::Completed
                && self.stored_artifact(fingerprint).await? == StoredArtifact::Absent
            {
                self.registry.forget_completed(fingerprint, snapshot.version);
                return Err(expired(fingerprint));
            }
            return Ok(snapshot);
        }
        match self.stored_artifact(fingerprint).await? {
            StoredArtifact::Valid => {
                debug!(%fingerprint, "restoring completed job from artifact store");
                Ok(self.registry.restore_completed(fingerprint))
            }
            StoredArtifact::Absent => Err(Error::not_found(
                "no map has been requested for these parameters",
            )
            .with_details(json!({ "fingerprint": fingerprint }))),
        }
    }

    async fn completed_artifact(&self, parameters: &MapParameters) -> Result<Artifact, Error> {
        let keyed = self.keyed(parameters)?;
        let fingerprint = keyed.fingerprint;
        let snapshot = self.lookup_job(&fingerprint).await?;
        if snapshot.job.state != JobState::Completed {
            return Err(not_ready(&snapshot.job));
        }
        match self.store.get(&fingerprint).await.map_err(store_unavailable)? {
            Some(artifact) if !self.is_expired(&artifact.metadata) => Ok(artifact),
            _ => {
                self.registry.forget_completed(&fingerprint, snapshot.version);
                Err(expired(&fingerprint))
            }
        }
    }
}

#[async_trait]
impl MapGenerationCommand for MapGenerationService {
    async fn submit(&self, submission: MapSubmission) -> Result<SubmissionReceipt, Error> {
        let keyed = self.keyed(&submission.parameters)?;
        let fingerprint = keyed.fingerprint;
        let submitted = if submission.regenerate {
            self.registry.regenerate(&keyed)
        } else {
            let observed = self.registry.version(&fingerprint);
            let artifact = self.stored_artifact(&fingerprint).await?;
            self.registry.submit(&keyed, StoreEvidence { artifact, observed })
        };
        info!(
            %fingerprint,
            outcome = ?submitted.outcome,
            regenerate = submission.regenerate,
            "map submitted"
        );
        Ok(SubmissionReceipt {
            fingerprint,
            outcome: submitted.outcome,
            job: submitted.job,
        })
    }
}

#[async_trait]
impl MapGenerationQuery for MapGenerationService {
    async fn status(&self, parameters: MapParameters) -> Result<Job, Error> {
        let keyed = self.keyed(&parameters)?;
        Ok(self.lookup_job(&keyed.fingerprint).await?.job)
    }

    async fn image(&self, parameters: MapParameters) -> Result<MapImage, Error> {
        let artifact = self.completed_artifact(&parameters).await?;
        Ok(MapImage {
            fingerprint: artifact.metadata.fingerprint,
            bytes: artifact.image,
            stored_at: artifact.metadata.stored_at,
        })
    }

    async fn data_table(&self, parameters: MapParameters) -> Result<DataTable, Error> {
        Ok(self.completed_artifact(&parameters).await?.table)
    }

    fn districts(&self) -> Vec<District> {
        self.builder.catalog().districts().collect()
    }

    fn palette_options(&self) -> PaletteOptions {
        let catalog = self.builder.catalog();
        PaletteOptions {
            palettes: catalog.palettes().map(str::to_owned).collect(),
            default_palette: catalog.default_palette().to_owned(),
            min_class_count: catalog.bounds().min(),
            max_class_count: catalog.bounds().max(),
            default_class_count: catalog.default_class_count(),
        }
    }
}

fn invalid_request(error: RequestValidationError) -> Error {
    Error::invalid_request(error.to_string()).with_details(json!({ "field": error.field() }))
}

fn not_ready(job: &Job) -> Error {
    let message = match job.state {
        JobState::Error => "map generation failed; submit it again to retry",
        _ => "map is not ready yet",
    };
    Error::not_ready(message).with_details(json!({
        "state": job.state,
        "errorDetail": job.error_detail,
    }))
}

fn expired(fingerprint: &Fingerprint) -> Error {
    Error::not_found("map has expired; submit it again")
        .with_details(json!({ "fingerprint": fingerprint }))
}

fn store_unavailable(error: ArtifactStoreError) -> Error {
    warn!(error = %error, kind = error.kind(), "artifact store unavailable");
    Error::service_unavailable("artifact store is unavailable")
}
