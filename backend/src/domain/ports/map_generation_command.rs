//! Driving port for submitting map generation requests.
//!
//! Inbound adapters call [`MapGenerationCommand::submit`] and get an answer
//! immediately: submission registers (or deduplicates) a job and never waits
//! for the renderer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Error, Fingerprint, Job, MapParameters, SubmitOutcome};

/// A client's request to render (or re-render) a map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSubmission {
    /// Requested map parameters.
    #[serde(flatten)]
    pub parameters: MapParameters,
    /// Replace a terminal job with a fresh render.
    #[serde(default)]
    pub regenerate: bool,
}

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// Identity of the request.
    pub fingerprint: Fingerprint,
    /// How the registry handled the submission.
    pub outcome: SubmitOutcome,
    /// Job snapshot immediately after submission.
    pub job: Job,
}

/// Port for map submissions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MapGenerationCommand: Send + Sync {
    /// Validate, fingerprint and register a submission.
    ///
    /// Invalid parameters fail with `invalid_request` before any job exists.
    async fn submit(&self, submission: MapSubmission) -> Result<SubmissionReceipt, Error>;
}
