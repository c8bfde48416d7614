//! Render job lifecycle records.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Fingerprint;

/// Lifecycle state of a render job.
///
/// ```text
/// Pending ──claim──▶ Processing ──▶ Completed
///                         └──────▶ Error
/// ```
///
/// `Completed` and `Error` are left only by a resubmission or explicit
/// regeneration, which replaces the job with a fresh `Pending` one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Registered and waiting for a worker.
    Pending,
    /// Owned by exactly one worker.
    Processing,
    /// Artifact persisted and readable.
    Completed,
    /// Rendering or persistence failed; see the job's error detail.
    Error,
}

impl JobState {
    /// Whether the job still occupies its fingerprint's in-flight slot.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Whether the state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Lower-case label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Snapshot of a job as seen by pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Identity of the request the job renders.
    pub fingerprint: Fingerprint,
    /// Current lifecycle state.
    pub state: JobState,
    /// When this attempt was registered.
    pub created_at: DateTime<Utc>,
    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
    /// Failure detail; present only in [`JobState::Error`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}
