//! In-memory registry of render jobs keyed by fingerprint.
//!
//! The registry is the single source of truth for what is happening right
//! now. Every mutation (submit, regenerate, claim, terminal marks, restore,
//! forget, eviction) runs inside one short critical section on a global
//! mutex, which makes each operation atomic with respect to the fingerprint
//! it touches. No awaits happen while the lock is held, so reads never wait
//! on I/O.
//!
//! Locking discipline:
//! - one `std::sync::Mutex` guards both the job map and the FIFO of pending
//!   work, so a job is `Pending` exactly when it sits in the queue;
//! - a poisoned lock is recovered rather than propagated because every
//!   critical section leaves the state consistent before it can panic.
//!
//! Every mutation of a record stamps it with a fresh [`RecordVersion`].
//! Callers read the version before consulting the artifact store; a store
//! read taken against an older version is not trusted.
//!
//! Terminal records are bounded: [`JobRegistry::forget_terminal_before`]
//! drops those older than a cutoff, and inserting a new record evicts the
//! oldest terminal ones once the record limit is exceeded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use mockable::Clock;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tracing::debug;

use super::{Fingerprint, GenerationRequest, Job, JobState, KeyedRequest, TraceId};

/// Records kept before terminal ones are evicted.
pub const DEFAULT_RECORD_LIMIT: usize = 10_000;

/// Result of registering interest in a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmitOutcome {
    /// A fresh `Pending` job was created.
    Created,
    /// A job for the fingerprint is already `Pending` or `Processing`.
    AlreadyInFlight,
    /// A valid artifact already exists; nothing was scheduled.
    AlreadyCompleted,
}

/// Outcome of a submission together with the job it resolved to.
///
/// Both are taken under the same lock, so the job reflects the state the
/// outcome was decided on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    /// How the submission was resolved.
    pub outcome: SubmitOutcome,
    /// The job the submission created or joined.
    pub job: Job,
}

/// Whether the artifact store holds a valid artifact for a fingerprint.
///
/// Supplied by the caller, which consults the store and the retention policy
/// before entering the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredArtifact {
    /// A readable artifact inside the retention window exists.
    Valid,
    /// No usable artifact exists.
    Absent,
}

/// Identity of one state of a fingerprint's record.
///
/// Two reads returning the same version saw the same record, unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordVersion(Option<u64>);

impl RecordVersion {
    /// Version of a fingerprint with no record.
    pub const ABSENT: Self = Self(None);
}

/// A store read paired with the record version seen before it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreEvidence {
    /// What the store held.
    pub artifact: StoredArtifact,
    /// Record version read before the store was consulted.
    pub observed: RecordVersion,
}

/// A job together with the version of its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    /// The job as recorded.
    pub job: Job,
    /// Version of the record holding it.
    pub version: RecordVersion,
}

/// Internal invariant violations reported by terminal transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No `Processing` job exists for the fingerprint.
    #[error("no processing job for fingerprint {fingerprint}")]
    UnknownFingerprint {
        /// Fingerprint passed to the transition.
        fingerprint: Fingerprint,
    },
}

/// Work handed to a worker by [`JobRegistry::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    /// Identity of the claimed job.
    pub fingerprint: Fingerprint,
    /// Original request parameters.
    pub request: GenerationRequest,
    /// Trace identifier of the submission that created the job.
    pub trace_id: Option<TraceId>,
}

#[derive(Debug)]
struct PendingEntry {
    fingerprint: Fingerprint,
    request: GenerationRequest,
    trace_id: Option<TraceId>,
}

#[derive(Debug)]
struct Record {
    job: Job,
    version: u64,
}

impl Record {
    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job: self.job.clone(),
            version: RecordVersion(Some(self.version)),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    jobs: HashMap<Fingerprint, Record>,
    pending: VecDeque<PendingEntry>,
    last_version: u64,
}

impl RegistryState {
    fn next_version(&mut self) -> u64 {
        self.last_version += 1;
        self.last_version
    }

    fn version_of(&self, fingerprint: &Fingerprint) -> RecordVersion {
        RecordVersion(self.jobs.get(fingerprint).map(|record| record.version))
    }

    fn insert(&mut self, job: Job) -> JobSnapshot {
        let record = Record {
            job,
            version: self.next_version(),
        };
        let snapshot = record.snapshot();
        self.jobs.insert(record.job.fingerprint, record);
        snapshot
    }

    /// Drop the oldest terminal records until at most `limit` remain, or
    /// only in-flight records are left.
    fn evict_over(&mut self, limit: usize) -> usize {
        let excess = self.jobs.len().saturating_sub(limit);
        if excess == 0 {
            return 0;
        }
        let mut terminal: Vec<_> = self
            .jobs
            .values()
            .filter(|record| record.job.state.is_terminal())
            .map(|record| (record.job.updated_at, record.version, record.job.fingerprint))
            .collect();
        terminal.sort_unstable();
        let evicted = terminal.len().min(excess);
        for (_, _, fingerprint) in terminal.into_iter().take(evicted) {
            self.jobs.remove(&fingerprint);
        }
        evicted
    }
}

/// Synchronised job registry shared by request handlers and workers.
pub struct JobRegistry {
    state: Mutex<RegistryState>,
    wake: Notify,
    clock: Arc<dyn Clock>,
    record_limit: usize,
}

impl JobRegistry {
    /// Create an empty registry stamping transitions with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            wake: Notify::new(),
            clock,
            record_limit: DEFAULT_RECORD_LIMIT,
        }
    }

    /// Keep at most `limit` records before evicting the oldest terminal
    /// ones. In-flight jobs are never evicted. A zero limit is raised to one.
    #[must_use]
    pub fn with_record_limit(mut self, limit: usize) -> Self {
        self.record_limit = limit.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a record, making room first when the fingerprint is
    /// new.
    fn insert(&self, state: &mut RegistryState, job: Job) -> JobSnapshot {
        if !state.jobs.contains_key(&job.fingerprint) {
            let evicted = state.evict_over(self.record_limit - 1);
            if evicted > 0 {
                debug!(evicted, "evicted terminal job records over the limit");
            }
        }
        state.insert(job)
    }

    /// Version of the record for `fingerprint`, read before a store lookup.
    pub fn version(&self, fingerprint: &Fingerprint) -> RecordVersion {
        self.lock().version_of(fingerprint)
    }

    /// Register a request, collapsing duplicates onto the existing job.
    ///
    /// - `Pending`/`Processing` job: [`SubmitOutcome::AlreadyInFlight`].
    /// - `Completed` job: [`SubmitOutcome::AlreadyCompleted`] when the store
    ///   read found a valid artifact, or when the record changed after the
    ///   read (a render finished in between, so the read is stale).
    /// - no record and a valid artifact read against no record: the job is
    ///   restored as `Completed` so status polls agree.
    /// - otherwise (no job, expired artifact, or a previous `Error`): a new
    ///   `Pending` job replaces any record and a worker is woken.
    pub fn submit(&self, keyed: &KeyedRequest, evidence: StoreEvidence) -> Submitted {
        let now = self.clock.utc();
        let mut state = self.lock();
        let current = state.version_of(&keyed.fingerprint);
        let fresh_read = current == evidence.observed;
        let valid = evidence.artifact == StoredArtifact::Valid;
        if let Some(record) = state.jobs.get(&keyed.fingerprint) {
            let existing = &record.job;
            if existing.state.is_in_flight() {
                return submitted(SubmitOutcome::AlreadyInFlight, existing);
            }
            if existing.state == JobState::Completed && (valid || !fresh_read) {
                return submitted(SubmitOutcome::AlreadyCompleted, existing);
            }
        } else if valid && fresh_read {
            let restored = self.insert(&mut state, completed_job(keyed.fingerprint, now));
            debug!(fingerprint = %keyed.fingerprint, "restored completed job from stored artifact");
            return Submitted {
                outcome: SubmitOutcome::AlreadyCompleted,
                job: restored.job,
            };
        }
        let job = self.enqueue(&mut state, keyed, now);
        Submitted {
            outcome: SubmitOutcome::Created,
            job,
        }
    }

    /// Replace a terminal job with a fresh `Pending` one.
    ///
    /// In-flight jobs are left alone and reported as
    /// [`SubmitOutcome::AlreadyInFlight`]. The previous artifact stays in the
    /// store until the new render overwrites it.
    pub fn regenerate(&self, keyed: &KeyedRequest) -> Submitted {
        let now = self.clock.utc();
        let mut state = self.lock();
        if let Some(record) = state
            .jobs
            .get(&keyed.fingerprint)
            .filter(|record| record.job.state.is_in_flight())
        {
            return submitted(SubmitOutcome::AlreadyInFlight, &record.job);
        }
        let job = self.enqueue(&mut state, keyed, now);
        Submitted {
            outcome: SubmitOutcome::Created,
            job,
        }
    }

    fn enqueue(
        &self,
        state: &mut RegistryState,
        keyed: &KeyedRequest,
        now: DateTime<Utc>,
    ) -> Job {
        let pending = self.insert(
            state,
            Job {
                fingerprint: keyed.fingerprint,
                state: JobState::Pending,
                created_at: now,
                updated_at: now,
                error_detail: None,
            },
        );
        state.pending.push_back(PendingEntry {
            fingerprint: keyed.fingerprint,
            request: keyed.request.clone(),
            trace_id: TraceId::current(),
        });
        debug!(fingerprint = %keyed.fingerprint, "job pending");
        self.wake.notify_one();
        pending.job
    }

    /// Move the oldest `Pending` job to `Processing` and hand it out.
    pub fn claim(&self) -> Option<ClaimedJob> {
        let now = self.clock.utc();
        let mut state = self.lock();
        while let Some(entry) = state.pending.pop_front() {
            let version = state.next_version();
            let Some(record) = state.jobs.get_mut(&entry.fingerprint) else {
                continue;
            };
            if record.job.state != JobState::Pending {
                continue;
            }
            record.job.state = JobState::Processing;
            record.job.updated_at = now;
            record.version = version;
            debug!(fingerprint = %entry.fingerprint, "job claimed");
            return Some(ClaimedJob {
                fingerprint: entry.fingerprint,
                request: entry.request,
                trace_id: entry.trace_id,
            });
        }
        None
    }

    /// Mark a `Processing` job as `Completed`.
    ///
    /// Call only after the artifact is durably stored.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownFingerprint`] when no `Processing` job
    /// exists for `fingerprint`.
    pub fn mark_completed(&self, fingerprint: &Fingerprint) -> Result<Job, RegistryError> {
        self.finish(fingerprint, JobState::Completed, None)
    }

    /// Mark a `Processing` job as `Error` with a human-readable detail.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownFingerprint`] when no `Processing` job
    /// exists for `fingerprint`.
    pub fn mark_error(
        &self,
        fingerprint: &Fingerprint,
        detail: impl Into<String>,
    ) -> Result<Job, RegistryError> {
        self.finish(fingerprint, JobState::Error, Some(detail.into()))
    }

    fn finish(
        &self,
        fingerprint: &Fingerprint,
        target: JobState,
        detail: Option<String>,
    ) -> Result<Job, RegistryError> {
        let now = self.clock.utc();
        let mut state = self.lock();
        let version = state.next_version();
        let record = state
            .jobs
            .get_mut(fingerprint)
            .filter(|record| record.job.state == JobState::Processing)
            .ok_or(RegistryError::UnknownFingerprint {
                fingerprint: *fingerprint,
            })?;
        record.job.state = target;
        record.job.updated_at = now;
        record.job.error_detail = detail;
        record.version = version;
        debug!(%fingerprint, state = target.as_str(), "job finished");
        Ok(record.job.clone())
    }

    /// Current snapshot of the job for `fingerprint`, if one was ever submitted.
    pub fn status(&self, fingerprint: &Fingerprint) -> Option<Job> {
        self.lock()
            .jobs
            .get(fingerprint)
            .map(|record| record.job.clone())
    }

    /// Current job for `fingerprint` together with its record version.
    pub fn observe(&self, fingerprint: &Fingerprint) -> Option<JobSnapshot> {
        self.lock().jobs.get(fingerprint).map(Record::snapshot)
    }

    /// Record a `Completed` job for an artifact found in the store.
    ///
    /// Used after a restart, when the store outlives the registry. An existing
    /// record always wins and is returned unchanged.
    pub fn restore_completed(&self, fingerprint: &Fingerprint) -> JobSnapshot {
        let now = self.clock.utc();
        let mut state = self.lock();
        if let Some(record) = state.jobs.get(fingerprint) {
            return record.snapshot();
        }
        self.insert(&mut state, completed_job(*fingerprint, now))
    }

    /// Drop a `Completed` record still at version `observed`, returning
    /// whether it was removed.
    ///
    /// Jobs in any other state, or changed since `observed` was read, are
    /// kept.
    pub fn forget_completed(&self, fingerprint: &Fingerprint, observed: RecordVersion) -> bool {
        let mut state = self.lock();
        let unchanged_completed = state.version_of(fingerprint) == observed
            && state
                .jobs
                .get(fingerprint)
                .is_some_and(|record| record.job.state == JobState::Completed);
        if unchanged_completed {
            state.jobs.remove(fingerprint);
        }
        unchanged_completed
    }

    /// Drop terminal records last updated at or before `cutoff`, returning
    /// how many were removed.
    ///
    /// A `Completed` record is updated after its artifact is stored, so a
    /// record older than the retention cutoff only ever points at an expired
    /// artifact.
    pub fn forget_terminal_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.lock();
        let before = state.jobs.len();
        state.jobs.retain(|_, record| {
            record.job.state.is_in_flight() || record.job.updated_at > cutoff
        });
        let forgotten = before - state.jobs.len();
        if forgotten > 0 {
            debug!(forgotten, %cutoff, "forgot terminal job records");
        }
        forgotten
    }

    /// Number of records held, in any state.
    pub fn record_count(&self) -> usize {
        self.lock().jobs.len()
    }

    /// Number of jobs waiting for a worker.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Future resolving when new work may be available.
    ///
    /// Wake-ups are permits: one submitted before a worker starts waiting is
    /// not lost.
    pub fn work_available(&self) -> Notified<'_> {
        self.wake.notified()
    }
}

fn submitted(outcome: SubmitOutcome, job: &Job) -> Submitted {
    Submitted {
        outcome,
        job: job.clone(),
    }
}

fn completed_job(fingerprint: Fingerprint, now: DateTime<Utc>) -> Job {
    Job {
        fingerprint,
        state: JobState::Completed,
        created_at: now,
        updated_at: now,
        error_detail: None,
    }
}

#[cfg(test)]
mod tests;
