//! Behavioural coverage for the job registry state machine.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rstest::{fixture, rstest};

use super::*;
use crate::domain::{ClassCountBounds, District, FingerprintBuilder, MapCatalog, MapParameters};
use crate::test_support::MutableClock;

#[fixture]
fn clock() -> Arc<MutableClock> {
    let start = Utc
        .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
        .single()
        .expect("valid fixture time");
    Arc::new(MutableClock::new(start))
}

#[fixture]
fn registry(clock: Arc<MutableClock>) -> JobRegistry {
    JobRegistry::new(clock)
}

fn keyed(district: &str, classes: i64, palette: &str) -> KeyedRequest {
    let catalog = MapCatalog::new(
        ["D1", "D2"].map(|code| District {
            code: code.to_owned(),
            name: code.to_owned(),
        }),
        ["viridis", "plasma"].map(str::to_owned),
        ClassCountBounds::default(),
    )
    .expect("fixture catalog is valid");
    FingerprintBuilder::new(Arc::new(catalog))
        .build(&MapParameters::new(district, classes, palette))
        .expect("fixture request is valid")
}

/// Submit with a store read taken against the current record.
fn submit_fresh(
    registry: &JobRegistry,
    keyed: &KeyedRequest,
    artifact: StoredArtifact,
) -> SubmitOutcome {
    let observed = registry.version(&keyed.fingerprint);
    registry
        .submit(keyed, StoreEvidence { artifact, observed })
        .outcome
}

fn complete(registry: &JobRegistry, keyed: &KeyedRequest) -> Job {
    registry.claim().expect("claimable");
    registry
        .mark_completed(&keyed.fingerprint)
        .expect("processing job completes")
}

fn state_of(registry: &JobRegistry, keyed: &KeyedRequest) -> Option<JobState> {
    registry.status(&keyed.fingerprint).map(|job| job.state)
}

#[rstest]
fn submit_creates_pending_job(registry: JobRegistry) {
    let request = keyed("D1", 5, "viridis");

    let outcome = submit_fresh(&registry, &request, StoredArtifact::Absent);

    assert_eq!(outcome, SubmitOutcome::Created);
    assert_eq!(state_of(&registry, &request), Some(JobState::Pending));
    assert_eq!(registry.pending_count(), 1);
}

#[rstest]
fn duplicate_submit_is_in_flight(registry: JobRegistry) {
    let request = keyed("D1", 5, "viridis");
    submit_fresh(&registry, &request, StoredArtifact::Absent);

    assert_eq!(
        submit_fresh(&registry, &request, StoredArtifact::Absent),
        SubmitOutcome::AlreadyInFlight
    );
    registry.claim().expect("job is claimable");
    assert_eq!(
        submit_fresh(&registry, &request, StoredArtifact::Absent),
        SubmitOutcome::AlreadyInFlight
    );
    assert_eq!(registry.pending_count(), 0);
}

#[rstest]
fn claim_hands_out_each_job_once_in_fifo_order(registry: JobRegistry) {
    let first = keyed("D1", 5, "viridis");
    let second = keyed("D2", 3, "plasma");
    submit_fresh(&registry, &first, StoredArtifact::Absent);
    submit_fresh(&registry, &second, StoredArtifact::Absent);

    let claimed: Vec<_> = std::iter::from_fn(|| registry.claim())
        .map(|job| job.fingerprint)
        .collect();

    assert_eq!(claimed, vec![first.fingerprint, second.fingerprint]);
    assert_eq!(state_of(&registry, &first), Some(JobState::Processing));
}

#[rstest]
fn claimed_job_carries_request(registry: JobRegistry) {
    let request = keyed("D2", 3, "plasma");
    submit_fresh(&registry, &request, StoredArtifact::Absent);

    let claimed = registry.claim().expect("job is claimable");

    assert_eq!(claimed.request, request.request);
}

#[rstest]
fn completed_job_with_valid_artifact_short_circuits(registry: JobRegistry) {
    let request = keyed("D1", 5, "viridis");
    submit_fresh(&registry, &request, StoredArtifact::Absent);
    registry.claim().expect("claimable");
    registry
        .mark_completed(&request.fingerprint)
        .expect("processing job completes");

    assert_eq!(
        submit_fresh(&registry, &request, StoredArtifact::Valid),
        SubmitOutcome::AlreadyCompleted
    );
    assert!(registry.claim().is_none());
}

#[rstest]
fn completed_job_with_expired_artifact_is_rendered_again(registry: JobRegistry) {
    let request = keyed("D1", 5, "viridis");
    submit_fresh(&registry, &request, StoredArtifact::Absent);
    registry.claim().expect("claimable");
    registry.mark_completed(&request.fingerprint).expect("completes");

    assert_eq!(
        submit_fresh(&registry, &request, StoredArtifact::Absent),
        SubmitOutcome::Created
    );
    assert_eq!(state_of(&registry, &request), Some(JobState::Pending));
}

#[rstest]
fn stored_artifact_without_record_is_restored(registry: JobRegistry) {
    let request = keyed("D2", 3, "plasma");

    let outcome = submit_fresh(&registry, &request, StoredArtifact::Valid);

    assert_eq!(outcome, SubmitOutcome::AlreadyCompleted);
    assert_eq!(state_of(&registry, &request), Some(JobState::Completed));
}

#[rstest]
fn error_job_is_replaced_by_fresh_pending_on_resubmit(
    clock: Arc<MutableClock>,
) {
    let registry = JobRegistry::new(clock.clone());
    let request = keyed("D2", 3, "plasma");
    submit_fresh(&registry, &request, StoredArtifact::Absent);
    registry.claim().expect("claimable");
    let failed = registry
        .mark_error(&request.fingerprint, "renderer exploded")
        .expect("processing job fails");
    assert_eq!(failed.error_detail.as_deref(), Some("renderer exploded"));

    clock.advance_seconds(30);
    let outcome = submit_fresh(&registry, &request, StoredArtifact::Absent);

    let job = registry.status(&request.fingerprint).expect("job exists");
    assert_eq!(outcome, SubmitOutcome::Created);
    assert_eq!(job.state, JobState::Pending);
    assert!(job.error_detail.is_none());
    assert!(job.created_at > failed.created_at);
}

#[rstest]
fn regenerate_replaces_completed_job(registry: JobRegistry) {
    let request = keyed("D1", 5, "viridis");
    submit_fresh(&registry, &request, StoredArtifact::Absent);
    registry.claim().expect("claimable");
    registry.mark_completed(&request.fingerprint).expect("completes");

    assert_eq!(registry.regenerate(&request).outcome, SubmitOutcome::Created);
    assert_eq!(state_of(&registry, &request), Some(JobState::Pending));
}

#[rstest]
fn regenerate_leaves_in_flight_job_alone(registry: JobRegistry) {
    let request = keyed("D1", 5, "viridis");
    submit_fresh(&registry, &request, StoredArtifact::Absent);

    assert_eq!(
        registry.regenerate(&request).outcome,
        SubmitOutcome::AlreadyInFlight
    );
    assert_eq!(registry.pending_count(), 1);
}

#[rstest]
#[case::never_submitted(false)]
#[case::still_pending(true)]
fn terminal_marks_require_processing_job(registry: JobRegistry, #[case] submit_first: bool) {
    let request = keyed("D1", 5, "viridis");
    if submit_first {
        submit_fresh(&registry, &request, StoredArtifact::Absent);
    }

    let expected = RegistryError::UnknownFingerprint {
        fingerprint: request.fingerprint,
    };
    assert_eq!(
        registry.mark_completed(&request.fingerprint),
        Err(expected.clone())
    );
    assert_eq!(registry.mark_error(&request.fingerprint, "late"), Err(expected));
}

#[rstest]
fn terminal_jobs_cannot_be_marked_twice(registry: JobRegistry) {
    let request = keyed("D1", 5, "viridis");
    submit_fresh(&registry, &request, StoredArtifact::Absent);
    registry.claim().expect("claimable");
    registry.mark_completed(&request.fingerprint).expect("completes");

    assert!(registry.mark_error(&request.fingerprint, "late timeout").is_err());
    assert_eq!(state_of(&registry, &request), Some(JobState::Completed));
}

#[rstest]
fn transitions_update_timestamps(clock: Arc<MutableClock>) {
    let registry = JobRegistry::new(clock.clone());
    let request = keyed("D1", 5, "viridis");
    submit_fresh(&registry, &request, StoredArtifact::Absent);
    let submitted = registry.status(&request.fingerprint).expect("job exists");

    clock.advance_seconds(5);
    registry.claim().expect("claimable");
    clock.advance_seconds(5);
    let completed = registry
        .mark_completed(&request.fingerprint)
        .expect("completes");

    assert_eq!(completed.created_at, submitted.created_at);
    assert_eq!(
        (completed.updated_at - completed.created_at).num_seconds(),
        10
    );
}

#[rstest]
fn forget_completed_only_removes_completed_jobs(registry: JobRegistry) {
    let done = keyed("D1", 5, "viridis");
    let waiting = keyed("D2", 3, "plasma");
    submit_fresh(&registry, &done, StoredArtifact::Valid);
    submit_fresh(&registry, &waiting, StoredArtifact::Absent);

    let done_version = registry.version(&done.fingerprint);
    let waiting_version = registry.version(&waiting.fingerprint);

    assert!(!registry.forget_completed(&waiting.fingerprint, waiting_version));
    assert!(registry.forget_completed(&done.fingerprint, done_version));
    assert!(registry.status(&done.fingerprint).is_none());
    assert_eq!(state_of(&registry, &waiting), Some(JobState::Pending));
}

#[rstest]
fn restore_completed_keeps_existing_record(registry: JobRegistry) {
    let request = keyed("D1", 5, "viridis");
    submit_fresh(&registry, &request, StoredArtifact::Absent);

    let restored = registry.restore_completed(&request.fingerprint);

    assert_eq!(restored.job.state, JobState::Pending);
    assert_eq!(restored.version, registry.version(&request.fingerprint));
}

#[rstest]
#[tokio::test]
async fn submit_wakes_a_waiting_worker(registry: JobRegistry) {
    let registry = Arc::new(registry);
    let request = keyed("D1", 5, "viridis");

    submit_fresh(&registry, &request, StoredArtifact::Absent);
    let woke = tokio::time::timeout(
        std::time::Duration::from_millis(100),
        registry.work_available(),
    )
    .await;

    assert!(woke.is_ok(), "stored permit should wake the worker");
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submits_collapse_to_one_job(clock: Arc<MutableClock>) {
    const SUBMITTERS: usize = 64;
    let registry = Arc::new(JobRegistry::new(clock));
    let request = Arc::new(keyed("D1", 5, "viridis"));

    let handles: Vec<_> = (0..SUBMITTERS)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let request = Arc::clone(&request);
            tokio::spawn(async move {
                submit_fresh(&registry, &request, StoredArtifact::Absent)
            })
        })
        .collect();
    let outcomes: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("submit task completes"))
        .collect();

    let created = outcomes
        .iter()
        .filter(|outcome| **outcome == SubmitOutcome::Created)
        .count();
    assert_eq!(created, 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| **outcome == SubmitOutcome::AlreadyInFlight)
            .count(),
        SUBMITTERS - 1
    );
    assert!(registry.claim().is_some());
    assert!(registry.claim().is_none());
}

#[rstest]
fn read_taken_before_completion_does_not_reschedule(registry: JobRegistry) {
    let request = keyed("D1", 5, "viridis");
    submit_fresh(&registry, &request, StoredArtifact::Absent);
    registry.claim().expect("claimable");
    let observed_while_rendering = registry.version(&request.fingerprint);
    registry
        .mark_completed(&request.fingerprint)
        .expect("completes");

    let late = registry.submit(
        &request,
        StoreEvidence {
            artifact: StoredArtifact::Absent,
            observed: observed_while_rendering,
        },
    );

    assert_eq!(late.outcome, SubmitOutcome::AlreadyCompleted);
    assert_eq!(late.job.state, JobState::Completed);
    assert!(registry.claim().is_none());
}

#[rstest]
fn valid_read_against_a_forgotten_record_renders_again(registry: JobRegistry) {
    let request = keyed("D2", 3, "plasma");
    submit_fresh(&registry, &request, StoredArtifact::Valid);
    let observed = registry.version(&request.fingerprint);
    assert!(registry.forget_completed(&request.fingerprint, observed));

    let outcome = registry
        .submit(
            &request,
            StoreEvidence {
                artifact: StoredArtifact::Valid,
                observed,
            },
        )
        .outcome;

    assert_eq!(outcome, SubmitOutcome::Created);
    assert_eq!(state_of(&registry, &request), Some(JobState::Pending));
}

#[rstest]
fn submission_reports_the_job_it_was_decided_on(registry: JobRegistry) {
    let request = keyed("D1", 5, "viridis");
    let created = registry.submit(
        &request,
        StoreEvidence {
            artifact: StoredArtifact::Absent,
            observed: RecordVersion::ABSENT,
        },
    );
    registry.claim().expect("claimable");
    let joined = registry.regenerate(&request);

    assert_eq!(created.outcome, SubmitOutcome::Created);
    assert_eq!(created.job.state, JobState::Pending);
    assert_eq!(joined.outcome, SubmitOutcome::AlreadyInFlight);
    assert_eq!(joined.job.state, JobState::Processing);
}

#[rstest]
fn forget_completed_keeps_a_record_changed_since_observed(registry: JobRegistry) {
    let request = keyed("D1", 5, "viridis");
    submit_fresh(&registry, &request, StoredArtifact::Absent);
    complete(&registry, &request);
    let stale = registry.version(&request.fingerprint);
    registry.regenerate(&request);
    complete(&registry, &request);

    assert!(!registry.forget_completed(&request.fingerprint, stale));
    assert_eq!(state_of(&registry, &request), Some(JobState::Completed));
}

#[rstest]
fn forget_terminal_before_drops_old_terminal_records(clock: Arc<MutableClock>) {
    let registry = JobRegistry::new(clock.clone());
    let old_done = keyed("D1", 5, "viridis");
    let old_failed = keyed("D1", 4, "plasma");
    let recent_done = keyed("D2", 5, "viridis");
    let waiting = keyed("D2", 3, "plasma");
    submit_fresh(&registry, &old_done, StoredArtifact::Absent);
    complete(&registry, &old_done);
    submit_fresh(&registry, &old_failed, StoredArtifact::Absent);
    registry.claim().expect("claimable");
    registry
        .mark_error(&old_failed.fingerprint, "renderer crashed")
        .expect("fails");
    submit_fresh(&registry, &waiting, StoredArtifact::Absent);
    clock.advance_seconds(120);
    let cutoff = clock.utc() - chrono::TimeDelta::seconds(60);
    submit_fresh(&registry, &recent_done, StoredArtifact::Absent);
    registry.claim().expect("waiting job claimed first");
    registry.claim().expect("recent job claimed");
    registry
        .mark_completed(&recent_done.fingerprint)
        .expect("completes");

    let forgotten = registry.forget_terminal_before(cutoff);

    assert_eq!(forgotten, 2);
    assert!(registry.status(&old_done.fingerprint).is_none());
    assert!(registry.status(&old_failed.fingerprint).is_none());
    assert_eq!(state_of(&registry, &recent_done), Some(JobState::Completed));
    assert_eq!(state_of(&registry, &waiting), Some(JobState::Processing));
}

#[rstest]
fn record_limit_evicts_oldest_terminal_records(clock: Arc<MutableClock>) {
    let registry = JobRegistry::new(clock.clone()).with_record_limit(2);
    let oldest = keyed("D1", 2, "viridis");
    let newer = keyed("D1", 3, "viridis");
    let in_flight = keyed("D1", 4, "viridis");
    let incoming = keyed("D1", 5, "viridis");
    for request in [&oldest, &newer] {
        submit_fresh(&registry, request, StoredArtifact::Absent);
        complete(&registry, request);
        clock.advance_seconds(1);
    }

    submit_fresh(&registry, &in_flight, StoredArtifact::Absent);
    assert!(registry.status(&oldest.fingerprint).is_none());
    assert_eq!(state_of(&registry, &newer), Some(JobState::Completed));

    submit_fresh(&registry, &incoming, StoredArtifact::Absent);
    assert!(registry.status(&newer.fingerprint).is_none());
    assert_eq!(registry.record_count(), 2);

    let beyond = keyed("D2", 5, "viridis");
    submit_fresh(&registry, &beyond, StoredArtifact::Absent);
    assert_eq!(registry.record_count(), 3, "in-flight jobs are never evicted");
}
