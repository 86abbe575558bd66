//! Store behavior against a scripted engine: which bounds reach storage,
//! how often reads are enumerated, and what the write path invokes.

mod common;

use std::sync::Arc;

use commitstore::{
    CommitAttempt, CommitId, Error, EventMessage, OptimisticEventStore, PipelineHooksAwarePersistence,
    Snapshot, StreamRev,
};
use common::*;

fn store_over(
    engine: &Arc<FakePersistence>,
    list: Vec<Arc<RecordingHook>>,
) -> OptimisticEventStore<Arc<FakePersistence>> {
    OptimisticEventStore::new(Arc::clone(engine), hooks(list))
}

fn get_from(min: u64, max: StreamRev) -> Call {
    Call::GetFrom {
        bucket_id: bucket(),
        stream_id: stream(),
        min_revision: rev(min),
        max_revision: max,
    }
}

// =============================================================================
// Creating and Opening Streams
// =============================================================================

#[test]
fn create_stream_is_empty_and_touches_no_storage() {
    let engine = FakePersistence::new();
    let store = store_over(&engine, vec![]);

    let stream = store.create_stream(bucket(), stream());

    assert_eq!(stream.stream_revision(), StreamRev::NONE);
    assert_eq!(stream.commit_sequence(), 0);
    assert!(stream.committed_events().is_empty());
    assert!(stream.uncommitted_events().is_empty());
    assert!(engine.calls().is_empty());
}

#[test]
fn open_empty_stream_from_zero_queries_unbounded() {
    let engine = FakePersistence::new();
    let store = store_over(&engine, vec![]);

    let stream = store
        .open_stream(bucket(), stream(), StreamRev::NONE, StreamRev::NONE)
        .unwrap();

    assert_eq!(stream.stream_revision(), StreamRev::NONE);
    assert!(stream.committed_events().is_empty());
    assert_eq!(engine.get_from_calls(), vec![get_from(0, StreamRev::MAX)]);
}

#[test]
fn open_missing_stream_above_zero_is_not_found() {
    let engine = FakePersistence::new();
    let store = store_over(&engine, vec![]);

    let err = store
        .open_stream(bucket(), stream(), rev(1), StreamRev::NONE)
        .unwrap_err();

    assert!(matches!(err, Error::StreamNotFound { .. }));
}

#[test]
fn open_bounded_range_reads_once_through_hooks() {
    let engine = FakePersistence::new();
    engine.returns_for(
        rev(17),
        rev(42),
        vec![build_commit(20, 5, 4), build_commit(42, 6, 22)],
    );
    let log = hook_log();
    let store = store_over(&engine, vec![RecordingHook::new("h1", &log)]);

    let stream = store.open_stream(bucket(), stream(), rev(17), rev(42)).unwrap();

    assert_eq!(engine.get_from_calls(), vec![get_from(17, rev(42))]);
    assert_eq!(engine.produced(), 2);
    assert_eq!(entries(&log), vec!["h1:select", "h1:select"]);
    assert_eq!(stream.stream_revision(), rev(42));
    assert_eq!(stream.commit_sequence(), 6);
    assert_eq!(stream.committed_events().len(), 26);
}

#[test]
fn open_from_revision_has_no_upper_bound() {
    let engine = FakePersistence::new();
    engine.returns_for(rev(3), StreamRev::MAX, vec![build_commit(4, 2, 2)]);
    let store = store_over(&engine, vec![]);

    let stream = store
        .open_stream_from_revision(bucket(), stream(), rev(3))
        .unwrap();

    assert_eq!(engine.get_from_calls(), vec![get_from(3, StreamRev::MAX)]);
    assert_eq!(stream.stream_revision(), rev(4));
    assert_eq!(stream.committed_events().len(), 2);
}

#[test]
fn suppressed_commits_do_not_reach_the_stream() {
    let engine = FakePersistence::new();
    engine.returns_for(rev(0), StreamRev::MAX, vec![build_commit(1, 1, 1)]);
    let log = hook_log();
    let store = store_over(&engine, vec![RecordingHook::suppressing("h1", &log)]);

    let stream = store
        .open_stream(bucket(), stream(), StreamRev::NONE, StreamRev::NONE)
        .unwrap();

    assert_eq!(stream.stream_revision(), StreamRev::NONE);
    assert!(stream.committed_events().is_empty());
}

// =============================================================================
// Opening From Snapshots
// =============================================================================

#[test]
fn open_from_snapshot_queries_from_snapshot_revision() {
    let engine = FakePersistence::new();
    let store = store_over(&engine, vec![]);
    let snapshot = Snapshot::new(bucket(), stream(), rev(42), b"state".to_vec());

    store.open_stream_from_snapshot(&snapshot, StreamRev::NONE).unwrap();

    assert_eq!(engine.get_from_calls(), vec![get_from(42, StreamRev::MAX)]);
}

#[test]
fn open_from_snapshot_at_head() {
    let engine = FakePersistence::new();
    engine.returns_for(rev(42), StreamRev::MAX, vec![build_commit(42, 15, 1)]);
    let store = store_over(&engine, vec![]);
    let snapshot = Snapshot::new(bucket(), stream(), rev(42), b"state".to_vec());

    let stream = store.open_stream_from_snapshot(&snapshot, StreamRev::NONE).unwrap();

    assert_eq!(engine.get_from_calls().len(), 1);
    assert_eq!(engine.produced(), 1);
    assert_eq!(stream.stream_revision(), rev(42));
    assert_eq!(stream.commit_sequence(), 15);
    assert!(stream.committed_events().is_empty());
}

#[test]
fn open_from_snapshot_adds_later_events() {
    let engine = FakePersistence::new();
    engine.returns_for(
        rev(10),
        StreamRev::MAX,
        vec![build_commit(11, 4, 2), build_commit(13, 5, 2)],
    );
    let store = store_over(&engine, vec![]);
    let snapshot = Snapshot::new(bucket(), stream(), rev(10), Vec::new());

    let stream = store.open_stream_from_snapshot(&snapshot, StreamRev::NONE).unwrap();

    // Commit 4 spans revisions 10..=11; only 11 is past the snapshot.
    assert_eq!(stream.committed_events().len(), 3);
    assert_eq!(stream.stream_revision(), rev(13));
    assert_eq!(stream.commit_sequence(), 5);
}

#[test]
fn open_from_absent_snapshot_is_argument_error() {
    let engine = FakePersistence::new();
    let store = store_over(&engine, vec![]);

    let err = store
        .open_stream_from_snapshot(None::<&Snapshot>, StreamRev::NONE)
        .unwrap_err();

    assert!(matches!(err, Error::Argument { name: "snapshot", .. }));
    assert!(engine.calls().is_empty());
}

// =============================================================================
// Committing
// =============================================================================

#[test]
fn commit_absent_attempt_is_argument_error() {
    let engine = FakePersistence::new();
    let log = hook_log();
    let store = store_over(&engine, vec![RecordingHook::new("h1", &log)]);

    let err = store.commit(None::<&CommitAttempt>).unwrap_err();

    assert!(matches!(err, Error::Argument { name: "attempt", .. }));
    assert!(engine.calls().is_empty());
    assert!(entries(&log).is_empty());
}

#[test]
fn commit_runs_pre_backend_post_once_each() {
    let engine = FakePersistence::new();
    let log = hook_log();
    let store = store_over(&engine, vec![RecordingHook::new("h1", &log)]);
    let attempt = build_attempt(1, 1);

    let commit = store.commit(&attempt).unwrap().expect("not vetoed");

    assert_eq!(commit.commit_id(), attempt.commit_id());
    assert_eq!(engine.commit_calls(), 1);
    assert_eq!(entries(&log), vec!["h1:pre_commit", "h1:post_commit"]);
}

#[test]
fn vetoed_commit_never_reaches_backend() {
    let engine = FakePersistence::new();
    let log = hook_log();
    let store = store_over(&engine, vec![RecordingHook::vetoing("h1", &log)]);

    let result = store.commit(&build_attempt(1, 1)).unwrap();

    assert!(result.is_none());
    assert_eq!(engine.commit_calls(), 0);
    assert_eq!(entries(&log), vec!["h1:pre_commit"]);
}

#[test]
fn engine_errors_surface_unchanged() {
    let engine = FakePersistence::new();
    engine.fail_commits_with(|attempt| Error::Conflict {
        bucket_id: attempt.bucket_id().to_string(),
        stream_id: attempt.stream_id().to_string(),
        commit_sequence: attempt.commit_sequence(),
    });
    let store = store_over(&engine, vec![]);

    let err = store.commit(&build_attempt(5, 3)).unwrap_err();

    assert!(matches!(err, Error::Conflict { commit_sequence: 3, .. }));
}

#[test]
fn commit_changes_moves_staged_events_into_history() {
    let engine = FakePersistence::new();
    let store = store_over(&engine, vec![]);
    let mut stream = store.create_stream(bucket(), stream());
    stream.add(EventMessage::new(b"a".to_vec()));
    stream.add(EventMessage::new(b"b".to_vec()));
    stream.add_header("user", "alice");
    let commit_id = CommitId::new();

    let commit = store.commit_changes(&mut stream, commit_id).unwrap().unwrap();

    assert_eq!(commit.stream_revision(), rev(2));
    assert_eq!(commit.commit_sequence(), 1);
    assert_eq!(commit.headers()["user"], "alice");
    assert_eq!(stream.stream_revision(), rev(2));
    assert_eq!(stream.commit_sequence(), 1);
    assert_eq!(stream.committed_events().len(), 2);
    assert!(stream.uncommitted_events().is_empty());
    assert!(stream.contains_commit(&commit_id));
}

#[test]
fn commit_changes_with_nothing_staged_skips_storage() {
    let engine = FakePersistence::new();
    let store = store_over(&engine, vec![]);
    let mut stream = store.create_stream(bucket(), stream());

    assert!(store.commit_changes(&mut stream, CommitId::new()).unwrap().is_none());
    assert_eq!(engine.commit_calls(), 0);
}

#[test]
fn commit_changes_keeps_staged_events_on_veto() {
    let engine = FakePersistence::new();
    let log = hook_log();
    let store = store_over(&engine, vec![RecordingHook::vetoing("h1", &log)]);
    let mut stream = store.create_stream(bucket(), stream());
    stream.add(EventMessage::new(b"a".to_vec()));

    assert!(store.commit_changes(&mut stream, CommitId::new()).unwrap().is_none());
    assert_eq!(stream.uncommitted_events().len(), 1);
    assert_eq!(stream.stream_revision(), StreamRev::NONE);
}

// =============================================================================
// Advanced Access and Disposal
// =============================================================================

#[test]
fn advanced_exposes_hook_aware_persistence() {
    let engine = FakePersistence::new();
    let log = hook_log();
    let store = store_over(&engine, vec![RecordingHook::new("h1", &log)]);

    let advanced: &PipelineHooksAwarePersistence<Arc<FakePersistence>> = store.advanced();

    assert_eq!(advanced.hooks().len(), 1);
    assert!(Arc::ptr_eq(advanced.inner(), &engine));
}

#[test]
fn dispose_twice_disposes_engine_once() {
    let engine = FakePersistence::new();
    let store = store_over(&engine, vec![]);

    store.dispose();
    store.dispose();

    assert!(store.is_disposed());
    assert_eq!(engine.disposals(), 1);
}

#[test]
fn dispose_cascades_to_hooks_after_engine() {
    let engine = FakePersistence::new();
    let log = hook_log();
    let store = store_over(
        &engine,
        vec![RecordingHook::new("h1", &log), RecordingHook::new("h2", &log)],
    );

    store.dispose();

    assert_eq!(engine.disposals(), 1);
    assert_eq!(entries(&log), vec!["h1:dispose", "h2:dispose"]);
}

#[test]
fn drop_disposes() {
    let engine = FakePersistence::new();
    {
        let _store = store_over(&engine, vec![]);
    }
    assert_eq!(engine.disposals(), 1);
}
