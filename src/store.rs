//! # Optimistic Event Store
//!
//! The façade callers use: create and open streams, commit attempts, and read
//! raw commits. All storage access goes through a
//! [`PipelineHooksAwarePersistence`] decorator built at construction time.
//!
//! ```text
//!   caller ──► OptimisticEventStore ──► PipelineHooksAwarePersistence ──► engine
//!                   │                         (select / pre / post)
//!                   └── folds commits into EventStream
//! ```
//!
//! ## Concurrency
//!
//! The store holds no mutable state besides its disposal flag, so one store
//! can be shared across threads. Optimistic concurrency is entirely the
//! engine's job: the store never locks, never retries, and never merges. A
//! conflict reaches the caller unchanged, who re-opens the stream and retries
//! the business operation.
//!
//! ## Stream Lifecycle
//!
//! ```text
//!   nonexistent ──create_stream──► created (revision 0)
//!   nonexistent ──open_stream────► opened (revision = head of persisted commits)
//!   created | opened ──commit────► committed (revision += events, sequence += 1)
//! ```
//!
//! The store keeps nothing per stream between calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::commit::{Commit, CommitAttempt, Snapshot};
use crate::error::{Error, Result};
use crate::hooks::PipelineHook;
use crate::persistence::{Commits, PersistStreams};
use crate::pipeline::PipelineHooksAwarePersistence;
use crate::stream::EventStream;
use crate::types::{BucketId, CommitId, StreamId, StreamRev};

/// Event store with optimistic concurrency over a pluggable engine.
pub struct OptimisticEventStore<P: PersistStreams> {
    persistence: PipelineHooksAwarePersistence<P>,
    disposed: AtomicBool,
}

impl<P: PersistStreams> OptimisticEventStore<P> {
    /// Creates a store over `persistence`; `hooks` run in the order given.
    pub fn new(persistence: P, hooks: Vec<Arc<dyn PipelineHook>>) -> Self {
        Self {
            persistence: PipelineHooksAwarePersistence::new(persistence, hooks),
            disposed: AtomicBool::new(false),
        }
    }

    // =========================================================================
    // Streams
    // =========================================================================

    /// Returns a new, empty stream. Storage is not touched.
    pub fn create_stream(
        &self,
        bucket_id: impl Into<BucketId>,
        stream_id: impl Into<StreamId>,
    ) -> EventStream {
        EventStream::new(bucket_id, stream_id)
    }

    /// Opens a stream, reading the commits in `min_revision..=max_revision`.
    ///
    /// A `max_revision` of 0 means "no upper bound".
    ///
    /// # Errors
    ///
    /// - [`Error::StreamNotFound`] if `min_revision > 0` and no commits exist.
    ///   With `min_revision == 0` an empty read yields an empty stream.
    /// - Any error the engine raises while reading.
    pub fn open_stream(
        &self,
        bucket_id: impl Into<BucketId>,
        stream_id: impl Into<StreamId>,
        min_revision: StreamRev,
        max_revision: StreamRev,
    ) -> Result<EventStream> {
        let bucket_id = bucket_id.into();
        let stream_id = stream_id.into();
        let max_revision = max_revision.or_max();

        debug!(%bucket_id, %stream_id, %min_revision, %max_revision, "opening stream");

        let mut commits = self
            .persistence
            .get_from(&bucket_id, &stream_id, min_revision, max_revision)?
            .peekable();

        if !min_revision.is_none() && commits.peek().is_none() {
            return Err(Error::StreamNotFound {
                bucket_id: bucket_id.to_string(),
                stream_id: stream_id.to_string(),
            });
        }

        EventStream::from_commits(bucket_id, stream_id, min_revision, max_revision, commits)
    }

    /// Opens a stream from `min_revision` with no upper bound.
    pub fn open_stream_from_revision(
        &self,
        bucket_id: impl Into<BucketId>,
        stream_id: impl Into<StreamId>,
        min_revision: StreamRev,
    ) -> Result<EventStream> {
        self.open_stream(bucket_id, stream_id, min_revision, StreamRev::MAX)
    }

    /// Opens a stream starting at a snapshot.
    ///
    /// Storage is queried from the snapshot's revision up to `max_revision`
    /// (0 means unbounded). The commits are read exactly once.
    ///
    /// # Errors
    ///
    /// [`Error::Argument`] if `snapshot` is `None`; storage is not touched.
    pub fn open_stream_from_snapshot<'s>(
        &self,
        snapshot: impl Into<Option<&'s Snapshot>>,
        max_revision: StreamRev,
    ) -> Result<EventStream> {
        let snapshot = snapshot
            .into()
            .ok_or_else(|| Error::argument("snapshot", "must be provided"))?;
        let max_revision = max_revision.or_max();

        debug!(
            bucket_id = %snapshot.bucket_id,
            stream_id = %snapshot.stream_id,
            snapshot_revision = %snapshot.stream_revision,
            %max_revision,
            "opening stream from snapshot"
        );

        let commits = self.persistence.get_from(
            &snapshot.bucket_id,
            &snapshot.stream_id,
            snapshot.stream_revision,
            max_revision,
        )?;
        EventStream::from_snapshot(snapshot, max_revision, commits)
    }

    // =========================================================================
    // Raw Commits
    // =========================================================================

    /// Commits of one stream, passed straight through the hook pipeline.
    ///
    /// No stream is built and the bounds are forwarded as given. The result
    /// is lazy; stop iterating to stop reading.
    pub fn get_from(
        &self,
        bucket_id: &BucketId,
        stream_id: &StreamId,
        min_revision: StreamRev,
        max_revision: StreamRev,
    ) -> Result<Commits<'_>> {
        self.persistence
            .get_from(bucket_id, stream_id, min_revision, max_revision)
    }

    /// Commits across all streams strictly after a checkpoint token.
    pub fn get_from_checkpoint(&self, checkpoint_token: Option<&str>) -> Result<Commits<'_>> {
        self.persistence.get_from_checkpoint(checkpoint_token)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Commits an attempt through the hook pipeline.
    ///
    /// Returns `Ok(None)` if a pre-commit hook vetoed the attempt.
    ///
    /// # Errors
    ///
    /// - [`Error::Argument`] if `attempt` is `None`; storage is not touched.
    /// - [`Error::Conflict`], [`Error::DuplicateCommit`] and storage errors
    ///   from the engine, unchanged.
    pub fn commit<'a>(
        &self,
        attempt: impl Into<Option<&'a CommitAttempt>>,
    ) -> Result<Option<Commit>> {
        let attempt = attempt
            .into()
            .ok_or_else(|| Error::argument("attempt", "must be provided"))?;

        debug!(
            bucket_id = %attempt.bucket_id(),
            stream_id = %attempt.stream_id(),
            commit_id = %attempt.commit_id(),
            commit_sequence = attempt.commit_sequence(),
            stream_revision = %attempt.stream_revision(),
            "committing attempt"
        );

        self.persistence.commit(attempt)
    }

    /// Commits the staged changes of `stream` under `commit_id`.
    ///
    /// On success the changes move into the stream's committed history. A
    /// veto (`Ok(None)`) or an error leaves the staged changes in place so
    /// the caller can decide what to do with them. Returns `Ok(None)` without
    /// touching storage when nothing is staged.
    pub fn commit_changes(
        &self,
        stream: &mut EventStream,
        commit_id: CommitId,
    ) -> Result<Option<Commit>> {
        let Some(attempt) = stream.build_attempt(commit_id)? else {
            return Ok(None);
        };

        let committed = self.commit(&attempt)?;
        if let Some(commit) = &committed {
            stream.apply_commit(commit);
        }
        Ok(committed)
    }

    // =========================================================================
    // Advanced
    // =========================================================================

    /// The hook-aware persistence decorator, for engine-specific operations
    /// such as snapshots, purging and stream deletion.
    pub fn advanced(&self) -> &PipelineHooksAwarePersistence<P> {
        &self.persistence
    }

    /// Disposes the engine, then every hook. Only the first call has effect.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down event store");
        self.persistence.dispose();
        for hook in self.persistence.hooks() {
            hook.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl<P: PersistStreams> Drop for OptimisticEventStore<P> {
    fn drop(&mut self) {
        self.dispose();
    }
}
