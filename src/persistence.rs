//! # Persistence Contract
//!
//! [`PersistStreams`] is the single integration surface for a storage
//! technology. Anything that implements it, whether SQL, an object store or a
//! document database, plugs into the store without changes to the core.
//!
//! ## What an Engine Must Guarantee
//!
//! - **Thread safety**: one instance is shared by every caller of the store.
//!   The core performs no locking of its own.
//! - **Optimistic concurrency**: of two attempts racing for the same position
//!   in a stream, exactly one succeeds and the other fails with
//!   [`Error::Conflict`].
//! - **Idempotency**: re-committing a commit id already stored for the stream
//!   fails with [`Error::DuplicateCommit`], never with a conflict.
//! - **Ordering**: stream reads are ascending by revision with inclusive
//!   bounds; global reads are ascending by checkpoint.
//! - **Error translation**: native timeouts and lock contention surface as
//!   [`Error::StorageUnavailable`], everything else as [`Error::Storage`].
//!
//! ## Laziness
//!
//! Reads return [`Commits`], a boxed pull-based iterator. A consumer that
//! takes N commits should cause the engine to produce roughly N commits, not
//! the whole stream, and stopping early is the only form of cancellation.
//!
//! [`Error::Conflict`]: crate::Error::Conflict
//! [`Error::DuplicateCommit`]: crate::Error::DuplicateCommit
//! [`Error::StorageUnavailable`]: crate::Error::StorageUnavailable
//! [`Error::Storage`]: crate::Error::Storage

use std::sync::Arc;

use crate::checkpoint::Checkpoint;
use crate::commit::{Commit, CommitAttempt, Snapshot, StreamHead};
use crate::error::Result;
use crate::types::{BucketId, StreamId, StreamRev};

/// A lazy sequence of commits. Engine failures surface as `Err` items.
pub type Commits<'a> = Box<dyn Iterator<Item = Result<Commit>> + 'a>;

/// A lazy sequence of stream heads.
pub type StreamHeads<'a> = Box<dyn Iterator<Item = Result<StreamHead>> + 'a>;

/// Adapts a storage engine to behave like a set of event streams.
pub trait PersistStreams: Send + Sync {
    /// Prepares the storage for use. Calling it more than once is harmless.
    fn initialize(&self) -> Result<()>;

    /// Durably writes an attempt and returns the resulting commit.
    ///
    /// Engines always return `Some`. `None` is how the hook decorator reports
    /// that a pre-commit hook vetoed the attempt.
    fn commit(&self, attempt: &CommitAttempt) -> Result<Option<Commit>>;

    /// Commits of one stream whose revision range touches
    /// `min_revision..=max_revision`, ascending by revision.
    ///
    /// Callers translate "no upper bound" into [`StreamRev::MAX`] before
    /// calling; engines never see a zero maximum from the store.
    fn get_from(
        &self,
        bucket_id: &BucketId,
        stream_id: &StreamId,
        min_revision: StreamRev,
        max_revision: StreamRev,
    ) -> Result<Commits<'_>>;

    /// Commits in a bucket stamped at or after `start_ms`, in checkpoint order.
    fn get_from_time(&self, bucket_id: &BucketId, start_ms: u64) -> Result<Commits<'_>>;

    /// Commits in a bucket stamped in `start_ms..end_ms`, in checkpoint order.
    fn get_from_to(&self, bucket_id: &BucketId, start_ms: u64, end_ms: u64)
        -> Result<Commits<'_>>;

    /// Commits across all buckets strictly after the checkpoint token, in
    /// checkpoint order. `None` reads from the beginning.
    fn get_from_checkpoint(&self, checkpoint_token: Option<&str>) -> Result<Commits<'_>>;

    /// Parses a token this engine produced into a comparable checkpoint.
    fn get_checkpoint(&self, checkpoint_token: Option<&str>) -> Result<Checkpoint>;

    /// The most recent snapshot at or below `max_revision`.
    fn get_snapshot(
        &self,
        bucket_id: &BucketId,
        stream_id: &StreamId,
        max_revision: StreamRev,
    ) -> Result<Option<Snapshot>>;

    /// Stores a snapshot. Returns false if the stream has no commits.
    fn add_snapshot(&self, snapshot: &Snapshot) -> Result<bool>;

    /// Streams with at least `max_threshold` events since their last snapshot.
    fn get_streams_to_snapshot(
        &self,
        bucket_id: &BucketId,
        max_threshold: u64,
    ) -> Result<StreamHeads<'_>>;

    /// Destroys every stream in every bucket.
    fn purge(&self) -> Result<()>;

    /// Destroys every stream in one bucket.
    fn purge_bucket(&self, bucket_id: &BucketId) -> Result<()>;

    /// Destroys all contents and any storage schema.
    fn drop_storage(&self) -> Result<()>;

    /// Removes one stream with its commits, snapshots and head.
    fn delete_stream(&self, bucket_id: &BucketId, stream_id: &StreamId) -> Result<()>;

    /// Releases the engine's resources. Later calls fail with `Disposed`.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

// =============================================================================
// Shared Engines
// =============================================================================
// A store takes its engine by value. These impls let callers keep a handle
// to the same engine (for tests, or for a polling client next to the store).

macro_rules! forward_persist_streams {
    ($($ty:ty),+) => {$(
        impl<P: PersistStreams + ?Sized> PersistStreams for $ty {
            fn initialize(&self) -> Result<()> {
                (**self).initialize()
            }

            fn commit(&self, attempt: &CommitAttempt) -> Result<Option<Commit>> {
                (**self).commit(attempt)
            }

            fn get_from(
                &self,
                bucket_id: &BucketId,
                stream_id: &StreamId,
                min_revision: StreamRev,
                max_revision: StreamRev,
            ) -> Result<Commits<'_>> {
                (**self).get_from(bucket_id, stream_id, min_revision, max_revision)
            }

            fn get_from_time(&self, bucket_id: &BucketId, start_ms: u64) -> Result<Commits<'_>> {
                (**self).get_from_time(bucket_id, start_ms)
            }

            fn get_from_to(
                &self,
                bucket_id: &BucketId,
                start_ms: u64,
                end_ms: u64,
            ) -> Result<Commits<'_>> {
                (**self).get_from_to(bucket_id, start_ms, end_ms)
            }

            fn get_from_checkpoint(&self, checkpoint_token: Option<&str>) -> Result<Commits<'_>> {
                (**self).get_from_checkpoint(checkpoint_token)
            }

            fn get_checkpoint(&self, checkpoint_token: Option<&str>) -> Result<Checkpoint> {
                (**self).get_checkpoint(checkpoint_token)
            }

            fn get_snapshot(
                &self,
                bucket_id: &BucketId,
                stream_id: &StreamId,
                max_revision: StreamRev,
            ) -> Result<Option<Snapshot>> {
                (**self).get_snapshot(bucket_id, stream_id, max_revision)
            }

            fn add_snapshot(&self, snapshot: &Snapshot) -> Result<bool> {
                (**self).add_snapshot(snapshot)
            }

            fn get_streams_to_snapshot(
                &self,
                bucket_id: &BucketId,
                max_threshold: u64,
            ) -> Result<StreamHeads<'_>> {
                (**self).get_streams_to_snapshot(bucket_id, max_threshold)
            }

            fn purge(&self) -> Result<()> {
                (**self).purge()
            }

            fn purge_bucket(&self, bucket_id: &BucketId) -> Result<()> {
                (**self).purge_bucket(bucket_id)
            }

            fn drop_storage(&self) -> Result<()> {
                (**self).drop_storage()
            }

            fn delete_stream(&self, bucket_id: &BucketId, stream_id: &StreamId) -> Result<()> {
                (**self).delete_stream(bucket_id, stream_id)
            }

            fn dispose(&self) {
                (**self).dispose()
            }

            fn is_disposed(&self) -> bool {
                (**self).is_disposed()
            }
        }
    )+};
}

forward_persist_streams!(Arc<P>, Box<P>);
