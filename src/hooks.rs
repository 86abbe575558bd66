//! # Pipeline Hooks
//!
//! Hooks inject cross-cutting behavior (auditing, filtering, dispatch on
//! commit) into every read and write without the store or the engine knowing
//! about them. The [`PipelineHooksAwarePersistence`] decorator is the only
//! component that calls them.
//!
//! Every method has a no-op default, so a hook implements only what it needs.
//!
//! [`PipelineHooksAwarePersistence`]: crate::pipeline::PipelineHooksAwarePersistence

use crate::commit::{Commit, CommitAttempt};
use crate::types::{BucketId, StreamId};

/// Intercepts commits as they are read and written.
pub trait PipelineHook: Send + Sync {
    /// Called for every commit read from storage.
    ///
    /// Return the commit (possibly transformed) to keep it, or `None` to
    /// remove it from the result. A suppressed commit is not passed to later
    /// hooks.
    fn select(&self, commit: Commit) -> Option<Commit> {
        Some(commit)
    }

    /// Called before an attempt reaches storage. Returning false vetoes it.
    fn pre_commit(&self, _attempt: &CommitAttempt) -> bool {
        true
    }

    /// Called after an attempt was durably committed.
    fn post_commit(&self, _commit: &Commit) {}

    /// Called after storage was purged; `None` means every bucket.
    fn on_purge(&self, _bucket_id: Option<&BucketId>) {}

    /// Called after a stream was deleted.
    fn on_delete_stream(&self, _bucket_id: &BucketId, _stream_id: &StreamId) {}

    /// Called once when the owning store is disposed.
    fn dispose(&self) {}
}
