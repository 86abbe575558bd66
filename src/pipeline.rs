//! # Pipeline-Hooks-Aware Persistence
//!
//! A decorator that wraps one engine and an ordered list of hooks, and is
//! itself a [`PersistStreams`]. It can stand in anywhere an engine is expected.
//!
//! ```text
//!             read path                          write path
//!   engine ──► select(h1) ──► select(h2) ──►     attempt ──► pre_commit(h1) ─┐
//!              (None = drop, stop chain)                     pre_commit(h2) ─┤ all true?
//!                                                                            ▼
//!                                                engine.commit ──► post_commit(h1, h2, ...)
//! ```
//!
//! ## Ordering and Laziness
//!
//! Hooks always run in registration order. Reads are never materialized: the
//! decorator maps the engine's iterator one commit at a time, so a consumer
//! that stops after N commits only pulls N from the engine.
//!
//! ## Failure Semantics
//!
//! - A veto short-circuits: later `pre_commit` hooks and the engine are not
//!   called, no `post_commit` fires, and the result is `Ok(None)`.
//! - An engine error propagates unchanged and no `post_commit` fires.
//! - Disposal reaches the wrapped engine only. Hooks belong to whoever built
//!   the hook list.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::checkpoint::Checkpoint;
use crate::commit::{Commit, CommitAttempt, Snapshot};
use crate::error::Result;
use crate::hooks::PipelineHook;
use crate::persistence::{Commits, PersistStreams, StreamHeads};
use crate::types::{BucketId, StreamId, StreamRev};

/// Applies pipeline hooks around every read and write of an engine.
pub struct PipelineHooksAwarePersistence<P> {
    original: P,
    hooks: Vec<Arc<dyn PipelineHook>>,
}

impl<P: PersistStreams> PipelineHooksAwarePersistence<P> {
    /// Wraps `original`; `hooks` run in the order given.
    pub fn new(original: P, hooks: Vec<Arc<dyn PipelineHook>>) -> Self {
        Self { original, hooks }
    }

    /// The wrapped engine.
    pub fn inner(&self) -> &P {
        &self.original
    }

    /// The registered hooks, in registration order.
    pub fn hooks(&self) -> &[Arc<dyn PipelineHook>] {
        &self.hooks
    }

    /// Runs one commit through every hook's `select`.
    fn filter(&self, commit: Commit) -> Option<Commit> {
        let mut current = commit;
        for hook in &self.hooks {
            let commit_id = current.commit_id();
            match hook.select(current) {
                Some(selected) => current = selected,
                None => {
                    debug!(%commit_id, "commit suppressed by pipeline hook");
                    return None;
                }
            }
        }
        Some(current)
    }

    fn execute_hooks<'a>(&'a self, commits: Commits<'a>) -> Commits<'a> {
        if self.hooks.is_empty() {
            return commits;
        }
        Box::new(commits.filter_map(move |item| match item {
            Ok(commit) => self.filter(commit).map(Ok),
            Err(e) => Some(Err(e)),
        }))
    }
}

impl<P: PersistStreams> PersistStreams for PipelineHooksAwarePersistence<P> {
    fn initialize(&self) -> Result<()> {
        self.original.initialize()
    }

    fn commit(&self, attempt: &CommitAttempt) -> Result<Option<Commit>> {
        // `all` stops at the first veto.
        if !self.hooks.iter().all(|hook| hook.pre_commit(attempt)) {
            warn!(
                bucket_id = %attempt.bucket_id(),
                stream_id = %attempt.stream_id(),
                commit_id = %attempt.commit_id(),
                "commit attempt rejected by pipeline hook"
            );
            return Ok(None);
        }

        let committed = self.original.commit(attempt)?;
        if let Some(commit) = &committed {
            for hook in &self.hooks {
                hook.post_commit(commit);
            }
        }
        Ok(committed)
    }

    fn get_from(
        &self,
        bucket_id: &BucketId,
        stream_id: &StreamId,
        min_revision: StreamRev,
        max_revision: StreamRev,
    ) -> Result<Commits<'_>> {
        let commits = self
            .original
            .get_from(bucket_id, stream_id, min_revision, max_revision)?;
        Ok(self.execute_hooks(commits))
    }

    fn get_from_time(&self, bucket_id: &BucketId, start_ms: u64) -> Result<Commits<'_>> {
        let commits = self.original.get_from_time(bucket_id, start_ms)?;
        Ok(self.execute_hooks(commits))
    }

    fn get_from_to(
        &self,
        bucket_id: &BucketId,
        start_ms: u64,
        end_ms: u64,
    ) -> Result<Commits<'_>> {
        let commits = self.original.get_from_to(bucket_id, start_ms, end_ms)?;
        Ok(self.execute_hooks(commits))
    }

    fn get_from_checkpoint(&self, checkpoint_token: Option<&str>) -> Result<Commits<'_>> {
        let commits = self.original.get_from_checkpoint(checkpoint_token)?;
        Ok(self.execute_hooks(commits))
    }

    fn get_checkpoint(&self, checkpoint_token: Option<&str>) -> Result<Checkpoint> {
        self.original.get_checkpoint(checkpoint_token)
    }

    fn get_snapshot(
        &self,
        bucket_id: &BucketId,
        stream_id: &StreamId,
        max_revision: StreamRev,
    ) -> Result<Option<Snapshot>> {
        self.original.get_snapshot(bucket_id, stream_id, max_revision)
    }

    fn add_snapshot(&self, snapshot: &Snapshot) -> Result<bool> {
        self.original.add_snapshot(snapshot)
    }

    fn get_streams_to_snapshot(
        &self,
        bucket_id: &BucketId,
        max_threshold: u64,
    ) -> Result<StreamHeads<'_>> {
        self.original.get_streams_to_snapshot(bucket_id, max_threshold)
    }

    fn purge(&self) -> Result<()> {
        self.original.purge()?;
        info!("purged all buckets");
        for hook in &self.hooks {
            hook.on_purge(None);
        }
        Ok(())
    }

    fn purge_bucket(&self, bucket_id: &BucketId) -> Result<()> {
        self.original.purge_bucket(bucket_id)?;
        info!(%bucket_id, "purged bucket");
        for hook in &self.hooks {
            hook.on_purge(Some(bucket_id));
        }
        Ok(())
    }

    fn drop_storage(&self) -> Result<()> {
        self.original.drop_storage()?;
        info!("dropped storage");
        Ok(())
    }

    fn delete_stream(&self, bucket_id: &BucketId, stream_id: &StreamId) -> Result<()> {
        self.original.delete_stream(bucket_id, stream_id)?;
        for hook in &self.hooks {
            hook.on_delete_stream(bucket_id, stream_id);
        }
        Ok(())
    }

    fn dispose(&self) {
        self.original.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.original.is_disposed()
    }
}
