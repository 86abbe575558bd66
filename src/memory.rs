//! # In-Memory Persistence
//!
//! A complete [`PersistStreams`] engine that keeps everything in process
//! memory. It is the reference for how an engine honors the contract and the
//! engine of choice for tests and local development.
//!
//! ## State
//!
//! ```text
//!   commits   Vec<Commit>                      checkpoint order (index + 1)
//!   heads     HashMap<(bucket, stream), Head>  last revision / sequence / snapshot
//!   snapshots Vec<Snapshot>
//! ```
//!
//! One `Mutex` guards the whole state, so commit checks and the append happen
//! atomically. Reads copy the matching commits out under the lock and then
//! iterate without holding it.
//!
//! ## Conflict vs Duplicate
//!
//! - Same commit id already stored for the stream: `DuplicateCommit`
//! - Commit sequence or first event revision not past the head: `Conflict`

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use crate::checkpoint::Checkpoint;
use crate::commit::{Commit, CommitAttempt, Snapshot, StreamHead};
use crate::error::{Error, Result};
use crate::persistence::{Commits, PersistStreams, StreamHeads};
use crate::types::{BucketId, StreamId, StreamRev};

type StreamKey = (BucketId, StreamId);

#[derive(Default)]
struct MemoryState {
    commits: Vec<Commit>,
    heads: HashMap<StreamKey, StreamHead>,
    snapshots: Vec<Snapshot>,
    last_checkpoint: Checkpoint,
}

impl MemoryState {
    fn clear(&mut self) {
        self.commits.clear();
        self.heads.clear();
        self.snapshots.clear();
    }
}

/// A thread-safe engine that stores commits in memory.
#[derive(Default)]
pub struct InMemoryPersistence {
    state: Mutex<MemoryState>,
    disposed: AtomicBool,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state, failing once the engine is disposed.
    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        self.state
            .lock()
            .map_err(|_| Error::storage("in-memory state poisoned by a panicked writer"))
    }

    /// Copies the commits matching `predicate` out of the lock.
    fn select_commits<F>(&self, predicate: F) -> Result<Commits<'_>>
    where
        F: Fn(&Commit) -> bool,
    {
        let state = self.state()?;
        let selected: Vec<Commit> = state
            .commits
            .iter()
            .filter(|c| predicate(c))
            .cloned()
            .collect();
        Ok(Box::new(selected.into_iter().map(Ok)))
    }
}

impl PersistStreams for InMemoryPersistence {
    fn initialize(&self) -> Result<()> {
        self.state().map(|_| ())
    }

    fn commit(&self, attempt: &CommitAttempt) -> Result<Option<Commit>> {
        let mut state = self.state()?;

        let key = (attempt.bucket_id().clone(), attempt.stream_id().clone());
        let duplicate = state.commits.iter().any(|c| {
            c.bucket_id() == attempt.bucket_id()
                && c.stream_id() == attempt.stream_id()
                && c.commit_id() == attempt.commit_id()
        });
        if duplicate {
            return Err(Error::DuplicateCommit {
                bucket_id: attempt.bucket_id().to_string(),
                stream_id: attempt.stream_id().to_string(),
                commit_id: attempt.commit_id().to_string(),
            });
        }

        if let Some(head) = state.heads.get(&key) {
            if attempt.commit_sequence() <= head.head_commit_sequence
                || attempt.first_revision() <= head.head_revision
            {
                return Err(Error::Conflict {
                    bucket_id: attempt.bucket_id().to_string(),
                    stream_id: attempt.stream_id().to_string(),
                    commit_sequence: attempt.commit_sequence(),
                });
            }
        }

        let checkpoint = state.last_checkpoint.next();
        state.last_checkpoint = checkpoint;
        let commit = attempt.clone().into_commit(checkpoint);
        state.commits.push(commit.clone());

        let head = state.heads.entry(key).or_insert_with(|| StreamHead {
            bucket_id: attempt.bucket_id().clone(),
            stream_id: attempt.stream_id().clone(),
            head_revision: StreamRev::NONE,
            head_commit_sequence: 0,
            snapshot_revision: StreamRev::NONE,
        });
        head.head_revision = commit.stream_revision();
        head.head_commit_sequence = commit.commit_sequence();

        debug!(
            stream_id = %commit.stream_id(),
            checkpoint = %checkpoint,
            "commit persisted in memory"
        );
        Ok(Some(commit))
    }

    fn get_from(
        &self,
        bucket_id: &BucketId,
        stream_id: &StreamId,
        min_revision: StreamRev,
        max_revision: StreamRev,
    ) -> Result<Commits<'_>> {
        let bucket_id = bucket_id.clone();
        let stream_id = stream_id.clone();
        let mut selected = {
            let state = self.state()?;
            state
                .commits
                .iter()
                .filter(|c| {
                    let first = c
                        .stream_revision()
                        .as_raw()
                        .saturating_sub(c.events().len() as u64)
                        + 1;
                    c.bucket_id() == &bucket_id
                        && c.stream_id() == &stream_id
                        && c.stream_revision() >= min_revision
                        && first <= max_revision.as_raw()
                })
                .cloned()
                .collect::<Vec<_>>()
        };
        selected.sort_by_key(|c| c.stream_revision());
        Ok(Box::new(selected.into_iter().map(Ok)))
    }

    fn get_from_time(&self, bucket_id: &BucketId, start_ms: u64) -> Result<Commits<'_>> {
        let bucket_id = bucket_id.clone();
        self.select_commits(move |c| c.bucket_id() == &bucket_id && c.commit_stamp() >= start_ms)
    }

    fn get_from_to(
        &self,
        bucket_id: &BucketId,
        start_ms: u64,
        end_ms: u64,
    ) -> Result<Commits<'_>> {
        let bucket_id = bucket_id.clone();
        self.select_commits(move |c| {
            c.bucket_id() == &bucket_id && c.commit_stamp() >= start_ms && c.commit_stamp() < end_ms
        })
    }

    fn get_from_checkpoint(&self, checkpoint_token: Option<&str>) -> Result<Commits<'_>> {
        let after = self.get_checkpoint(checkpoint_token)?;
        // Commit at index i has checkpoint i + 1, but purges leave gaps, so
        // compare the stored token rather than slicing by index.
        self.select_commits(move |c| {
            Checkpoint::parse(Some(c.checkpoint_token()))
                .map(|cp| cp > after)
                .unwrap_or(false)
        })
    }

    fn get_checkpoint(&self, checkpoint_token: Option<&str>) -> Result<Checkpoint> {
        Checkpoint::parse(checkpoint_token)
    }

    fn get_snapshot(
        &self,
        bucket_id: &BucketId,
        stream_id: &StreamId,
        max_revision: StreamRev,
    ) -> Result<Option<Snapshot>> {
        let state = self.state()?;
        Ok(state
            .snapshots
            .iter()
            .filter(|s| {
                &s.bucket_id == bucket_id
                    && &s.stream_id == stream_id
                    && s.stream_revision <= max_revision
            })
            .max_by_key(|s| s.stream_revision)
            .cloned())
    }

    fn add_snapshot(&self, snapshot: &Snapshot) -> Result<bool> {
        let mut state = self.state()?;
        let key = (snapshot.bucket_id.clone(), snapshot.stream_id.clone());
        let Some(head) = state.heads.get_mut(&key) else {
            return Ok(false);
        };
        if snapshot.stream_revision > head.snapshot_revision {
            head.snapshot_revision = snapshot.stream_revision;
        }
        state.snapshots.push(snapshot.clone());
        Ok(true)
    }

    fn get_streams_to_snapshot(
        &self,
        bucket_id: &BucketId,
        max_threshold: u64,
    ) -> Result<StreamHeads<'_>> {
        let state = self.state()?;
        let mut heads: Vec<StreamHead> = state
            .heads
            .values()
            .filter(|h| &h.bucket_id == bucket_id && h.unsnapshotted() >= max_threshold)
            .cloned()
            .collect();
        heads.sort_by(|a, b| b.unsnapshotted().cmp(&a.unsnapshotted()));
        Ok(Box::new(heads.into_iter().map(Ok)))
    }

    fn purge(&self) -> Result<()> {
        self.state()?.clear();
        info!("in-memory storage purged");
        Ok(())
    }

    fn purge_bucket(&self, bucket_id: &BucketId) -> Result<()> {
        let mut state = self.state()?;
        state.commits.retain(|c| c.bucket_id() != bucket_id);
        state.heads.retain(|(bucket, _), _| bucket != bucket_id);
        state.snapshots.retain(|s| &s.bucket_id != bucket_id);
        Ok(())
    }

    fn drop_storage(&self) -> Result<()> {
        let mut state = self.state()?;
        state.clear();
        state.last_checkpoint = Checkpoint::zero();
        Ok(())
    }

    fn delete_stream(&self, bucket_id: &BucketId, stream_id: &StreamId) -> Result<()> {
        let mut state = self.state()?;
        state
            .commits
            .retain(|c| !(c.bucket_id() == bucket_id && c.stream_id() == stream_id));
        state
            .heads
            .remove(&(bucket_id.clone(), stream_id.clone()));
        state
            .snapshots
            .retain(|s| !(&s.bucket_id == bucket_id && &s.stream_id == stream_id));
        Ok(())
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

// =============================================================================
// Tests
// =============================================================================
