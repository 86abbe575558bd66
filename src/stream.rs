//! # Event Streams
//!
//! [`EventStream`] is the in-memory view of one stream: the events already
//! committed plus the events the caller is about to commit.
//!
//! ## Revision Bookkeeping
//!
//! ```text
//!   committed:   e1 e2 e3 | e4 e5        uncommitted: e6 e7
//!   commits:     ──c1───── ──c2──
//!   stream_revision = 5, commit_sequence = 2
//!   next attempt: stream_revision = 7, commit_sequence = 3
//! ```
//!
//! A stream fully read from revision 1 holds exactly `stream_revision`
//! committed events. A stream opened above revision 1, or from a snapshot,
//! holds only the events it actually read, but still reports the revision of
//! the stream as a whole.
//!
//! A stream holds no reference to the store: it is plain data owned by the
//! caller, and dropping it is the end of its life.

use std::collections::HashSet;

use crate::commit::{Commit, CommitAttempt, Snapshot};
use crate::error::{Error, Result};
use crate::types::{current_time_ms, BucketId, CommitId, EventMessage, Headers, StreamId, StreamRev};

/// Committed and pending events of one stream.
#[derive(Debug, Clone)]
pub struct EventStream {
    bucket_id: BucketId,
    stream_id: StreamId,
    stream_revision: StreamRev,
    commit_sequence: u64,
    committed: Vec<EventMessage>,
    uncommitted: Vec<EventMessage>,
    uncommitted_headers: Headers,
    identifiers: HashSet<CommitId>,
}

impl EventStream {
    /// An empty stream at revision 0.
    pub fn new(bucket_id: impl Into<BucketId>, stream_id: impl Into<StreamId>) -> Self {
        Self {
            bucket_id: bucket_id.into(),
            stream_id: stream_id.into(),
            stream_revision: StreamRev::NONE,
            commit_sequence: 0,
            committed: Vec::new(),
            uncommitted: Vec::new(),
            uncommitted_headers: Headers::new(),
            identifiers: HashSet::new(),
        }
    }

    /// Folds commits read with bounds `min_revision..=max_revision`.
    ///
    /// The iterator is consumed exactly once.
    pub(crate) fn from_commits<I>(
        bucket_id: BucketId,
        stream_id: StreamId,
        min_revision: StreamRev,
        max_revision: StreamRev,
        commits: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Commit>>,
    {
        let mut stream = Self::new(bucket_id, stream_id);
        stream.populate(min_revision, max_revision, commits)?;
        Ok(stream)
    }

    /// Folds the commits that follow a snapshot.
    ///
    /// Events at or below the snapshot's revision are already part of its
    /// state and are skipped. When the snapshot sits at the head of the
    /// stream, the head commit only contributes its revision and sequence.
    pub(crate) fn from_snapshot<I>(
        snapshot: &Snapshot,
        max_revision: StreamRev,
        commits: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Commit>>,
    {
        let mut stream = Self::new(snapshot.bucket_id.clone(), snapshot.stream_id.clone());
        stream.populate(snapshot.stream_revision.next(), max_revision, commits)?;
        stream.stream_revision = snapshot.stream_revision.add(stream.committed.len() as u64);
        Ok(stream)
    }

    fn populate<I>(&mut self, min_revision: StreamRev, max_revision: StreamRev, commits: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<Commit>>,
    {
        for commit in commits {
            let commit = commit?;
            self.identifiers.insert(commit.commit_id());
            self.commit_sequence = commit.commit_sequence();

            let event_count = commit.events().len() as u64;
            let mut current = commit
                .stream_revision()
                .as_raw()
                .saturating_sub(event_count)
                + 1;
            if current > max_revision.as_raw() {
                return Ok(());
            }

            for event in commit.into_events() {
                if current > max_revision.as_raw() {
                    break;
                }
                let revision = current;
                current += 1;
                if revision < min_revision.as_raw() {
                    continue;
                }
                self.committed.push(event);
                self.stream_revision = StreamRev::from_raw(revision);
            }
        }
        Ok(())
    }

    pub fn bucket_id(&self) -> &BucketId {
        &self.bucket_id
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Revision of the last committed event.
    pub fn stream_revision(&self) -> StreamRev {
        self.stream_revision
    }

    /// Number of commits applied to the stream.
    pub fn commit_sequence(&self) -> u64 {
        self.commit_sequence
    }

    pub fn committed_events(&self) -> &[EventMessage] {
        &self.committed
    }

    pub fn uncommitted_events(&self) -> &[EventMessage] {
        &self.uncommitted
    }

    pub fn uncommitted_headers(&self) -> &Headers {
        &self.uncommitted_headers
    }

    /// True if the commit id was folded into or committed from this stream.
    pub fn contains_commit(&self, commit_id: &CommitId) -> bool {
        self.identifiers.contains(commit_id)
    }

    /// Stages an event for the next commit.
    pub fn add(&mut self, event: EventMessage) {
        self.uncommitted.push(event);
    }

    /// Stages a commit-level header for the next commit.
    pub fn add_header(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.uncommitted_headers.insert(key.into(), value.into());
    }

    /// Discards staged events and headers.
    pub fn clear_changes(&mut self) {
        self.uncommitted.clear();
        self.uncommitted_headers.clear();
    }

    /// Builds the attempt that would commit the staged events.
    ///
    /// Returns `Ok(None)` if nothing is staged. The stream itself is left
    /// unchanged until [`EventStream::apply_commit`] is called.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateCommit`] if `commit_id` is already part of this stream.
    pub fn build_attempt(&self, commit_id: CommitId) -> Result<Option<CommitAttempt>> {
        if self.contains_commit(&commit_id) {
            return Err(Error::DuplicateCommit {
                bucket_id: self.bucket_id.to_string(),
                stream_id: self.stream_id.to_string(),
                commit_id: commit_id.to_string(),
            });
        }
        if self.uncommitted.is_empty() {
            return Ok(None);
        }

        CommitAttempt::new(
            self.bucket_id.clone(),
            self.stream_id.clone(),
            self.stream_revision.add(self.uncommitted.len() as u64),
            commit_id,
            self.commit_sequence + 1,
            current_time_ms(),
            self.uncommitted_headers.clone(),
            self.uncommitted.clone(),
        )
        .map(Some)
    }

    /// Moves the staged changes into the committed history.
    ///
    /// `commit` must be the durable result of the attempt built from this
    /// stream's staged events.
    pub fn apply_commit(&mut self, commit: &Commit) {
        self.identifiers.insert(commit.commit_id());
        self.stream_revision = commit.stream_revision();
        self.commit_sequence = commit.commit_sequence();
        self.committed.append(&mut self.uncommitted);
        self.uncommitted_headers.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
