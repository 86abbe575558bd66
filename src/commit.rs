//! # Commits, Attempts and Snapshots
//!
//! The immutable records that flow between the store and a persistence engine.
//!
//! ```text
//!   EventStream ──build──► CommitAttempt ──engine──► Commit (+ checkpoint)
//!                                                      │
//!   Snapshot ◄── application state at a revision       ▼
//!   StreamHead ◄── engine bookkeeping per stream    global log
//! ```
//!
//! ## Identity
//!
//! Two commits are the same commit when `(bucket_id, stream_id, commit_id)`
//! match, whatever their payload. That identity is what duplicate detection
//! keys on, so `PartialEq` and `Hash` for [`Commit`] deliberately ignore every
//! other field. [`StreamHead`] identity is `(bucket_id, stream_id)`.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;
use crate::error::{Error, Result};
use crate::types::{BucketId, CommitId, EventMessage, Headers, StreamId, StreamRev};

// =============================================================================
// Commit Attempt
// =============================================================================

/// A proposed write: events to append to one stream, not yet durable.
///
/// Deserializing runs the same checks as [`CommitAttempt::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCommitAttempt")]
pub struct CommitAttempt {
    bucket_id: BucketId,
    stream_id: StreamId,
    stream_revision: StreamRev,
    commit_id: CommitId,
    commit_sequence: u64,
    commit_stamp: u64,
    headers: Headers,
    events: Vec<EventMessage>,
}

impl CommitAttempt {
    /// Creates a commit attempt.
    ///
    /// # Arguments
    ///
    /// * `stream_revision` - Revision of the stream *after* these events apply
    /// * `commit_sequence` - Ordinal of this commit within the stream (1-based)
    /// * `commit_stamp` - Wall-clock time in Unix milliseconds
    ///
    /// # Errors
    ///
    /// [`Error::Argument`] if an id is empty, the revision or sequence is zero,
    /// or there are no events to commit.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bucket_id: impl Into<BucketId>,
        stream_id: impl Into<StreamId>,
        stream_revision: StreamRev,
        commit_id: CommitId,
        commit_sequence: u64,
        commit_stamp: u64,
        headers: Headers,
        events: Vec<EventMessage>,
    ) -> Result<Self> {
        let bucket_id = bucket_id.into();
        let stream_id = stream_id.into();

        if bucket_id.as_str().is_empty() {
            return Err(Error::argument("bucket_id", "must not be empty"));
        }
        if stream_id.as_str().is_empty() {
            return Err(Error::argument("stream_id", "must not be empty"));
        }
        if stream_revision.is_none() {
            return Err(Error::argument("stream_revision", "must be greater than zero"));
        }
        if commit_sequence == 0 {
            return Err(Error::argument("commit_sequence", "must be greater than zero"));
        }
        if events.is_empty() {
            return Err(Error::argument("events", "must contain at least one event"));
        }
        if (events.len() as u64) > stream_revision.as_raw() {
            return Err(Error::argument(
                "stream_revision",
                format!(
                    "revision {} cannot hold {} events",
                    stream_revision,
                    events.len()
                ),
            ));
        }

        Ok(Self {
            bucket_id,
            stream_id,
            stream_revision,
            commit_id,
            commit_sequence,
            commit_stamp,
            headers,
            events,
        })
    }

    pub fn bucket_id(&self) -> &BucketId {
        &self.bucket_id
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Revision of the stream once this attempt is applied.
    pub fn stream_revision(&self) -> StreamRev {
        self.stream_revision
    }

    pub fn commit_id(&self) -> CommitId {
        self.commit_id
    }

    pub fn commit_sequence(&self) -> u64 {
        self.commit_sequence
    }

    pub fn commit_stamp(&self) -> u64 {
        self.commit_stamp
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn events(&self) -> &[EventMessage] {
        &self.events
    }

    /// Revision of the first event in this attempt.
    pub fn first_revision(&self) -> StreamRev {
        StreamRev::from_raw(
            (self.stream_revision.as_raw() + 1).saturating_sub(self.events.len() as u64),
        )
    }

    /// Turns the attempt into a durable commit at the given checkpoint.
    ///
    /// Only engines call this, once the write is durable.
    pub fn into_commit(self, checkpoint: Checkpoint) -> Commit {
        Commit {
            bucket_id: self.bucket_id,
            stream_id: self.stream_id,
            stream_revision: self.stream_revision,
            commit_id: self.commit_id,
            commit_sequence: self.commit_sequence,
            commit_stamp: self.commit_stamp,
            checkpoint_token: checkpoint.value(),
            headers: self.headers,
            events: self.events,
        }
    }
}

/// Wire shape of a [`CommitAttempt`] before validation.
#[derive(Deserialize)]
struct RawCommitAttempt {
    bucket_id: BucketId,
    stream_id: StreamId,
    stream_revision: StreamRev,
    commit_id: CommitId,
    commit_sequence: u64,
    commit_stamp: u64,
    headers: Headers,
    events: Vec<EventMessage>,
}

impl TryFrom<RawCommitAttempt> for CommitAttempt {
    type Error = Error;

    fn try_from(raw: RawCommitAttempt) -> Result<Self> {
        CommitAttempt::new(
            raw.bucket_id,
            raw.stream_id,
            raw.stream_revision,
            raw.commit_id,
            raw.commit_sequence,
            raw.commit_stamp,
            raw.headers,
            raw.events,
        )
    }
}

// =============================================================================
// Commit
// =============================================================================

/// A durable, immutable commit as returned by a persistence engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    bucket_id: BucketId,
    stream_id: StreamId,
    stream_revision: StreamRev,
    commit_id: CommitId,
    commit_sequence: u64,
    commit_stamp: u64,
    checkpoint_token: String,
    headers: Headers,
    events: Vec<EventMessage>,
}

impl Commit {
    /// Reassembles a commit read back from storage.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bucket_id: impl Into<BucketId>,
        stream_id: impl Into<StreamId>,
        stream_revision: StreamRev,
        commit_id: CommitId,
        commit_sequence: u64,
        commit_stamp: u64,
        checkpoint_token: impl Into<String>,
        headers: Headers,
        events: Vec<EventMessage>,
    ) -> Self {
        Self {
            bucket_id: bucket_id.into(),
            stream_id: stream_id.into(),
            stream_revision,
            commit_id,
            commit_sequence,
            commit_stamp,
            checkpoint_token: checkpoint_token.into(),
            headers,
            events,
        }
    }

    pub fn bucket_id(&self) -> &BucketId {
        &self.bucket_id
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Revision of the stream after this commit's last event.
    pub fn stream_revision(&self) -> StreamRev {
        self.stream_revision
    }

    pub fn commit_id(&self) -> CommitId {
        self.commit_id
    }

    pub fn commit_sequence(&self) -> u64 {
        self.commit_sequence
    }

    pub fn commit_stamp(&self) -> u64 {
        self.commit_stamp
    }

    /// The engine-assigned checkpoint token. Opaque to the core.
    pub fn checkpoint_token(&self) -> &str {
        &self.checkpoint_token
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn events(&self) -> &[EventMessage] {
        &self.events
    }

    /// Consumes the commit, yielding its events.
    pub fn into_events(self) -> Vec<EventMessage> {
        self.events
    }

    /// Returns a copy with the given headers, leaving identity untouched.
    ///
    /// Useful for hooks that enrich commits as they are read.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.bucket_id == other.bucket_id
            && self.stream_id == other.stream_id
            && self.commit_id == other.commit_id
    }
}

impl Eq for Commit {}

impl Hash for Commit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bucket_id.hash(state);
        self.stream_id.hash(state);
        self.commit_id.hash(state);
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Application state of a stream captured at a revision.
///
/// Opening a stream from a snapshot only reads the commits after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub bucket_id: BucketId,
    pub stream_id: StreamId,
    pub stream_revision: StreamRev,
    /// Opaque serialized state.
    pub payload: Vec<u8>,
}

impl Snapshot {
    pub fn new(
        bucket_id: impl Into<BucketId>,
        stream_id: impl Into<StreamId>,
        stream_revision: StreamRev,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            bucket_id: bucket_id.into(),
            stream_id: stream_id.into(),
            stream_revision,
            payload: payload.into(),
        }
    }
}

// =============================================================================
// Stream Head
// =============================================================================

/// Engine-maintained summary of a stream, used to pick snapshot candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamHead {
    pub bucket_id: BucketId,
    pub stream_id: StreamId,
    pub head_revision: StreamRev,
    pub head_commit_sequence: u64,
    pub snapshot_revision: StreamRev,
}

impl StreamHead {
    /// Number of events committed since the last snapshot.
    pub fn unsnapshotted(&self) -> u64 {
        self.head_revision
            .as_raw()
            .saturating_sub(self.snapshot_revision.as_raw())
    }
}

impl PartialEq for StreamHead {
    fn eq(&self, other: &Self) -> bool {
        self.bucket_id == other.bucket_id && self.stream_id == other.stream_id
    }
}

impl Eq for StreamHead {}

impl Hash for StreamHead {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bucket_id.hash(state);
        self.stream_id.hash(state);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn attempt(events: usize) -> Result<CommitAttempt> {
        CommitAttempt::new(
            "default",
            "order-1",
            StreamRev::from_raw(events as u64),
            CommitId::new(),
            1,
            1_700_000_000_000,
            Headers::new(),
            (0..events).map(|i| EventMessage::new(vec![i as u8])).collect(),
        )
    }

    #[test]
    fn test_attempt_requires_events() {
        let err = attempt(0).unwrap_err();
        assert!(matches!(err, Error::Argument { .. }));
    }

    #[test]
    fn test_attempt_rejects_empty_stream_id() {
        let err = CommitAttempt::new(
            "default",
            "",
            StreamRev::FIRST,
            CommitId::new(),
            1,
            0,
            Headers::new(),
            vec![EventMessage::default()],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Argument { name: "stream_id", .. }));
    }

    #[test]
    fn test_attempt_rejects_revision_smaller_than_event_count() {
        let err = CommitAttempt::new(
            "default",
            "order-1",
            StreamRev::FIRST,
            CommitId::new(),
            1,
            0,
            Headers::new(),
            vec![EventMessage::default(), EventMessage::default()],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Argument { name: "stream_revision", .. }));
    }

    #[test]
    fn test_deserialized_attempt_is_validated() {
        let valid = attempt(2).unwrap();
        let mut value = serde_json::to_value(&valid).unwrap();

        let restored: CommitAttempt = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(restored, valid);

        value["stream_revision"] = serde_json::json!(0);
        value["commit_sequence"] = serde_json::json!(5);
        let err = serde_json::from_value::<CommitAttempt>(value).unwrap_err();
        assert!(err.to_string().contains("stream_revision"), "got {err}");
    }

    #[test]
    fn test_first_revision() {
        let attempt = attempt(3).unwrap();
        assert_eq!(attempt.first_revision(), StreamRev::FIRST);
        assert_eq!(attempt.stream_revision(), StreamRev::from_raw(3));
    }

    #[test]
    fn test_into_commit_keeps_fields_and_sets_checkpoint() {
        let attempt = attempt(2).unwrap();
        let commit_id = attempt.commit_id();
        let commit = attempt.into_commit(Checkpoint::from_raw(9));

        assert_eq!(commit.commit_id(), commit_id);
        assert_eq!(commit.checkpoint_token(), "9");
        assert_eq!(commit.events().len(), 2);
        assert_eq!(commit.stream_revision(), StreamRev::from_raw(2));
    }

    #[test]
    fn test_commit_identity_ignores_payload() {
        let id = CommitId::new();
        let a = Commit::new(
            "default",
            "order-1",
            StreamRev::FIRST,
            id,
            1,
            0,
            "1",
            Headers::new(),
            vec![EventMessage::new(b"a".to_vec())],
        );
        let b = Commit::new(
            "default",
            "order-1",
            StreamRev::from_raw(5),
            id,
            3,
            99,
            "7",
            Headers::new(),
            vec![EventMessage::new(b"b".to_vec())],
        );
        let other_stream = Commit::new(
            "default",
            "order-2",
            StreamRev::FIRST,
            id,
            1,
            0,
            "1",
            Headers::new(),
            vec![],
        );

        assert_eq!(a, b);
        assert_ne!(a, other_stream);

        let set: HashSet<Commit> = [a, b, other_stream].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_stream_head_identity() {
        let head = |rev: u64| StreamHead {
            bucket_id: BucketId::default(),
            stream_id: StreamId::new("order-1"),
            head_revision: StreamRev::from_raw(rev),
            head_commit_sequence: rev,
            snapshot_revision: StreamRev::NONE,
        };
        assert_eq!(head(3), head(10));
        assert_eq!(head(10).unsnapshotted(), 10);
    }
}
