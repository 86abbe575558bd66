//! # Domain Types
//!
//! Identifiers, revisions and the event message envelope shared by every
//! other module.
//!
//! ## Newtypes for Safety
//!
//! Buckets, streams and commits are all identified by strings or UUIDs at the
//! storage layer. Wrapping each one in its own type means a bucket id can never
//! be passed where a stream id is expected, and a stream revision can never be
//! confused with a commit sequence.
//!
//! ## Invariants
//!
//! - [`StreamRev`]: starts at 1 for the first event, increases by one per event
//! - [`StreamRev::MAX`] is the largest revision any engine must be able to bind;
//!   it stands in for "no upper bound" on reads
//! - [`CommitId`]: unique per commit; reusing one within a stream is a duplicate

use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// A partition of streams.
///
/// Buckets let unrelated applications share one store: the same stream id in
/// two buckets names two unrelated streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketId(String);

impl BucketId {
    /// The bucket used when the caller does not pick one.
    pub const DEFAULT: &'static str = "default";

    /// Creates a bucket id from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BucketId {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BucketId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BucketId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of one event stream within a bucket.
///
/// A stream is the ordered history of a single aggregate, for example
/// `"order-abc-123"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Creates a stream id from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier of a commit.
///
/// The client generates the id before committing, so a retried send carries
/// the same id and is recognised as a duplicate rather than written twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitId(Uuid);

impl CommitId {
    /// Generates a fresh random commit id.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CommitId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

// =============================================================================
// Revisions
// =============================================================================

/// A revision number within a stream.
///
/// The revision of a stream is the number of events committed to it. The
/// first event has revision 1, so revision 0 means "no events yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct StreamRev(u64);

impl StreamRev {
    /// No events yet.
    pub const NONE: StreamRev = StreamRev(0);

    /// The first revision in a stream.
    pub const FIRST: StreamRev = StreamRev(1);

    /// The largest revision an engine must accept as a read bound.
    ///
    /// Engines commonly store revisions as signed 64-bit integers, so the
    /// ceiling is `i64::MAX` rather than `u64::MAX`.
    pub const MAX: StreamRev = StreamRev(i64::MAX as u64);

    /// Creates a revision from a raw value.
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    pub fn as_raw(&self) -> u64 {
        self.0
    }

    /// Returns the next revision.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Adds an offset to this revision.
    pub fn add(&self, count: u64) -> Self {
        Self(self.0 + count)
    }

    /// Returns true if this represents "no events".
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Maps the "0 means unbounded" read convention onto [`StreamRev::MAX`].
    pub fn or_max(self) -> Self {
        if self.is_none() {
            Self::MAX
        } else {
            self
        }
    }
}

impl fmt::Display for StreamRev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StreamRev {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// =============================================================================
// Events
// =============================================================================

/// Metadata attached to a commit or an event. Key order is irrelevant.
pub type Headers = HashMap<String, serde_json::Value>;

/// One domain event plus its metadata.
///
/// The body is opaque to the store: the application chooses the
/// serialization format and engines store the bytes as given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Event-level metadata (correlation ids, event type names, ...).
    pub headers: Headers,

    /// The event payload.
    pub body: Vec<u8>,
}

impl EventMessage {
    /// Creates an event with a body and no headers.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// Adds a header (builder pattern).
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// Time
// =============================================================================

/// Returns the current time in milliseconds since Unix epoch.
pub fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// Tests
// =============================================================================
