//! # Error Handling for the Event Store Core
//!
//! This module defines the single error type used throughout the crate. Every
//! failure the store can surface, whether it originates in the core or in a
//! persistence engine, is one variant of [`Error`].
//!
//! ## Error Categories
//!
//! | Category | Variants | Typical Response |
//! |----------|----------|------------------|
//! | Caller | `Argument`, `StreamNotFound`, `InvalidCheckpoint` | Fix the request |
//! | Concurrency | `Conflict` | Re-read the stream, retry the business operation |
//! | Idempotency | `DuplicateCommit` | Treat as a successful no-op |
//! | Transient | `StorageUnavailable` | Retry at the caller's discretion |
//! | Fault | `Storage`, `Disposed` | Log and investigate |
//!
//! A pre-commit hook vetoing an attempt is deliberately *not* an error: the
//! commit call returns `Ok(None)` instead.
//!
//! The core never retries and never swallows an engine error. The only
//! translation it performs is turning an empty read with a positive minimum
//! revision into [`Error::StreamNotFound`].

use thiserror::Error;

/// Boxed source error carried by the storage variants.
///
/// Engines wrap their native errors (rusqlite, serde_json, I/O) in this box
/// so the core does not depend on any particular storage technology.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur in event store operations.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Caller Errors (fail fast, no storage call made)
    // =========================================================================

    /// A required input was absent or malformed.
    ///
    /// Raised before any call reaches the persistence engine, e.g. committing
    /// no attempt at all, or opening a stream from an absent snapshot.
    #[error("invalid argument '{name}': {reason}")]
    Argument {
        /// The name of the offending argument.
        name: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A stream was opened at a positive minimum revision but has no commits.
    ///
    /// A stream opened at revision 0 with no commits is simply a new, empty
    /// stream and never produces this error.
    #[error("stream '{stream_id}' not found in bucket '{bucket_id}'")]
    StreamNotFound {
        /// The bucket that was searched.
        bucket_id: String,
        /// The stream that was requested.
        stream_id: String,
    },

    /// A checkpoint token could not be understood by the engine.
    #[error("invalid checkpoint token '{token}'")]
    InvalidCheckpoint {
        /// The raw token.
        token: String,
    },

    // =========================================================================
    // Concurrency Errors (client re-reads and retries)
    // =========================================================================

    /// Optimistic concurrency conflict: another commit already claimed this
    /// position in the stream.
    ///
    /// # Recovery
    ///
    /// 1. Re-open the stream to pick up the competing commit
    /// 2. Re-apply business logic against the new state
    /// 3. Commit a fresh attempt
    #[error(
        "conflict on stream '{stream_id}' in bucket '{bucket_id}': commit sequence {commit_sequence} already taken"
    )]
    Conflict {
        /// The bucket of the stream.
        bucket_id: String,
        /// The stream where the conflict occurred.
        stream_id: String,
        /// The commit sequence the losing attempt tried to claim.
        commit_sequence: u64,
    },

    // =========================================================================
    // Idempotency (not a failure, but a distinct signal)
    // =========================================================================

    /// The commit id was already durably stored for this stream.
    ///
    /// This happens when a client resends an attempt after a timeout even
    /// though the original write succeeded. Callers should treat it as an
    /// idempotent success.
    #[error("duplicate commit '{commit_id}' on stream '{stream_id}' in bucket '{bucket_id}'")]
    DuplicateCommit {
        /// The bucket of the stream.
        bucket_id: String,
        /// The stream the commit belongs to.
        stream_id: String,
        /// The commit id that was already stored.
        commit_id: String,
    },

    // =========================================================================
    // Storage Errors
    // =========================================================================

    /// Transient storage failure (timeout, lock contention, connectivity).
    ///
    /// Safe to retry. Engines are responsible for translating their own I/O
    /// timeouts into this variant.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] BoxError),

    /// Non-transient storage failure (corruption, permissions, bad schema).
    #[error("storage error: {0}")]
    Storage(#[source] BoxError),

    /// The persistence engine has already been disposed.
    #[error("persistence engine has been disposed")]
    Disposed,
}

impl Error {
    /// Creates an [`Error::Argument`].
    pub fn argument(name: &'static str, reason: impl Into<String>) -> Self {
        Error::Argument {
            name,
            reason: reason.into(),
        }
    }

    /// Wraps a non-transient engine error.
    pub fn storage(err: impl Into<BoxError>) -> Self {
        Error::Storage(err.into())
    }

    /// Wraps a transient engine error.
    pub fn unavailable(err: impl Into<BoxError>) -> Self {
        Error::StorageUnavailable(err.into())
    }

    /// Returns true if retrying the same call may succeed without any change
    /// on the caller's side.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_))
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================
