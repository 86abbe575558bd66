//! # Commitstore - Optimistic Event Store Core
//!
//! Commitstore turns an append-only, optimistically concurrent commit log into
//! reconstructable streams of domain events. Durability comes from pluggable
//! persistence engines; this crate supplies the logic that does not depend on
//! any of them:
//!
//! - **Streams**: create, open (from history or a snapshot) and commit
//! - **Optimistic concurrency**: conflicts and duplicates are detected by the
//!   engine and surfaced as distinct errors, never retried or merged
//! - **Pipeline hooks**: filter, veto and observe every read and write
//! - **Global ordering**: checkpoint tokens to resume cross-stream reads
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    OptimisticEventStore                         │
//! │        (create / open / commit streams, raw commit reads)       │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                PipelineHooksAwarePersistence                    │
//! │     select on read · pre_commit veto · post_commit notify       │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  PersistStreams engine                          │
//! │        (in-memory, SQLite, or any conforming backend)           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! 1. **No partial commits**: a caller sees a full commit, a veto, or an error
//! 2. **Exactly one winner**: of two attempts on the same stream position,
//!    one succeeds and the other gets `Error::Conflict`
//! 3. **Idempotent resend**: a stored commit id comes back as
//!    `Error::DuplicateCommit`, not as a second write
//! 4. **Lazy reads**: commits are pulled from the engine one at a time
//!
//! ## Example
//!
//! ```rust
//! use commitstore::{CommitId, EventMessage, InMemoryPersistence, OptimisticEventStore, StreamRev};
//!
//! let store = OptimisticEventStore::new(InMemoryPersistence::new(), Vec::new());
//!
//! let mut stream = store.create_stream("default", "order-1");
//! stream.add(EventMessage::new(b"OrderPlaced".to_vec()));
//! store.commit_changes(&mut stream, CommitId::new())?;
//!
//! let reopened = store.open_stream("default", "order-1", StreamRev::NONE, StreamRev::NONE)?;
//! assert_eq!(reopened.stream_revision(), StreamRev::FIRST);
//! # Ok::<(), commitstore::Error>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

/// Error types for every store and engine operation.
pub mod error;

/// Identifiers, revisions and the event envelope.
pub mod types;

/// Ordered positions in an engine's global commit log.
pub mod checkpoint;

/// Commit attempts, durable commits, snapshots and stream heads.
pub mod commit;

/// The contract every storage engine implements.
pub mod persistence;

/// The contract for read/write interceptors.
pub mod hooks;

/// The decorator that applies hooks around an engine.
pub mod pipeline;

/// In-memory view of one stream.
pub mod stream;

/// The store façade.
pub mod store;

/// Reference engine backed by process memory.
pub mod memory;

/// Checkpoint-driven observation of the global commit log.
pub mod client;

// =============================================================================
// Re-exports
// =============================================================================

pub use checkpoint::Checkpoint;
pub use client::{CommitObserver, PollingClient};
pub use commit::{Commit, CommitAttempt, Snapshot, StreamHead};
pub use error::{BoxError, Error, Result};
pub use hooks::PipelineHook;
pub use memory::InMemoryPersistence;
pub use persistence::{Commits, PersistStreams, StreamHeads};
pub use pipeline::PipelineHooksAwarePersistence;
pub use store::OptimisticEventStore;
pub use stream::EventStream;
pub use types::{current_time_ms, BucketId, CommitId, EventMessage, Headers, StreamId, StreamRev};
