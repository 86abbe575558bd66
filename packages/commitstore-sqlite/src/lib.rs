//! # commitstore-sqlite
//!
//! A durable [`PersistStreams`](commitstore::PersistStreams) engine for
//! commitstore, backed by SQLite through rusqlite.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │             OptimisticEventStore<SqlitePersistence>             │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     SqlitePersistence                           │
//! │   Mutex<Connection> · BEGIN IMMEDIATE commits · paged reads     │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//!                       ┌───────────────┐
//!                       │    SQLite     │
//!                       │    (WAL)      │
//!                       └───────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use commitstore::{CommitId, EventMessage, OptimisticEventStore, StreamRev};
//! use commitstore_sqlite::SqlitePersistence;
//!
//! let store = OptimisticEventStore::new(SqlitePersistence::open_in_memory()?, Vec::new());
//!
//! let mut stream = store.create_stream("default", "order-1");
//! stream.add(EventMessage::new(b"OrderPlaced".to_vec()));
//! store.commit_changes(&mut stream, CommitId::new())?;
//!
//! let reopened = store.open_stream("default", "order-1", StreamRev::FIRST, StreamRev::NONE)?;
//! assert_eq!(reopened.committed_events().len(), 1);
//! # Ok::<(), commitstore::Error>(())
//! ```

/// Commit body encoding, checksums and stream hashing.
pub mod codec;

/// Engine configuration.
pub mod config;

/// rusqlite error translation.
mod error;

/// The engine itself.
pub mod persistence;

/// Tables, indexes and schema versioning.
pub mod schema;

pub use config::SqliteConfig;
pub use persistence::{CommitPages, SqlitePersistence};
