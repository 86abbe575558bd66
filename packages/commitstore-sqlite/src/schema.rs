//! # SQLite Schema
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Schema Overview                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  commits                          stream_heads                          │
//! │  ┌──────────────────────┐         ┌──────────────────────┐              │
//! │  │ checkpoint (PK)      │         │ bucket_id  ┐ (PK)    │              │
//! │  │ bucket_id            │         │ stream_id  ┘         │              │
//! │  │ stream_hash ─────────┼────────►│ stream_hash          │              │
//! │  │ stream_id            │         │ head_revision        │              │
//! │  │ stream_revision      │         │ head_commit_sequence │              │
//! │  │ items                │         │ snapshot_revision    │              │
//! │  │ commit_id            │         └──────────────────────┘              │
//! │  │ commit_sequence      │                                               │
//! │  │ commit_stamp         │         snapshots                             │
//! │  │ checksum             │         ┌──────────────────────┐              │
//! │  │ body BLOB            │         │ bucket_id, stream_id │              │
//! │  └──────────────────────┘         │ stream_revision      │              │
//! │                                   │ payload BLOB         │              │
//! │                                   └──────────────────────┘              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Optimistic Concurrency in the Schema
//!
//! Three unique indexes on `commits` make SQLite itself refuse a second
//! writer for the same stream position:
//!
//! - `(bucket_id, stream_hash, stream_id, commit_sequence)`
//! - `(bucket_id, stream_hash, stream_id, stream_revision)`
//! - `(bucket_id, stream_hash, stream_id, commit_id)`
//!
//! The first two fire on a conflict, the last on a resent commit. Which one
//! fired is not reliably reported, so the commit path re-checks the commit id
//! to classify the violation.

use rusqlite::{Connection, OptionalExtension};

use commitstore::{Error, Result};

use crate::error::SqliteResultExt;

/// Current schema version. Opening a database with any other version fails.
pub const SCHEMA_VERSION: i32 = 1;

// =============================================================================
// DDL Statements
// =============================================================================

/// One row per durable commit.
///
/// `checkpoint` is an `AUTOINCREMENT` rowid, so it strictly increases and is
/// never reused, even after purges. It is the global ordering token.
/// `items` is the number of events in the commit, which gives the first
/// revision without decoding the body.
const CREATE_COMMITS: &str = r#"
CREATE TABLE IF NOT EXISTS commits (
    checkpoint      INTEGER PRIMARY KEY AUTOINCREMENT,
    bucket_id       TEXT NOT NULL,
    stream_hash     INTEGER NOT NULL,
    stream_id       TEXT NOT NULL,
    stream_revision INTEGER NOT NULL,
    items           INTEGER NOT NULL,
    commit_id       TEXT NOT NULL,
    commit_sequence INTEGER NOT NULL,
    commit_stamp    INTEGER NOT NULL,
    checksum        INTEGER NOT NULL,
    body            BLOB NOT NULL
)
"#;

const CREATE_COMMITS_SEQUENCE_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS commits_stream_sequence
ON commits(bucket_id, stream_hash, stream_id, commit_sequence)
"#;

const CREATE_COMMITS_REVISION_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS commits_stream_revision
ON commits(bucket_id, stream_hash, stream_id, stream_revision)
"#;

const CREATE_COMMITS_ID_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS commits_stream_commit_id
ON commits(bucket_id, stream_hash, stream_id, commit_id)
"#;

/// Supports time-window reads within a bucket.
const CREATE_COMMITS_STAMP_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS commits_bucket_stamp
ON commits(bucket_id, commit_stamp)
"#;

/// Latest position of every stream, maintained in the commit transaction.
///
/// Used for the conflict pre-check and to find streams that need a snapshot.
const CREATE_STREAM_HEADS: &str = r#"
CREATE TABLE IF NOT EXISTS stream_heads (
    bucket_id            TEXT NOT NULL,
    stream_id            TEXT NOT NULL,
    stream_hash          INTEGER NOT NULL,
    head_revision        INTEGER NOT NULL,
    head_commit_sequence INTEGER NOT NULL,
    snapshot_revision    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (bucket_id, stream_id)
)
"#;

const CREATE_SNAPSHOTS: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    bucket_id       TEXT NOT NULL,
    stream_hash     INTEGER NOT NULL,
    stream_id       TEXT NOT NULL,
    stream_revision INTEGER NOT NULL,
    payload         BLOB NOT NULL,
    PRIMARY KEY (bucket_id, stream_id, stream_revision)
)
"#;

const CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS commitstore_metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

const DROP_ALL: &str = r#"
DROP TABLE IF EXISTS snapshots;
DROP TABLE IF EXISTS stream_heads;
DROP TABLE IF EXISTS commits;
DROP TABLE IF EXISTS commitstore_metadata;
"#;

// =============================================================================
// Initialization
// =============================================================================

/// Sets pragmas, creates every table and index, and checks the version.
///
/// Idempotent: safe to run on every open.
pub fn initialize(conn: &Connection) -> Result<()> {
    // WAL lets readers on other connections see a consistent snapshot while
    // a commit is in flight. In-memory databases silently keep "memory".
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        .or_storage()?;
    conn.pragma_update(None, "synchronous", "NORMAL").or_storage()?;

    conn.execute_batch(CREATE_METADATA).or_storage()?;
    conn.execute_batch(CREATE_COMMITS).or_storage()?;
    conn.execute_batch(CREATE_COMMITS_SEQUENCE_INDEX).or_storage()?;
    conn.execute_batch(CREATE_COMMITS_REVISION_INDEX).or_storage()?;
    conn.execute_batch(CREATE_COMMITS_ID_INDEX).or_storage()?;
    conn.execute_batch(CREATE_COMMITS_STAMP_INDEX).or_storage()?;
    conn.execute_batch(CREATE_STREAM_HEADS).or_storage()?;
    conn.execute_batch(CREATE_SNAPSHOTS).or_storage()?;

    verify_or_set_version(conn)
}

/// Drops every table this engine owns.
pub fn drop_all(conn: &Connection) -> Result<()> {
    conn.execute_batch(DROP_ALL).or_storage()
}

fn verify_or_set_version(conn: &Connection) -> Result<()> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT value FROM commitstore_metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()
        .or_storage()?;

    match existing {
        None => {
            conn.execute(
                "INSERT INTO commitstore_metadata (key, value) VALUES ('schema_version', ?)",
                [SCHEMA_VERSION.to_string()],
            )
            .or_storage()?;
        }
        Some(v) if v == SCHEMA_VERSION.to_string() => {}
        Some(v) => {
            return Err(Error::storage(format!(
                "schema version mismatch: database has version {v}, this engine requires {SCHEMA_VERSION}"
            )));
        }
    }
    Ok(())
}
