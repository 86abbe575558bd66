//! # SQLite Persistence Engine
//!
//! [`SqlitePersistence`] implements [`PersistStreams`] over a single SQLite
//! connection guarded by a mutex.
//!
//! ## Writes
//!
//! Every commit runs in one `BEGIN IMMEDIATE` transaction:
//!
//! ```text
//!   1. commit id already stored for the stream?   → DuplicateCommit
//!   2. sequence or first revision not past head?  → Conflict
//!   3. INSERT INTO commits                        → checkpoint = rowid
//!   4. UPSERT stream_heads
//! ```
//!
//! Steps 1 and 2 give precise errors for the common case. The unique indexes
//! still guard against writers on other connections that slip in between;
//! such a violation is classified by re-checking the commit id.
//!
//! ## Reads
//!
//! Reads are lazy. A [`CommitPages`] iterator fetches `page_size` commits at
//! a time, keyed by the last sequence or checkpoint it returned, and holds
//! the connection lock only while a page is being fetched. Dropping the
//! iterator early means the remaining pages are never queried.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use commitstore::{
    BucketId, Checkpoint, Commit, CommitAttempt, CommitId, Commits, Error, PersistStreams, Result,
    Snapshot, StreamHead, StreamHeads, StreamId, StreamRev,
};

use crate::codec::{decode_body, encode_body, stream_hash};
use crate::config::SqliteConfig;
use crate::error::{from_sqlite, is_constraint_violation, SqliteResultExt};
use crate::schema;

const COMMIT_COLUMNS: &str = "checkpoint, bucket_id, stream_id, stream_revision, commit_id, \
                              commit_sequence, commit_stamp, checksum, body";

// =============================================================================
// Engine
// =============================================================================

/// A [`PersistStreams`] engine backed by one SQLite database.
///
/// [`PersistStreams::dispose`] closes the connection; every later call fails
/// with [`Error::Disposed`].
#[derive(Debug)]
pub struct SqlitePersistence {
    conn: Mutex<Option<Connection>>,
    config: SqliteConfig,
    disposed: AtomicBool,
}

impl SqlitePersistence {
    /// Opens (creating if needed) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, SqliteConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: SqliteConfig) -> Result<Self> {
        let conn = Connection::open(path).or_storage()?;
        Self::from_connection(conn, config)
    }

    /// Opens a private in-memory database, lost when the engine is dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().or_storage()?;
        Self::from_connection(conn, SqliteConfig::default())
    }

    fn from_connection(conn: Connection, config: SqliteConfig) -> Result<Self> {
        conn.busy_timeout(config.busy_timeout).or_storage()?;
        schema::initialize(&conn)?;
        debug!(page_size = config.page_size, "sqlite engine opened");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            config,
            disposed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    /// Runs `f` with the connection locked, failing once the engine is disposed.
    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| Error::storage("sqlite connection poisoned by a panicked caller"))?;
        let conn = guard.as_mut().ok_or(Error::Disposed)?;
        f(conn)
    }

    fn pages(&self, query: PageQuery, cursor: i64) -> Commits<'_> {
        Box::new(CommitPages {
            engine: self,
            query,
            cursor,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    fn fetch_page(&self, query: &PageQuery, cursor: i64) -> Result<Vec<RawCommit>> {
        let limit = self.config.effective_page_size() as i64;
        self.with_conn(|conn| Self::query_page(conn, query, cursor, limit))
    }

    fn query_page(conn: &Connection, query: &PageQuery, cursor: i64, limit: i64) -> Result<Vec<RawCommit>> {
        let rows = match query {
            PageQuery::Stream {
                bucket_id,
                stream_hash,
                stream_id,
                min_revision,
                max_revision,
            } => {
                let mut stmt = conn
                    .prepare_cached(&format!(
                        "SELECT {COMMIT_COLUMNS} FROM commits
                         WHERE bucket_id = ?1 AND stream_hash = ?2 AND stream_id = ?3
                           AND stream_revision >= ?4
                           AND stream_revision - items + 1 <= ?5
                           AND commit_sequence > ?6
                         ORDER BY commit_sequence
                         LIMIT ?7"
                    ))
                    .or_storage()?;
                let rows = stmt
                    .query_map(
                        params![bucket_id, stream_hash, stream_id, min_revision, max_revision, cursor, limit],
                        RawCommit::from_row,
                    )
                    .or_storage()?;
                rows.collect::<rusqlite::Result<Vec<_>>>().or_storage()?
            }
            PageQuery::TimeWindow {
                bucket_id,
                start_ms,
                end_ms,
            } => {
                let mut stmt = conn
                    .prepare_cached(&format!(
                        "SELECT {COMMIT_COLUMNS} FROM commits
                         WHERE bucket_id = ?1 AND commit_stamp >= ?2 AND commit_stamp < ?3
                           AND checkpoint > ?4
                         ORDER BY checkpoint
                         LIMIT ?5"
                    ))
                    .or_storage()?;
                let rows = stmt
                    .query_map(
                        params![bucket_id, start_ms, end_ms, cursor, limit],
                        RawCommit::from_row,
                    )
                    .or_storage()?;
                rows.collect::<rusqlite::Result<Vec<_>>>().or_storage()?
            }
            PageQuery::AfterCheckpoint => {
                let mut stmt = conn
                    .prepare_cached(&format!(
                        "SELECT {COMMIT_COLUMNS} FROM commits
                         WHERE checkpoint > ?1
                         ORDER BY checkpoint
                         LIMIT ?2"
                    ))
                    .or_storage()?;
                let rows = stmt
                    .query_map(params![cursor, limit], RawCommit::from_row)
                    .or_storage()?;
                rows.collect::<rusqlite::Result<Vec<_>>>().or_storage()?
            }
        };
        Ok(rows)
    }

    fn commit_in_transaction(
        conn: &Connection,
        attempt: &CommitAttempt,
        body: &[u8],
        checksum: i64,
    ) -> Result<Commit> {
        let bucket_id = attempt.bucket_id().as_str();
        let stream_id = attempt.stream_id().as_str();
        let hash = stream_hash(attempt.stream_id());

        if commit_exists(conn, attempt)? {
            return Err(duplicate(attempt));
        }

        let head: Option<(i64, i64)> = conn
            .query_row(
                "SELECT head_revision, head_commit_sequence FROM stream_heads
                 WHERE bucket_id = ?1 AND stream_id = ?2",
                params![bucket_id, stream_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .or_storage()?;
        if let Some((head_revision, head_sequence)) = head {
            if attempt.commit_sequence() as i64 <= head_sequence
                || attempt.first_revision().as_raw() as i64 <= head_revision
            {
                return Err(conflict(attempt));
            }
        }

        let inserted = conn.execute(
            "INSERT INTO commits (bucket_id, stream_hash, stream_id, stream_revision, items,
                                  commit_id, commit_sequence, commit_stamp, checksum, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                bucket_id,
                hash,
                stream_id,
                attempt.stream_revision().as_raw() as i64,
                attempt.events().len() as i64,
                attempt.commit_id().to_string(),
                attempt.commit_sequence() as i64,
                attempt.commit_stamp() as i64,
                checksum,
                body,
            ],
        );
        if let Err(e) = inserted {
            if is_constraint_violation(&e) {
                return Err(if commit_exists(conn, attempt)? {
                    duplicate(attempt)
                } else {
                    conflict(attempt)
                });
            }
            return Err(from_sqlite(e));
        }
        let checkpoint = conn.last_insert_rowid();

        conn.execute(
            "INSERT INTO stream_heads (bucket_id, stream_id, stream_hash, head_revision, head_commit_sequence)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(bucket_id, stream_id) DO UPDATE SET
                 head_revision = excluded.head_revision,
                 head_commit_sequence = excluded.head_commit_sequence",
            params![
                bucket_id,
                stream_id,
                hash,
                attempt.stream_revision().as_raw() as i64,
                attempt.commit_sequence() as i64,
            ],
        )
        .or_storage()?;

        Ok(attempt
            .clone()
            .into_commit(Checkpoint::from_raw(checkpoint as u64)))
    }
}

fn commit_exists(conn: &Connection, attempt: &CommitAttempt) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM commits
         WHERE bucket_id = ?1 AND stream_hash = ?2 AND stream_id = ?3 AND commit_id = ?4",
        params![
            attempt.bucket_id().as_str(),
            stream_hash(attempt.stream_id()),
            attempt.stream_id().as_str(),
            attempt.commit_id().to_string(),
        ],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .or_storage()
}

fn duplicate(attempt: &CommitAttempt) -> Error {
    Error::DuplicateCommit {
        bucket_id: attempt.bucket_id().to_string(),
        stream_id: attempt.stream_id().to_string(),
        commit_id: attempt.commit_id().to_string(),
    }
}

fn conflict(attempt: &CommitAttempt) -> Error {
    Error::Conflict {
        bucket_id: attempt.bucket_id().to_string(),
        stream_id: attempt.stream_id().to_string(),
        commit_sequence: attempt.commit_sequence(),
    }
}

impl PersistStreams for SqlitePersistence {
    fn initialize(&self) -> Result<()> {
        self.with_conn(|conn| schema::initialize(conn))
    }

    fn commit(&self, attempt: &CommitAttempt) -> Result<Option<Commit>> {
        let (body, checksum) = encode_body(attempt.headers(), attempt.events())?;

        let commit = self.with_conn(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .or_storage()?;
            // Dropping `tx` on an error path rolls the transaction back.
            let commit = Self::commit_in_transaction(&tx, attempt, &body, checksum)?;
            tx.commit().or_storage()?;
            Ok(commit)
        })?;

        debug!(
            stream_id = %commit.stream_id(),
            checkpoint = commit.checkpoint_token(),
            "commit persisted in sqlite"
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
        self.ensure_open()?;
        let query = PageQuery::Stream {
            bucket_id: bucket_id.to_string(),
            stream_hash: stream_hash(stream_id),
            stream_id: stream_id.to_string(),
            min_revision: revision_param(min_revision),
            max_revision: revision_param(max_revision),
        };
        Ok(self.pages(query, 0))
    }

    fn get_from_time(&self, bucket_id: &BucketId, start_ms: u64) -> Result<Commits<'_>> {
        self.get_from_to(bucket_id, start_ms, u64::MAX)
    }

    fn get_from_to(
        &self,
        bucket_id: &BucketId,
        start_ms: u64,
        end_ms: u64,
    ) -> Result<Commits<'_>> {
        self.ensure_open()?;
        let query = PageQuery::TimeWindow {
            bucket_id: bucket_id.to_string(),
            start_ms: i64::try_from(start_ms).unwrap_or(i64::MAX),
            end_ms: i64::try_from(end_ms).unwrap_or(i64::MAX),
        };
        Ok(self.pages(query, 0))
    }

    fn get_from_checkpoint(&self, checkpoint_token: Option<&str>) -> Result<Commits<'_>> {
        let after = self.get_checkpoint(checkpoint_token)?;
        self.ensure_open()?;
        let cursor = i64::try_from(after.as_raw()).unwrap_or(i64::MAX);
        Ok(self.pages(PageQuery::AfterCheckpoint, cursor))
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
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT stream_revision, payload FROM snapshots
                 WHERE bucket_id = ?1 AND stream_hash = ?2 AND stream_id = ?3 AND stream_revision <= ?4
                 ORDER BY stream_revision DESC
                 LIMIT 1",
                params![
                    bucket_id.as_str(),
                    stream_hash(stream_id),
                    stream_id.as_str(),
                    revision_param(max_revision),
                ],
                |row| {
                    let revision: i64 = row.get(0)?;
                    let payload: Vec<u8> = row.get(1)?;
                    Ok(Snapshot::new(
                        bucket_id.clone(),
                        stream_id.clone(),
                        StreamRev::from_raw(revision as u64),
                        payload,
                    ))
                },
            )
            .optional()
            .or_storage()
        })
    }

    fn add_snapshot(&self, snapshot: &Snapshot) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .or_storage()?;
    
            let revision = revision_param(snapshot.stream_revision);
            let updated = tx
                .execute(
                    "UPDATE stream_heads SET snapshot_revision = MAX(snapshot_revision, ?1)
                     WHERE bucket_id = ?2 AND stream_id = ?3",
                    params![revision, snapshot.bucket_id.as_str(), snapshot.stream_id.as_str()],
                )
                .or_storage()?;
            if updated == 0 {
                return Ok(false);
            }
    
            tx.execute(
                "INSERT OR REPLACE INTO snapshots (bucket_id, stream_hash, stream_id, stream_revision, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    snapshot.bucket_id.as_str(),
                    stream_hash(&snapshot.stream_id),
                    snapshot.stream_id.as_str(),
                    revision,
                    snapshot.payload,
                ],
            )
            .or_storage()?;
            tx.commit().or_storage()?;
            Ok(true)
        })
    }

    fn get_streams_to_snapshot(
        &self,
        bucket_id: &BucketId,
        max_threshold: u64,
    ) -> Result<StreamHeads<'_>> {
        let heads = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT bucket_id, stream_id, head_revision, head_commit_sequence, snapshot_revision
                     FROM stream_heads
                     WHERE bucket_id = ?1 AND head_revision - snapshot_revision >= ?2
                     ORDER BY head_revision - snapshot_revision DESC",
                )
                .or_storage()?;
            let heads = stmt
                .query_map(
                    params![bucket_id.as_str(), i64::try_from(max_threshold).unwrap_or(i64::MAX)],
                    |row| {
                        Ok(StreamHead {
                            bucket_id: BucketId::new(row.get::<_, String>(0)?),
                            stream_id: StreamId::new(row.get::<_, String>(1)?),
                            head_revision: StreamRev::from_raw(row.get::<_, i64>(2)? as u64),
                            head_commit_sequence: row.get::<_, i64>(3)? as u64,
                            snapshot_revision: StreamRev::from_raw(row.get::<_, i64>(4)? as u64),
                        })
                    },
                )
                .or_storage()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .or_storage()?;
            Ok(heads)
        })?;
        Ok(Box::new(heads.into_iter().map(Ok)))
    }

    fn purge(&self) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction().or_storage()?;
            tx.execute_batch(
                "DELETE FROM snapshots;
                 DELETE FROM stream_heads;
                 DELETE FROM commits;",
            )
            .or_storage()?;
            tx.commit().or_storage()
        })?;
        info!("sqlite storage purged");
        Ok(())
    }

    fn purge_bucket(&self, bucket_id: &BucketId) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction().or_storage()?;
            for table in ["snapshots", "stream_heads", "commits"] {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE bucket_id = ?1"),
                    [bucket_id.as_str()],
                )
                .or_storage()?;
            }
            tx.commit().or_storage()
        })
    }

    fn drop_storage(&self) -> Result<()> {
        self.with_conn(|conn| {
            schema::drop_all(conn)?;
            info!("sqlite tables dropped");
            // Recreate empty tables so the engine stays usable.
            schema::initialize(conn)
        })
    }

    fn delete_stream(&self, bucket_id: &BucketId, stream_id: &StreamId) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction().or_storage()?;
            for table in ["snapshots", "stream_heads", "commits"] {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE bucket_id = ?1 AND stream_hash = ?2 AND stream_id = ?3"),
                    params![bucket_id.as_str(), stream_hash(stream_id), stream_id.as_str()],
                )
                .or_storage()?;
            }
            tx.commit().or_storage()
        })?;
        debug!(%bucket_id, %stream_id, "stream deleted from sqlite");
        Ok(())
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(conn) = conn {
            if let Err((_, e)) = conn.close() {
                warn!(error = %e, "sqlite connection did not close cleanly");
            }
        }
        info!("sqlite engine disposed");
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Revisions are stored as `INTEGER`; `StreamRev::MAX` is exactly `i64::MAX`.
fn revision_param(revision: StreamRev) -> i64 {
    i64::try_from(revision.as_raw()).unwrap_or(i64::MAX)
}

// =============================================================================
// Lazy Paging
// =============================================================================

enum PageQuery {
    /// Commits of one stream, paged by commit sequence.
    Stream {
        bucket_id: String,
        stream_hash: i64,
        stream_id: String,
        min_revision: i64,
        max_revision: i64,
    },
    /// Commits of one bucket stamped in `[start_ms, end_ms)`, paged by checkpoint.
    TimeWindow {
        bucket_id: String,
        start_ms: i64,
        end_ms: i64,
    },
    /// Every commit, paged by checkpoint.
    AfterCheckpoint,
}

impl PageQuery {
    fn cursor_of(&self, raw: &RawCommit) -> i64 {
        match self {
            PageQuery::Stream { .. } => raw.commit_sequence,
            PageQuery::TimeWindow { .. } | PageQuery::AfterCheckpoint => raw.checkpoint,
        }
    }
}

/// Iterator that pulls commits from SQLite one page at a time.
pub struct CommitPages<'a> {
    engine: &'a SqlitePersistence,
    query: PageQuery,
    cursor: i64,
    buffer: VecDeque<RawCommit>,
    exhausted: bool,
}

impl Iterator for CommitPages<'_> {
    type Item = Result<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(raw) = self.buffer.pop_front() {
            return Some(raw.into_commit());
        }
        if self.exhausted {
            return None;
        }

        match self.engine.fetch_page(&self.query, self.cursor) {
            Ok(rows) => {
                if rows.len() < self.engine.config.effective_page_size() {
                    self.exhausted = true;
                }
                if let Some(last) = rows.last() {
                    self.cursor = self.query.cursor_of(last);
                }
                self.buffer.extend(rows);
                self.buffer.pop_front().map(RawCommit::into_commit)
            }
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

/// A commit row before its body is verified and decoded.
struct RawCommit {
    checkpoint: i64,
    bucket_id: String,
    stream_id: String,
    stream_revision: i64,
    commit_id: String,
    commit_sequence: i64,
    commit_stamp: i64,
    checksum: i64,
    body: Vec<u8>,
}

impl RawCommit {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            checkpoint: row.get(0)?,
            bucket_id: row.get(1)?,
            stream_id: row.get(2)?,
            stream_revision: row.get(3)?,
            commit_id: row.get(4)?,
            commit_sequence: row.get(5)?,
            commit_stamp: row.get(6)?,
            checksum: row.get(7)?,
            body: row.get(8)?,
        })
    }

    fn into_commit(self) -> Result<Commit> {
        let (headers, events) = decode_body(&self.body, self.checksum, self.checkpoint)?;
        let commit_id = Uuid::parse_str(&self.commit_id).map_err(Error::storage)?;
        Ok(Commit::new(
            self.bucket_id,
            self.stream_id,
            StreamRev::from_raw(self.stream_revision as u64),
            CommitId::from_uuid(commit_id),
            self.commit_sequence as u64,
            self.commit_stamp as u64,
            Checkpoint::from_raw(self.checkpoint as u64).value(),
            headers,
            events,
        ))
    }
}
