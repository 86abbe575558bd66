#![allow(dead_code)]

use std::path::{Path, PathBuf};

use commitstore::{BucketId, CommitId, EventMessage, OptimisticEventStore, StreamRev};
use commitstore_sqlite::{SqliteConfig, SqlitePersistence};
use rusqlite::Connection;

pub fn create_temp_db_file(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    let _ = SqlitePersistence::open(&path).expect("initialize database");
    (dir, path)
}

pub fn open_store(path: &Path) -> OptimisticEventStore<SqlitePersistence> {
    OptimisticEventStore::new(SqlitePersistence::open(path).expect("open engine"), Vec::new())
}

pub fn open_store_with(path: &Path, config: SqliteConfig) -> OptimisticEventStore<SqlitePersistence> {
    let engine = SqlitePersistence::open_with_config(path, config).expect("open engine");
    OptimisticEventStore::new(engine, Vec::new())
}

pub fn open_read_write(path: &Path) -> Connection {
    Connection::open(path).expect("open read-write connection")
}

pub fn event(body: &str) -> EventMessage {
    EventMessage::new(body.as_bytes().to_vec())
}

/// Appends one commit holding `events` to the head of `stream`.
pub fn append(
    store: &OptimisticEventStore<SqlitePersistence>,
    stream: &str,
    events: &[&str],
) -> commitstore::Commit {
    let mut s = store
        .open_stream(BucketId::default(), stream, StreamRev::NONE, StreamRev::NONE)
        .expect("open stream");
    for body in events {
        s.add(event(body));
    }
    store
        .commit_changes(&mut s, CommitId::new())
        .expect("commit")
        .expect("not vetoed")
}

pub fn count_commits(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM commits", [], |row| row.get(0))
        .expect("count commits")
}
