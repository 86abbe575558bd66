//! Translation of rusqlite and serde_json failures into store errors.
//!
//! `commitstore::Error` lives in another crate, so a `From` impl is not
//! possible here. Every fallible SQLite call goes through
//! [`SqliteResultExt::or_storage`] instead.
//!
//! | SQLite outcome | Store error |
//! |----------------|-------------|
//! | `SQLITE_BUSY`, `SQLITE_LOCKED` | `StorageUnavailable` (transient) |
//! | anything else | `Storage` |
//!
//! Constraint violations are not translated here: the commit path inspects
//! them itself to tell a conflict from a duplicate.

use commitstore::{Error, Result};
use rusqlite::ErrorCode;

/// Converts a rusqlite error into the store's error type.
pub(crate) fn from_sqlite(err: rusqlite::Error) -> Error {
    match sqlite_code(&err) {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => Error::unavailable(err),
        _ => Error::storage(err),
    }
}

/// The primary SQLite result code carried by `err`, if any.
pub(crate) fn sqlite_code(err: &rusqlite::Error) -> Option<ErrorCode> {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.code),
        _ => None,
    }
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    sqlite_code(err) == Some(ErrorCode::ConstraintViolation)
}

pub(crate) trait SqliteResultExt<T> {
    fn or_storage(self) -> Result<T>;
}

impl<T> SqliteResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn or_storage(self) -> Result<T> {
        self.map_err(from_sqlite)
    }
}

impl<T> SqliteResultExt<T> for std::result::Result<T, serde_json::Error> {
    fn or_storage(self) -> Result<T> {
        self.map_err(Error::storage)
    }
}
