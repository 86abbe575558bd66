//! Engine configuration.

use std::time::Duration;

/// Default number of commits fetched per read page.
///
/// Reads hold the connection lock only while a page is fetched, so smaller
/// pages interleave better with writers and larger pages mean fewer queries.
pub const DEFAULT_PAGE_SIZE: usize = 128;

/// Default time SQLite waits on a locked database before giving up.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Configuration for [`SqlitePersistence`](crate::SqlitePersistence).
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Maximum commits fetched per page of a lazy read. Zero is treated as one.
    pub page_size: usize,

    /// How long a statement waits for another connection's lock.
    ///
    /// Exceeding it surfaces as a transient
    /// [`Error::StorageUnavailable`](commitstore::Error::StorageUnavailable).
    pub busy_timeout: Duration,
}

impl SqliteConfig {
    pub(crate) fn effective_page_size(&self) -> usize {
        self.page_size.max(1)
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}
