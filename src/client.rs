//! # Polling Client
//!
//! Observes the global commit log from a checkpoint onward, for projections
//! and dispatchers that must see every commit exactly once and in order.
//!
//! ```text
//!   observe_from("17") ──► poll ──► commits 18, 19, 20 ──► handler
//!                                   checkpoint = "20"
//!                          poll ──► commits 21 ...
//! ```
//!
//! Polling is pull-based: the caller decides when to call
//! [`CommitObserver::poll`]. There are no background threads.

use std::sync::Arc;

use tracing::debug;

use crate::commit::Commit;
use crate::error::Result;
use crate::persistence::PersistStreams;

/// Hands out commit observers over a shared engine.
pub struct PollingClient<P: PersistStreams> {
    persistence: Arc<P>,
    batch_limit: Option<usize>,
}

impl<P: PersistStreams> PollingClient<P> {
    pub fn new(persistence: Arc<P>) -> Self {
        Self {
            persistence,
            batch_limit: None,
        }
    }

    /// Caps the number of commits a single poll delivers.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = Some(limit);
        self
    }

    /// Starts observing after `checkpoint_token`; `None` starts at the beginning.
    pub fn observe_from(&self, checkpoint_token: Option<&str>) -> CommitObserver<P> {
        CommitObserver {
            persistence: Arc::clone(&self.persistence),
            checkpoint_token: checkpoint_token.map(str::to_string),
            batch_limit: self.batch_limit,
        }
    }
}

/// A resumable cursor over the global commit log.
pub struct CommitObserver<P: PersistStreams> {
    persistence: Arc<P>,
    checkpoint_token: Option<String>,
    batch_limit: Option<usize>,
}

impl<P: PersistStreams> CommitObserver<P> {
    /// Token of the last commit delivered, or the starting token.
    pub fn checkpoint_token(&self) -> Option<&str> {
        self.checkpoint_token.as_deref()
    }

    /// Delivers every commit after the current checkpoint to `handler`.
    ///
    /// The checkpoint advances after each delivered commit, so an error part
    /// way through resumes after the last commit the handler saw. Returns the
    /// number of commits delivered.
    pub fn poll<F>(&mut self, mut handler: F) -> Result<usize>
    where
        F: FnMut(&Commit),
    {
        let limit = self.batch_limit.unwrap_or(usize::MAX);
        let commits = self
            .persistence
            .get_from_checkpoint(self.checkpoint_token.as_deref())?;

        let mut delivered = 0;
        for commit in commits.take(limit) {
            let commit = commit?;
            handler(&commit);
            self.checkpoint_token = Some(commit.checkpoint_token().to_string());
            delivered += 1;
        }

        if delivered > 0 {
            debug!(
                delivered,
                checkpoint = self.checkpoint_token.as_deref().unwrap_or(""),
                "observer caught up"
            );
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::CommitAttempt;
    use crate::memory::InMemoryPersistence;
    use crate::types::{CommitId, EventMessage, Headers, StreamRev};

    fn commit(engine: &InMemoryPersistence, stream: &str, revision: u64) {
        let attempt = CommitAttempt::new(
            "default",
            stream,
            StreamRev::from_raw(revision),
            CommitId::new(),
            revision,
            0,
            Headers::new(),
            vec![EventMessage::default()],
        )
        .unwrap();
        engine.commit(&attempt).unwrap();
    }

    #[test]
    fn test_poll_resumes_after_last_delivered() {
        let engine = Arc::new(InMemoryPersistence::new());
        commit(&engine, "a", 1);
        commit(&engine, "b", 1);

        let client = PollingClient::new(Arc::clone(&engine));
        let mut observer = client.observe_from(None);

        let mut seen = Vec::new();
        assert_eq!(observer.poll(|c| seen.push(c.stream_id().to_string())).unwrap(), 2);
        assert_eq!(observer.poll(|_| {}).unwrap(), 0);

        commit(&engine, "a", 2);
        assert_eq!(observer.poll(|c| seen.push(c.stream_id().to_string())).unwrap(), 1);
        assert_eq!(seen, vec!["a", "b", "a"]);
        assert_eq!(observer.checkpoint_token(), Some("3"));
    }

    #[test]
    fn test_batch_limit() {
        let engine = Arc::new(InMemoryPersistence::new());
        for rev in 1..=5 {
            commit(&engine, "a", rev);
        }

        let client = PollingClient::new(Arc::clone(&engine)).with_batch_limit(2);
        let mut observer = client.observe_from(Some("1"));
        assert_eq!(observer.poll(|_| {}).unwrap(), 2);
        assert_eq!(observer.checkpoint_token(), Some("3"));
        assert_eq!(observer.poll(|_| {}).unwrap(), 2);
        assert_eq!(observer.poll(|_| {}).unwrap(), 0);
    }
}
