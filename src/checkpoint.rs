//! # Checkpoints
//!
//! A checkpoint is the position of a commit in the global, cross-stream order
//! of an engine. Readers remember the checkpoint of the last commit they
//! processed and resume with [`PersistStreams::get_from_checkpoint`] without
//! rescanning.
//!
//! The token handed out on each [`Commit`] is opaque to the core: it is only
//! ever compared and forwarded. Both bundled engines number commits with a
//! strictly increasing integer, and an engine with a richer token format maps
//! it onto this ordinal in [`PersistStreams::get_checkpoint`].
//!
//! [`PersistStreams::get_from_checkpoint`]: crate::persistence::PersistStreams::get_from_checkpoint
//! [`PersistStreams::get_checkpoint`]: crate::persistence::PersistStreams::get_checkpoint
//! [`Commit`]: crate::commit::Commit

use std::fmt;

use crate::error::{Error, Result};

/// A totally ordered position in an engine's global commit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Checkpoint(u64);

impl Checkpoint {
    /// The position before the first commit.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Creates a checkpoint from a raw ordinal.
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw ordinal.
    pub fn as_raw(&self) -> u64 {
        self.0
    }

    /// Parses a persisted token.
    ///
    /// An absent or empty token is the zero checkpoint, so "start from the
    /// beginning" needs no special casing by callers.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCheckpoint`] if the token is not a non-negative integer.
    pub fn parse(token: Option<&str>) -> Result<Self> {
        match token.map(str::trim) {
            None | Some("") => Ok(Self::zero()),
            Some(raw) => raw
                .parse::<u64>()
                .map(Self)
                .map_err(|_| Error::InvalidCheckpoint {
                    token: raw.to_string(),
                }),
        }
    }

    /// Returns the token form, suitable for persisting and parsing back.
    pub fn value(&self) -> String {
        self.0.to_string()
    }

    /// Returns the next checkpoint.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
