//! # Commit Body Encoding
//!
//! The headers and events of a commit are stored together as one JSON blob in
//! the `commits.body` column, next to an XXH3-64 checksum of that blob.
//!
//! ```text
//!   body     = json({ "headers": {...}, "events": [ {headers, body}, ... ] })
//!   checksum = xxh3_64(body) as i64
//! ```
//!
//! Everything the engine filters or orders on (bucket, stream, revision,
//! sequence, stamp, checkpoint) lives in its own column instead, so reads
//! never decode a body just to decide whether to return it.
//!
//! Stream ids are indexed through [`stream_hash`], an XXH3-64 hash stored as
//! an SQLite `INTEGER`. The original text is kept alongside and compared in
//! every query, so hash collisions cannot mix streams.

use commitstore::{Error, EventMessage, Headers, Result, StreamId};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SqliteResultExt;

#[derive(Serialize)]
struct BodyRef<'a> {
    headers: &'a Headers,
    events: &'a [EventMessage],
}

#[derive(Deserialize)]
struct BodyOwned {
    headers: Headers,
    events: Vec<EventMessage>,
}

/// Encodes a commit body, returning the blob and its checksum.
pub fn encode_body(headers: &Headers, events: &[EventMessage]) -> Result<(Vec<u8>, i64)> {
    let blob = serde_json::to_vec(&BodyRef { headers, events }).or_storage()?;
    let checksum = compute_checksum(&blob);
    Ok((blob, checksum))
}

/// Verifies and decodes a commit body read back from storage.
///
/// `checkpoint` only labels the error when the checksum does not match.
pub fn decode_body(blob: &[u8], checksum: i64, checkpoint: i64) -> Result<(Headers, Vec<EventMessage>)> {
    let actual = compute_checksum(blob);
    if actual != checksum {
        warn!(checkpoint, expected = checksum, actual, "commit body checksum mismatch");
        return Err(Error::storage(format!(
            "corrupted commit body at checkpoint {checkpoint}: checksum mismatch"
        )));
    }
    let body: BodyOwned = serde_json::from_slice(blob).or_storage()?;
    Ok((body.headers, body.events))
}

/// XXH3-64 of `data`, reinterpreted as `i64` for SQLite `INTEGER` storage.
pub fn compute_checksum(data: &[u8]) -> i64 {
    xxhash_rust::xxh3::xxh3_64(data) as i64
}

/// Index key for a stream id.
pub fn stream_hash(stream_id: &StreamId) -> i64 {
    xxhash_rust::xxh3::xxh3_64(stream_id.as_str().as_bytes()) as i64
}
