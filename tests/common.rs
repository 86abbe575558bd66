#![allow(dead_code)]

//! Shared fixtures: a scripted engine that records every call, and hooks
//! that record every invocation into a shared log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use commitstore::{
    BucketId, Checkpoint, Commit, CommitAttempt, CommitId, Commits, Error, EventMessage, Headers,
    PersistStreams, PipelineHook, Result, Snapshot, StreamHeads, StreamId, StreamRev,
};

pub const STREAM: &str = "order-1";

pub fn bucket() -> BucketId {
    BucketId::default()
}

pub fn stream() -> StreamId {
    StreamId::new(STREAM)
}

pub fn rev(value: u64) -> StreamRev {
    StreamRev::from_raw(value)
}

/// A commit at `revision` holding one event per `events`.
pub fn build_commit(revision: u64, sequence: u64, events: usize) -> Commit {
    Commit::new(
        bucket(),
        stream(),
        rev(revision),
        CommitId::new(),
        sequence,
        0,
        sequence.to_string(),
        Headers::new(),
        (0..events).map(|_| EventMessage::default()).collect(),
    )
}

pub fn build_attempt(revision: u64, sequence: u64) -> CommitAttempt {
    CommitAttempt::new(
        bucket(),
        stream(),
        rev(revision),
        CommitId::new(),
        sequence,
        0,
        Headers::new(),
        vec![EventMessage::new(b"payload".to_vec())],
    )
    .expect("valid attempt")
}

// =============================================================================
// Scripted Engine
// =============================================================================

/// A call the store made on the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetFrom {
        bucket_id: BucketId,
        stream_id: StreamId,
        min_revision: StreamRev,
        max_revision: StreamRev,
    },
    GetFromCheckpoint(Option<String>),
    Commit(CommitId),
    Purge(Option<BucketId>),
    DeleteStream(StreamId),
    Dispose,
}

type Script = HashMap<(BucketId, StreamId, StreamRev, StreamRev), Vec<Commit>>;
type ErrorFactory = Box<dyn Fn(&CommitAttempt) -> Error + Send + Sync>;

/// Engine double: replays scripted reads, records every call, and counts how
/// many commits its read iterators actually produced.
#[derive(Default)]
pub struct FakePersistence {
    calls: Mutex<Vec<Call>>,
    script: Mutex<Script>,
    global: Mutex<Vec<Commit>>,
    commit_error: Mutex<Option<ErrorFactory>>,
    produced: Arc<AtomicUsize>,
    disposals: AtomicUsize,
}

impl FakePersistence {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Scripts the result of `get_from` for exactly these bounds.
    pub fn returns_for(&self, min: StreamRev, max: StreamRev, commits: Vec<Commit>) {
        self.script
            .lock()
            .unwrap()
            .insert((bucket(), stream(), min, max), commits);
    }

    /// Scripts the global log returned by `get_from_checkpoint`.
    pub fn returns_global(&self, commits: Vec<Commit>) {
        *self.global.lock().unwrap() = commits;
    }

    /// Makes every `commit` fail with the error built by `factory`.
    pub fn fail_commits_with(
        &self,
        factory: impl Fn(&CommitAttempt) -> Error + Send + Sync + 'static,
    ) {
        *self.commit_error.lock().unwrap() = Some(Box::new(factory));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn get_from_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::GetFrom { .. }))
            .collect()
    }

    pub fn commit_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Commit(_)))
            .count()
    }

    /// Number of commits pulled out of read iterators so far.
    pub fn produced(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn counting(&self, commits: Vec<Commit>) -> Commits<'_> {
        let produced = Arc::clone(&self.produced);
        Box::new(commits.into_iter().map(move |c| {
            produced.fetch_add(1, Ordering::SeqCst);
            Ok(c)
        }))
    }
}

impl PersistStreams for FakePersistence {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn commit(&self, attempt: &CommitAttempt) -> Result<Option<Commit>> {
        self.record(Call::Commit(attempt.commit_id()));
        if let Some(factory) = self.commit_error.lock().unwrap().as_ref() {
            return Err(factory(attempt));
        }
        Ok(Some(attempt.clone().into_commit(Checkpoint::from_raw(1))))
    }

    fn get_from(
        &self,
        bucket_id: &BucketId,
        stream_id: &StreamId,
        min_revision: StreamRev,
        max_revision: StreamRev,
    ) -> Result<Commits<'_>> {
        self.record(Call::GetFrom {
            bucket_id: bucket_id.clone(),
            stream_id: stream_id.clone(),
            min_revision,
            max_revision,
        });
        let commits = self
            .script
            .lock()
            .unwrap()
            .get(&(bucket_id.clone(), stream_id.clone(), min_revision, max_revision))
            .cloned()
            .unwrap_or_default();
        Ok(self.counting(commits))
    }

    fn get_from_time(&self, _bucket_id: &BucketId, _start_ms: u64) -> Result<Commits<'_>> {
        Ok(Box::new(std::iter::empty()))
    }

    fn get_from_to(&self, _bucket_id: &BucketId, _start: u64, _end: u64) -> Result<Commits<'_>> {
        Ok(Box::new(std::iter::empty()))
    }

    fn get_from_checkpoint(&self, checkpoint_token: Option<&str>) -> Result<Commits<'_>> {
        self.record(Call::GetFromCheckpoint(checkpoint_token.map(str::to_string)));
        let commits = self.global.lock().unwrap().clone();
        Ok(self.counting(commits))
    }

    fn get_checkpoint(&self, checkpoint_token: Option<&str>) -> Result<Checkpoint> {
        Checkpoint::parse(checkpoint_token)
    }

    fn get_snapshot(
        &self,
        _bucket_id: &BucketId,
        _stream_id: &StreamId,
        _max_revision: StreamRev,
    ) -> Result<Option<Snapshot>> {
        Ok(None)
    }

    fn add_snapshot(&self, _snapshot: &Snapshot) -> Result<bool> {
        Ok(false)
    }

    fn get_streams_to_snapshot(
        &self,
        _bucket_id: &BucketId,
        _max_threshold: u64,
    ) -> Result<StreamHeads<'_>> {
        Ok(Box::new(std::iter::empty()))
    }

    fn purge(&self) -> Result<()> {
        self.record(Call::Purge(None));
        Ok(())
    }

    fn purge_bucket(&self, bucket_id: &BucketId) -> Result<()> {
        self.record(Call::Purge(Some(bucket_id.clone())));
        Ok(())
    }

    fn drop_storage(&self) -> Result<()> {
        Ok(())
    }

    fn delete_stream(&self, _bucket_id: &BucketId, stream_id: &StreamId) -> Result<()> {
        self.record(Call::DeleteStream(stream_id.clone()));
        Ok(())
    }

    fn dispose(&self) {
        self.record(Call::Dispose);
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }

    fn is_disposed(&self) -> bool {
        self.disposals() > 0
    }
}

// =============================================================================
// Recording Hooks
// =============================================================================

/// Shared, ordered log of hook invocations such as `"h1:select"`.
pub type HookLog = Arc<Mutex<Vec<String>>>;

pub fn hook_log() -> HookLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &HookLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub struct RecordingHook {
    name: &'static str,
    log: HookLog,
    approve: bool,
    suppress: bool,
}

impl RecordingHook {
    /// A hook that approves every attempt and keeps every commit.
    pub fn new(name: &'static str, log: &HookLog) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: Arc::clone(log),
            approve: true,
            suppress: false,
        })
    }

    /// A hook that vetoes every attempt.
    pub fn vetoing(name: &'static str, log: &HookLog) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: Arc::clone(log),
            approve: false,
            suppress: false,
        })
    }

    /// A hook that suppresses every commit it reads.
    pub fn suppressing(name: &'static str, log: &HookLog) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: Arc::clone(log),
            approve: true,
            suppress: true,
        })
    }

    fn push(&self, what: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", self.name, what));
    }
}

impl PipelineHook for RecordingHook {
    fn select(&self, commit: Commit) -> Option<Commit> {
        self.push("select");
        if self.suppress {
            None
        } else {
            Some(commit)
        }
    }

    fn pre_commit(&self, _attempt: &CommitAttempt) -> bool {
        self.push("pre_commit");
        self.approve
    }

    fn post_commit(&self, _commit: &Commit) {
        self.push("post_commit");
    }

    fn on_purge(&self, bucket_id: Option<&BucketId>) {
        match bucket_id {
            Some(bucket) => self.push(&format!("on_purge({bucket})")),
            None => self.push("on_purge(all)"),
        }
    }

    fn on_delete_stream(&self, _bucket_id: &BucketId, stream_id: &StreamId) {
        self.push(&format!("on_delete_stream({stream_id})"));
    }

    fn dispose(&self) {
        self.push("dispose");
    }
}

/// Erases a concrete hook into the form the store takes.
pub fn hooks(list: Vec<Arc<RecordingHook>>) -> Vec<Arc<dyn PipelineHook>> {
    list.into_iter()
        .map(|h| h as Arc<dyn PipelineHook>)
        .collect()
}
