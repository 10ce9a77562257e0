/// Deferred tasks and request ordering
///
/// Teardown that must happen after a fade is queued here with the identity of
/// the voice it targets, and fired by the engine tick once its time is due.
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

/// Stable identity of one voice for the engine's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(u64);

impl VoiceId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Monotonic voice id source
#[derive(Debug, Default)]
pub struct VoiceIds {
    next: u64,
}

impl VoiceIds {
    pub fn next_id(&mut self) -> VoiceId {
        self.next += 1;
        VoiceId(self.next)
    }
}

/// Ordering of BGM requests
///
/// Every `play_bgm`/`stop_bgm` is issued a ticket when called. A request
/// commits its ticket only once it takes effect, and a play whose ticket is
/// older than the newest committed one must not start. Requests that fail
/// never commit, so they cannot cancel anything.
#[derive(Debug, Default)]
pub struct RequestTickets {
    issued: AtomicU64,
    committed: AtomicU64,
}

impl RequestTickets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> u64 {
        self.issued.fetch_add(1, AtomicOrdering::SeqCst) + 1
    }

    pub fn commit(&self, ticket: u64) {
        self.committed.fetch_max(ticket, AtomicOrdering::SeqCst);
    }

    /// Check if a newer request already took effect
    pub fn is_stale(&self, ticket: u64) -> bool {
        self.committed.load(AtomicOrdering::SeqCst) > ticket
    }
}

/// Work to run once its due time passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredTask {
    /// Hard-stop and disconnect a faded-out BGM voice
    StopBgmVoice(VoiceId),
}

#[derive(Debug, PartialEq, Eq)]
struct Scheduled {
    due: Duration,
    seq: u64,
    task: DeferredTask,
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Time-ordered queue of deferred tasks
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` to fire at `due`; equal times fire in scheduling order
    pub fn schedule(&mut self, due: Duration, task: DeferredTask) {
        self.seq += 1;
        self.heap.push(Reverse(Scheduled {
            due,
            seq: self.seq,
            task,
        }));
    }

    /// Remove and return every task due at or before `now`
    pub fn drain_due(&mut self, now: Duration) -> Vec<DeferredTask> {
        let mut due = Vec::new();
        while let Some(Reverse(next)) = self.heap.peek() {
            if next.due > now {
                break;
            }
            if let Some(Reverse(scheduled)) = self.heap.pop() {
                due.push(scheduled.task);
            }
        }
        due
    }

    /// Earliest pending due time
    pub fn next_due(&self) -> Option<Duration> {
        self.heap.peek().map(|Reverse(s)| s.due)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
