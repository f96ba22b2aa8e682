//! Expiration Timer Module
//!
//! One time-ordered queue per cache schedules every entry's expiry. Each
//! entry holds an [`ExpiryTimer`] naming the one scheduled fire that is
//! allowed to reap it.
//!
//! Lifecycle of a fire:
//! - Armed: the entry's timer generation matches a queued fire.
//! - Cancelled: the entry was removed or refreshed, so no live entry carries
//!   that generation any more. The fire stays queued until popped or compacted.
//! - Firing: the fire was popped while holding the cache's write lock.
//!   A generation mismatch makes it a no-op; a match reaps the entry.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

use tokio::time::Instant;

/// Stale fires tolerated before the queue is compacted, on top of one per
/// live entry.
const COMPACT_SLACK: usize = 64;

/// Stand-in deadline offset (about 30 years) for TTLs too large to add to
/// an Instant, such as `Duration::MAX`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Returns `now + ttl`, saturating to a far-future deadline on overflow.
pub fn deadline_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE)
}

// == Expiry Timer ==
/// Per-entry handle on a scheduled fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryTimer {
    deadline: Instant,
    generation: u64,
}

impl ExpiryTimer {
    pub fn new(deadline: Instant, generation: u64) -> Self {
        Self {
            deadline,
            generation,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// == Scheduled Fire ==
#[derive(Debug)]
struct Scheduled<K> {
    deadline: Instant,
    generation: u64,
    key: K,
}

impl<K> PartialEq for Scheduled<K> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl<K> Eq for Scheduled<K> {}

impl<K> PartialOrd for Scheduled<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Scheduled<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.generation.cmp(&other.generation))
    }
}

// == Expiry Queue ==
/// Min-heap of scheduled fires, earliest deadline first.
#[derive(Debug)]
pub struct ExpiryQueue<K> {
    heap: BinaryHeap<Reverse<Scheduled<K>>>,
    next_generation: u64,
}

impl<K> Default for ExpiryQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ExpiryQueue<K> {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_generation: 0,
        }
    }

    // == Arm ==
    /// Schedules a fire for `key` at `deadline` and returns its timer.
    ///
    /// Generations are never reused, so a fire left over from a removed or
    /// refreshed entry can never match the entry's new timer.
    pub fn arm(&mut self, key: K, deadline: Instant) -> ExpiryTimer {
        self.next_generation += 1;
        let generation = self.next_generation;

        self.heap.push(Reverse(Scheduled {
            deadline,
            generation,
            key,
        }));

        ExpiryTimer::new(deadline, generation)
    }

    // == Next Deadline ==
    /// Returns the earliest queued deadline, stale fires included.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(s)| s.deadline)
    }

    // == Pop Due ==
    /// Pops the earliest fire if its deadline has been reached.
    pub fn pop_due(&mut self, now: Instant) -> Option<(K, u64)> {
        if self.next_deadline()? > now {
            return None;
        }
        self.heap
            .pop()
            .map(|Reverse(s)| (s.key, s.generation))
    }

    // == Compaction ==
    /// Returns true once stale fires clearly outnumber live entries.
    pub fn needs_compaction(&self, live: usize) -> bool {
        self.heap.len() > live.saturating_mul(2) + COMPACT_SLACK
    }

    /// Drops every fire for which `is_live` returns false.
    pub fn retain(&mut self, mut is_live: impl FnMut(&K, u64) -> bool) {
        self.heap
            .retain(|Reverse(s)| is_live(&s.key, s.generation));
    }

    // == Clear ==
    /// Cancels every queued fire.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
