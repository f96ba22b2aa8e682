//! Cache Store Module
//!
//! Main cache engine combining an indexed LRU list with per-entry TTL timers.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::{deadline_after, CacheEntry, ExpiryQueue, LruList, NodeId};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::spawn_reaper;

/// Callback invoked with the key and value of every entry leaving the cache.
pub type EvictCallback<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

// == Cache State ==
/// Everything guarded by the cache lock.
struct State<K, V> {
    /// Entries, front = most recently used
    order: LruList<CacheEntry<K, V>>,
    /// Key -> position in `order`
    index: HashMap<K, NodeId>,
    /// Scheduled expiry fires for every entry
    timers: ExpiryQueue<K>,
    /// Maximum number of live entries, always >= 1
    capacity: usize,
}

impl<K, V> State<K, V>
where
    K: Hash + Eq + Clone,
{
    fn new(capacity: usize) -> Self {
        Self {
            order: LruList::new(),
            index: HashMap::new(),
            timers: ExpiryQueue::new(),
            capacity,
        }
    }

    // == Insert ==
    /// Inserts or refreshes `key`, returning true if a new insert pushed the
    /// least recently used entry out.
    fn insert(
        &mut self,
        key: K,
        value: V,
        expires_at: Instant,
        evicted: &mut Vec<(K, V)>,
    ) -> bool {
        let timer = self.timers.arm(key.clone(), expires_at);

        if let Some(&id) = self.index.get(&key) {
            // Refresh in place: the re-armed timer supersedes the old one
            if let Some(entry) = self.order.get_mut(id) {
                entry.value = value;
                entry.timer = timer;
            }
            self.order.move_to_front(id);
            self.compact_timers();
            return false;
        }

        let id = self
            .order
            .push_front(CacheEntry::new(key.clone(), value, timer));
        self.index.insert(key, id);

        let evict = self.order.len() > self.capacity;
        if evict {
            if let Some(pair) = self.remove_oldest() {
                evicted.push(pair);
            }
            debug!(capacity = self.capacity, "Evicted least recently used entry");
        }
        self.compact_timers();
        evict
    }

    // == Removal ==
    /// Removes one entry by key. The single exit path for every removal
    /// reason except purge.
    fn remove(&mut self, key: &K) -> Option<(K, V)> {
        let id = self.index.remove(key)?;
        let entry = self.order.remove(id)?;
        self.compact_timers();
        Some((entry.key, entry.value))
    }

    fn remove_oldest(&mut self) -> Option<(K, V)> {
        let entry = self.order.pop_back()?;
        self.index.remove(&entry.key);
        self.compact_timers();
        Some((entry.key, entry.value))
    }

    fn oldest(&self) -> Option<&CacheEntry<K, V>> {
        self.order.back().and_then(|id| self.order.get(id))
    }

    fn entry(&self, key: &K) -> Option<&CacheEntry<K, V>> {
        self.index.get(key).and_then(|&id| self.order.get(id))
    }

    // == Reaping ==
    /// Removes every entry whose armed timer has fired by `now`.
    ///
    /// Fires whose generation no longer matches the entry (refreshed,
    /// removed, or re-added since) are discarded silently.
    fn reap_due(&mut self, now: Instant, evicted: &mut Vec<(K, V)>) {
        while let Some((key, generation)) = self.timers.pop_due(now) {
            let armed = self
                .entry(&key)
                .is_some_and(|entry| entry.timer.generation() == generation);
            if armed {
                if let Some(pair) = self.remove(&key) {
                    evicted.push(pair);
                }
            }
        }
    }

    /// Drops cancelled fires once they pile up under churn.
    fn compact_timers(&mut self) {
        if !self.timers.needs_compaction(self.index.len()) {
            return;
        }
        let Self {
            order,
            index,
            timers,
            ..
        } = self;
        timers.retain(|key, generation| {
            index
                .get(key)
                .and_then(|&id| order.get(id))
                .is_some_and(|entry| entry.timer.generation() == generation)
        });
    }

    fn drain(&mut self) -> Vec<(K, V)> {
        self.index.clear();
        self.timers.clear();
        self.order
            .drain()
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect()
    }
}

// == Shared Core ==
/// State shared between cache handles and the background reaper.
pub(crate) struct Shared<K, V> {
    state: RwLock<State<K, V>>,
    on_evict: Option<EvictCallback<K, V>>,
    /// Wakes the reaper when an earlier deadline is scheduled
    pub(crate) wakeup: Arc<Notify>,
}

impl<K, V> Shared<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Hands removed pairs to the eviction callback.
    ///
    /// Always called after the lock has been released.
    fn dispatch(&self, evicted: &[(K, V)]) {
        if let Some(on_evict) = &self.on_evict {
            for (key, value) in evicted {
                on_evict(key, value);
            }
        }
    }

    /// Reaps all due entries and returns the next deadline to sleep until.
    pub(crate) fn reap_expired(&self) -> (usize, Option<Instant>) {
        let mut evicted = Vec::new();
        let next = {
            let mut state = self.state.write();
            state.reap_due(Instant::now(), &mut evicted);
            state.timers.next_deadline()
        };
        self.dispatch(&evicted);
        (evicted.len(), next)
    }
}

// == TTL LRU Cache ==
/// Fixed-capacity, thread-safe LRU cache whose entries also expire after a TTL.
///
/// Entries leave the cache when:
/// - a new insert exceeds capacity (the least recently used entry goes),
/// - their TTL elapses (reaped by a background Tokio task, or lazily by `get`),
/// - they are removed explicitly, or the cache is purged or shrunk.
///
/// Every departure calls the eviction callback exactly once. Callbacks run
/// after the internal lock is released, so they may call back into the cache.
///
/// Construction must happen inside a Tokio runtime; every other method is
/// synchronous and can be called from any thread. Dropping the cache stops
/// its background task.
///
/// The background task lives on the runtime the cache was built in. If that
/// runtime shuts down while the cache is still in use, expired entries are
/// no longer reaped in the background: `get` still refuses stale entries and
/// `remove_expired` still sweeps them, but untouched entries stay counted by
/// `len` and `keys` until then.
pub struct TtlLruCache<K, V> {
    pub(crate) shared: Arc<Shared<K, V>>,
    ttl: Duration,
    reaper: JoinHandle<()>,
}

impl<K, V> TtlLruCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    // == Constructors ==
    /// Creates a cache holding at most `capacity` entries, each expiring
    /// `ttl` after its last insert or refresh.
    ///
    /// # Errors
    /// - `InvalidConfiguration` if `capacity` is zero
    /// - `NoRuntime` if called outside a Tokio runtime
    pub fn new(capacity: usize, ttl: Duration) -> Result<Self> {
        Self::build(capacity, ttl, None)
    }

    /// Same as [`TtlLruCache::new`], with a callback run for every entry
    /// that leaves the cache.
    pub fn with_evict<F>(capacity: usize, ttl: Duration, on_evict: F) -> Result<Self>
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        Self::build(capacity, ttl, Some(Box::new(on_evict)))
    }

    /// Creates a cache from a [`CacheConfig`].
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::new(config.capacity, config.ttl())
    }

    fn build(
        capacity: usize,
        ttl: Duration,
        on_evict: Option<EvictCallback<K, V>>,
    ) -> Result<Self> {
        validate_capacity(capacity)?;
        let handle = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;

        let shared = Arc::new(Shared {
            state: RwLock::new(State::new(capacity)),
            on_evict,
            wakeup: Arc::new(Notify::new()),
        });
        let reaper = spawn_reaper(&handle, &shared);

        Ok(Self {
            shared,
            ttl,
            reaper,
        })
    }

    // == Add ==
    /// Inserts or refreshes a key using the cache's TTL.
    ///
    /// Returns true if inserting a new key evicted the least recently used
    /// entry. Refreshing an existing key never evicts.
    pub fn add(&self, key: K, value: V) -> bool {
        self.add_with_ttl(key, value, self.ttl)
    }

    /// Inserts or refreshes a key with a TTL overriding the cache default.
    ///
    /// A TTL too large to represent (e.g. `Duration::MAX`) is treated as
    /// "never expires" in practice.
    pub fn add_with_ttl(&self, key: K, value: V, ttl: Duration) -> bool {
        let expires_at = deadline_after(Instant::now(), ttl);
        let mut evicted = Vec::new();

        let (was_evicted, earliest) = {
            let mut state = self.shared.state.write();
            let was_evicted = state.insert(key, value, expires_at, &mut evicted);
            (was_evicted, state.timers.next_deadline() == Some(expires_at))
        };

        if earliest {
            self.shared.wakeup.notify_one();
        }
        self.shared.dispatch(&evicted);
        was_evicted
    }

    // == Get ==
    /// Looks up a key, marking it most recently used.
    ///
    /// An entry past its TTL is removed on the spot (its callback fires)
    /// and reported as absent, even if its timer has not fired yet.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let now = Instant::now();
        let expired = {
            let mut state = self.shared.state.write();
            let id = *state.index.get(key)?;
            let is_expired = state.order.get(id)?.is_expired_at(now);
            if !is_expired {
                state.order.move_to_front(id);
                return state.order.get(id).map(|entry| entry.value.clone());
            }
            state.remove(key)
        };

        if let Some(pair) = expired {
            self.shared.dispatch(std::slice::from_ref(&pair));
        }
        None
    }

    // == Peek ==
    /// Returns a key's value without touching recency or checking TTL.
    pub fn peek(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.shared
            .state
            .read()
            .entry(key)
            .map(|entry| entry.value.clone())
    }

    // == Contains ==
    /// Checks for a key without touching recency or checking TTL.
    pub fn contains(&self, key: &K) -> bool {
        self.shared.state.read().index.contains_key(key)
    }

    // == Remove ==
    /// Removes a key, returning whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        let removed = self.shared.state.write().remove(key);
        match removed {
            Some(pair) => {
                self.shared.dispatch(std::slice::from_ref(&pair));
                true
            }
            None => false,
        }
    }

    // == Oldest ==
    /// Removes and returns the least recently used entry.
    pub fn remove_oldest(&self) -> Option<(K, V)> {
        let pair = self.shared.state.write().remove_oldest()?;
        self.shared.dispatch(std::slice::from_ref(&pair));
        Some(pair)
    }

    /// Returns the least recently used entry without removing it.
    pub fn get_oldest(&self) -> Option<(K, V)>
    where
        V: Clone,
    {
        self.shared
            .state
            .read()
            .oldest()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
    }

    // == Purge ==
    /// Removes every entry, calling the eviction callback for each.
    pub fn purge(&self) {
        let evicted = self.shared.state.write().drain();
        debug!(count = evicted.len(), "Purged cache");
        self.shared.dispatch(&evicted);
    }

    // == Resize ==
    /// Changes the capacity, evicting least recently used entries until the
    /// cache fits. Returns how many entries were evicted.
    ///
    /// # Errors
    /// `InvalidConfiguration` if `capacity` is zero; the cache is untouched.
    pub fn resize(&self, capacity: usize) -> Result<usize> {
        validate_capacity(capacity)?;

        let mut evicted = Vec::new();
        {
            let mut state = self.shared.state.write();
            state.capacity = capacity;
            while state.order.len() > capacity {
                match state.remove_oldest() {
                    Some(pair) => evicted.push(pair),
                    None => break,
                }
            }
        }

        if !evicted.is_empty() {
            debug!(capacity, count = evicted.len(), "Resize evicted entries");
        }
        self.shared.dispatch(&evicted);
        Ok(evicted.len())
    }

    // == Remove Expired ==
    /// Reaps every entry whose TTL has elapsed without waiting for the
    /// background task. Returns the number of entries removed.
    pub fn remove_expired(&self) -> usize {
        self.shared.reap_expired().0
    }

    // == Keys ==
    /// Returns all keys from least to most recently used.
    ///
    /// Expired entries not yet reaped are included.
    pub fn keys(&self) -> Vec<K> {
        self.shared
            .state
            .read()
            .order
            .iter()
            .map(|entry| entry.key.clone())
            .collect()
    }

    // == Expires In ==
    /// Returns how long until a key expires, `Duration::ZERO` if overdue.
    pub fn expires_in(&self, key: &K) -> Option<Duration> {
        let now = Instant::now();
        self.shared
            .state
            .read()
            .entry(key)
            .map(|entry| entry.ttl_remaining_at(now))
    }

    // == Length ==
    /// Returns the current number of entries, including expired entries not
    /// yet reaped.
    pub fn len(&self) -> usize {
        self.shared.state.read().order.len()
    }

    // == Is Empty ==
    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.shared.state.read().capacity
    }

    /// Returns the TTL applied by [`TtlLruCache::add`].
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl<K, V> Drop for TtlLruCache<K, V> {
    fn drop(&mut self) {
        self.reaper.abort();
    }
}

fn validate_capacity(capacity: usize) -> Result<()> {
    if capacity == 0 {
        return Err(CacheError::InvalidConfiguration(
            "capacity must be a positive integer".to_string(),
        ));
    }
    Ok(())
}
