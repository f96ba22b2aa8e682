//! TTL Reaper Task
//!
//! Background task that removes cache entries when their TTL elapses.

use std::hash::Hash;
use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep_until;
use tracing::{debug, info, trace};

use crate::cache::Shared;

/// Spawns the task that reaps expired entries of one cache.
///
/// The task sleeps until the earliest scheduled deadline, or until the cache
/// signals that an earlier deadline was scheduled. It then takes the cache's
/// write lock and removes every entry whose timer is due.
///
/// The task only holds a weak reference to the cache, and exits once the
/// cache is gone. The cache also aborts it on drop.
///
/// # Arguments
/// * `handle` - Runtime to spawn onto
/// * `shared` - The cache's shared state
///
/// # Returns
/// A JoinHandle for the spawned task, used to abort it when the cache drops.
pub(crate) fn spawn_reaper<K, V>(handle: &Handle, shared: &Arc<Shared<K, V>>) -> JoinHandle<()>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let cache: Weak<Shared<K, V>> = Arc::downgrade(shared);
    let wakeup = shared.wakeup.clone();

    handle.spawn(async move {
        info!("Starting TTL reaper task");

        loop {
            let next_deadline = {
                let Some(shared) = cache.upgrade() else {
                    break;
                };
                let (removed, next) = shared.reap_expired();

                if removed > 0 {
                    debug!("TTL reaper: removed {} expired entries", removed);
                } else {
                    trace!("TTL reaper: no expired entries found");
                }
                next
            };

            match next_deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = sleep_until(deadline) => {}
                        _ = wakeup.notified() => {}
                    }
                }
                None => wakeup.notified().await,
            }
        }

        debug!("TTL reaper task stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::sleep;

    use crate::TtlLruCache;

    fn counting_cache(
        capacity: usize,
        ttl: Duration,
    ) -> (TtlLruCache<&'static str, &'static str>, Arc<AtomicUsize>) {
        let evictions = Arc::new(AtomicUsize::new(0));
        let counter = evictions.clone();
        let cache = TtlLruCache::<&'static str, &'static str>::with_evict(
            capacity,
            ttl,
            move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();
        (cache, evictions)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_removes_untouched_entries() {
        let (cache, evictions) = counting_cache(100, Duration::from_millis(100));

        cache.add("expire_soon", "value");

        // Wait for the entry to expire without ever reading it
        sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.len(), 0, "Expired entry should have been reaped");
        assert_eq!(evictions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_preserves_valid_entries() {
        let (cache, evictions) = counting_cache(100, Duration::from_secs(3600));

        cache.add("long_lived", "value");
        sleep(Duration::from_millis(1500)).await;

        assert_eq!(cache.peek(&"long_lived"), Some("value"));
        assert_eq!(evictions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_wakes_for_earlier_deadline() {
        let (cache, _) = counting_cache(100, Duration::from_secs(3600));

        cache.add("late", "value");
        // Let the reaper go to sleep on the one-hour deadline
        sleep(Duration::from_millis(10)).await;

        cache.add_with_ttl("early", "value", Duration::from_millis(50));
        sleep(Duration::from_millis(100)).await;

        assert!(!cache.contains(&"early"));
        assert!(cache.contains(&"late"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_reaps_in_deadline_order() {
        let (cache, _) = counting_cache(100, Duration::from_millis(100));

        cache.add("a", "1");
        sleep(Duration::from_millis(30)).await;
        cache.add("b", "2");
        sleep(Duration::from_millis(30)).await;
        cache.add("c", "3");

        // t = 110ms: only "a" is due
        sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.keys(), vec!["b", "c"]);

        // t = 140ms: "b" is due too
        sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.keys(), vec!["c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_ignores_removed_then_readded_key() {
        let (cache, evictions) = counting_cache(100, Duration::from_millis(100));

        cache.add("key", "first");
        sleep(Duration::from_millis(50)).await;

        assert!(cache.remove(&"key"));
        cache.add("key", "second");

        // The first fire is due at 100ms and must not touch the new entry
        sleep(Duration::from_millis(70)).await;
        assert_eq!(cache.peek(&"key"), Some("second"));
        assert_eq!(evictions.load(Ordering::SeqCst), 1);

        // The second fire is due at 150ms
        sleep(Duration::from_millis(50)).await;
        assert!(!cache.contains(&"key"));
        assert_eq!(evictions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reaper_stops_when_cache_dropped() {
        let (cache, _) = counting_cache(10, Duration::from_millis(10));
        cache.add("key", "value");

        let shared = Arc::downgrade(&cache.shared);
        drop(cache);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(shared.upgrade().is_none(), "Reaper must not keep the cache alive");
    }
}
