//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use tokio::time::Instant;

use crate::cache::timer::ExpiryTimer;

// == Cache Entry ==
/// Represents a single cache entry with its key, value and expiry timer.
#[derive(Debug)]
pub struct CacheEntry<K, V> {
    /// The key, duplicated from the index so evictions from the list tail
    /// can find their index slot
    pub key: K,
    /// The stored value
    pub value: V,
    /// The armed expiration timer; its deadline is the entry's expiry
    pub timer: ExpiryTimer,
}

impl<K, V> CacheEntry<K, V> {
    // == Constructor ==
    /// Creates a new cache entry armed with the given timer.
    pub fn new(key: K, value: V, timer: ExpiryTimer) -> Self {
        Self { key, value, timer }
    }

    /// Absolute time after which the entry is stale.
    pub fn expires_at(&self) -> Instant {
        self.timer.deadline()
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is stale only once `now` is strictly
    /// past its deadline; at the deadline itself it is still live.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at()
    }

    // == Time To Live ==
    /// Returns the remaining TTL, `Duration::ZERO` once expired.
    pub fn ttl_remaining_at(&self, now: Instant) -> Duration {
        self.expires_at().saturating_duration_since(now)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn entry_expiring_in(ttl: Duration) -> (CacheEntry<&'static str, &'static str>, Instant) {
        let now = Instant::now();
        let entry = CacheEntry::new("key", "value", ExpiryTimer::new(now + ttl, 1));
        (entry, now)
    }

    #[test]
    fn test_entry_not_expired_before_deadline() {
        let (entry, now) = entry_expiring_in(Duration::from_secs(60));

        assert_eq!(entry.value, "value");
        assert!(!entry.is_expired_at(now));
        assert!(!entry.is_expired_at(now + Duration::from_secs(59)));
    }

    #[test]
    fn test_entry_expired_after_deadline() {
        let (entry, now) = entry_expiring_in(Duration::from_millis(50));

        assert!(entry.is_expired_at(now + Duration::from_millis(51)));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let (entry, now) = entry_expiring_in(Duration::from_millis(50));
        let deadline = now + Duration::from_millis(50);

        assert!(
            !entry.is_expired_at(deadline),
            "Entry should still be live exactly at its deadline"
        );
        assert!(entry.is_expired_at(deadline + Duration::from_nanos(1)));
    }

    #[test]
    fn test_zero_ttl_expires_just_after_creation() {
        let (entry, now) = entry_expiring_in(Duration::ZERO);

        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + Duration::from_nanos(1)));
    }

    #[test]
    fn test_ttl_remaining() {
        let (entry, now) = entry_expiring_in(Duration::from_secs(10));

        assert_eq!(entry.ttl_remaining_at(now), Duration::from_secs(10));
        assert_eq!(
            entry.ttl_remaining_at(now + Duration::from_secs(4)),
            Duration::from_secs(6)
        );
    }

    #[test]
    fn test_ttl_remaining_expired() {
        let (entry, now) = entry_expiring_in(Duration::from_secs(1));

        // TTL remaining should be 0 when expired
        assert_eq!(
            entry.ttl_remaining_at(now + Duration::from_secs(5)),
            Duration::ZERO
        );
    }
}
