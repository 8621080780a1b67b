//! A concurrent map whose entries expire.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Size at which inserts start sweeping expired entries.
const SWEEP_THRESHOLD: usize = 1024;

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// `DashMap` with per-entry expiry. Expired entries are invisible to reads
/// and dropped lazily, or in bulk by [`cleanup_expired`](Self::cleanup_expired).
///
/// Entries that are never read again are swept by inserts: whenever the map
/// grows past twice its size after the previous sweep (and at least
/// [`SWEEP_THRESHOLD`]), the insert drops every expired entry first.
pub(crate) struct ExpiringMap<V> {
    entries: DashMap<String, Entry<V>>,
    next_sweep: AtomicUsize,
}

impl<V: Clone> ExpiringMap<V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_sweep: AtomicUsize::new(SWEEP_THRESHOLD),
        }
    }

    /// Inserts `value`, replacing any previous entry. `None` never expires,
    /// and neither does a ttl too large to represent.
    pub(crate) fn insert(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        if self.entries.len() >= self.next_sweep.load(Ordering::Relaxed) {
            self.cleanup_expired();
        }
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries.insert(key.into(), Entry { value, expires_at });
    }

    pub(crate) fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Some(entry.value.clone());
            }
            drop(entry);
            self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        }
        None
    }

    /// Applies `f` to a live entry while holding its shard lock, so the read
    /// and the write cannot interleave with another caller's.
    pub(crate) fn update<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let now = Instant::now();
        let mut entry = self.entries.get_mut(key)?;
        entry.is_live(now).then(|| f(&mut entry.value))
    }

    pub(crate) fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Drops every expired entry and returns how many were removed.
    pub(crate) fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let after = self.entries.len();
        self.next_sweep.store(
            after.saturating_mul(2).max(SWEEP_THRESHOLD),
            Ordering::Relaxed,
        );
        before.saturating_sub(after)
    }

    /// Number of entries, expired ones included until they are cleaned up.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_entries_are_invisible() {
        let map = ExpiringMap::new();
        map.insert("live", 1, Some(Duration::from_secs(60)));
        map.insert("forever", 2, None);
        map.insert("dead", 3, Some(Duration::ZERO));

        assert_eq!(map.get("live"), Some(1));
        assert_eq!(map.get("forever"), Some(2));
        assert_eq!(map.get("dead"), None);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_cleanup() {
        let map = ExpiringMap::new();
        map.insert("a", (), Some(Duration::ZERO));
        map.insert("b", (), Some(Duration::ZERO));
        map.insert("c", (), None);

        assert_eq!(map.cleanup_expired(), 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.remove("c"), Some(()));
        assert_eq!(map.remove("c"), None);
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let map = ExpiringMap::new();
        map.insert("k", 1, Some(Duration::MAX));
        assert_eq!(map.get("k"), Some(1));
    }

    #[test]
    fn test_inserts_sweep_unread_entries() {
        let map = ExpiringMap::new();
        for i in 0..SWEEP_THRESHOLD {
            map.insert(format!("abandoned-{i}"), i, Some(Duration::ZERO));
        }
        assert_eq!(map.len(), SWEEP_THRESHOLD);

        map.insert("fresh", 0, None);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("fresh"), Some(0));
    }

    #[test]
    fn test_sweep_keeps_live_entries() {
        let map = ExpiringMap::new();
        for i in 0..SWEEP_THRESHOLD {
            map.insert(format!("live-{i}"), i, None);
        }

        map.insert("one-more", 0, None);
        assert_eq!(map.len(), SWEEP_THRESHOLD + 1);
        assert_eq!(map.get("live-0"), Some(0));
    }

    #[test]
    fn test_update_skips_expired() {
        let map = ExpiringMap::new();
        map.insert("live", 1, None);
        map.insert("dead", 1, Some(Duration::ZERO));

        assert_eq!(map.update("live", |v| std::mem::replace(v, 2)), Some(1));
        assert_eq!(map.get("live"), Some(2));
        assert_eq!(map.update("dead", |v| *v), None);
        assert_eq!(map.update("missing", |v| *v), None);
    }
}
