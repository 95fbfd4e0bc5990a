use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::expiring::{ExpireOutcome, Expiring, SweepStats};

/// The set value kind: `{ members: set<bytes>, expired_at?: instant }`;
/// empty membership removes the key (I2).
#[derive(Default)]
pub struct Set {
    items: Expiring<HashSet<Bytes>>,
}

impl Set {
    pub fn new() -> Self {
        Set::default()
    }

    /// Add `members` to the set at `key` (creating it if absent). Returns
    /// the number of members that were not already present.
    pub fn sadd(&self, key: &Bytes, members: impl IntoIterator<Item = Bytes>) -> usize {
        self.items.ensure(key, HashSet::new);
        self.items
            .update(key, |set| members.into_iter().filter(|m| set.insert(m.clone())).count())
            .unwrap_or(0)
    }

    /// Remove `members` from the set at `key`. Returns the number actually
    /// removed; collapses and removes the key if it becomes empty (I2).
    pub fn srem<'a>(&self, key: &[u8], members: impl IntoIterator<Item = &'a [u8]>) -> usize {
        let (removed, now_empty) = self
            .items
            .update(key, |set| {
                let removed = members.into_iter().filter(|m| set.remove(*m)).count();
                (removed, set.is_empty())
            })
            .unwrap_or((0, false));
        if now_empty {
            self.items.remove(key);
        }
        removed
    }

    pub fn smembers(&self, key: &[u8]) -> Option<Vec<Bytes>> {
        self.items.get(key).map(|set| set.into_iter().collect())
    }

    pub fn sismember(&self, key: &[u8], member: &[u8]) -> bool {
        self.items.get(key).is_some_and(|set| set.contains(member))
    }

    pub fn scard(&self, key: &[u8]) -> usize {
        self.items.get(key).map_or(0, |set| set.len())
    }

    pub fn expire(&self, key: &[u8], ttl_secs: i64) -> ExpireOutcome {
        self.items.expire(key, ttl_secs)
    }

    pub fn ttl_secs(&self, key: &[u8]) -> i64 {
        self.items.ttl_secs(key)
    }

    pub fn dump(&self) -> Vec<(Bytes, HashSet<Bytes>)> {
        self.items.dump()
    }

    /// Snapshot including each key's absolute expiry deadline, for RDB
    /// export.
    pub fn dump_with_expiry(&self) -> Vec<(Bytes, HashSet<Bytes>, Option<u128>)> {
        self.items.dump_with_expiry()
    }

    /// Restore a single key with an absolute expiry deadline. Used only by
    /// RDB load.
    pub fn restore(&self, key: Bytes, members: HashSet<Bytes>, expires_at_ms: Option<u128>) {
        self.items.restore(key, members, expires_at_ms);
    }

    pub fn keys(&self) -> Vec<Bytes> {
        self.items.keys()
    }

    pub fn remove_key(&self, key: &[u8]) -> bool {
        self.items.remove(key)
    }

    pub fn active_expire(&self, max_sample_size: usize, max_rounds: usize) -> SweepStats {
        self.items.active_expire(max_sample_size, max_rounds)
    }

    /// Spawn a background task that runs [`active_expire`](Self::active_expire)
    /// on `interval` until `shutdown` fires.
    pub fn spawn_active_expiration(
        self: Arc<Self>,
        interval: Duration,
        max_sample_size: usize,
        max_rounds: usize,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
        label: &'static str,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = self.active_expire(max_sample_size, max_rounds);
                        if stats.checked > 0 {
                            tracing::debug!(label, checked = stats.checked, expired = stats.expired, "active expiration sweep");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sadd_reports_new_members_only() {
        let set = Set::new();
        let key = Bytes::from_static(b"s");
        assert_eq!(set.sadd(&key, [Bytes::from_static(b"x"), Bytes::from_static(b"y")]), 2);
        assert_eq!(set.sadd(&key, [Bytes::from_static(b"x")]), 0);
        assert_eq!(set.scard(&key), 2);
    }

    #[test]
    fn srem_collapses_empty_set() {
        let set = Set::new();
        let key = Bytes::from_static(b"s");
        set.sadd(&key, [Bytes::from_static(b"x")]);
        assert_eq!(set.srem(&key, [&b"x"[..]]), 1);
        assert_eq!(set.smembers(&key), None);
    }

    #[test]
    fn sismember() {
        let set = Set::new();
        let key = Bytes::from_static(b"s");
        set.sadd(&key, [Bytes::from_static(b"x")]);
        assert!(set.sismember(&key, b"x"));
        assert!(!set.sismember(&key, b"y"));
    }
}
