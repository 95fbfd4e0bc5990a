//! The shared reader/writer-locked, TTL-aware map that both [`super::Dict`]
//! and [`super::Set`] are built on (`SPEC_FULL.md` §4.3). Passive expiration
//! happens on every read; active expiration is a background sampling sweep
//! started by [`Expiring::spawn_active_expiration`].

use bytes::Bytes;
use rand::Rng;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::time::epoch_ms;

struct Entry<V> {
    value: V,
    expires_at: Option<u128>,
}

impl<V> Entry<V> {
    fn is_expired_at(&self, now_ms: u128) -> bool {
        matches!(self.expires_at, Some(at) if at <= now_ms)
    }
}

/// Outcome of one `Expire`/`ExpireAt` TTL mutation, so callers can tell
/// "key did not exist" from "key was deleted because the deadline is past".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireOutcome {
    Missing,
    Deleted,
    Set,
}

/// The result of an active-expiration sweep, reported for `SPEC_FULL.md`
/// §4.11's debug-level logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepStats {
    pub checked: usize,
    pub expired: usize,
}

pub struct Expiring<V> {
    items: RwLock<HashMap<Bytes, Entry<V>>>,
}

impl<V> Default for Expiring<V> {
    fn default() -> Self {
        Expiring {
            items: RwLock::new(HashMap::new()),
        }
    }
}

impl<V: Clone> Expiring<V> {
    pub fn new() -> Self {
        Expiring::default()
    }

    /// Remove `key` if it is present but its deadline has passed. Returns
    /// whether the key is now known to be absent (either it was expired and
    /// just removed, or it was never there).
    fn expire_if_stale(&self, key: &[u8], now_ms: u128) -> bool {
        let stale = {
            let items = self.items.read().expect("lock poisoned");
            match items.get(key) {
                Some(entry) => entry.is_expired_at(now_ms),
                None => return true,
            }
        };
        if stale {
            self.items.write().expect("lock poisoned").remove(key);
        }
        stale
    }

    pub fn get(&self, key: &[u8]) -> Option<V> {
        let now_ms = epoch_ms();
        if self.expire_if_stale(key, now_ms) {
            return None;
        }
        self.items
            .read()
            .expect("lock poisoned")
            .get(key)
            .map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Overwrite `key` with `value`, setting an optional TTL in seconds.
    pub fn set(&self, key: Bytes, value: V, ttl_secs: Option<u64>) {
        let expires_at = ttl_secs.map(|secs| epoch_ms() + u128::from(secs) * 1000);
        self.items
            .write()
            .expect("lock poisoned")
            .insert(key, Entry { value, expires_at });
    }

    /// Insert `key` with an explicit absolute expiry deadline (epoch
    /// milliseconds), bypassing the relative-seconds [`Expiring::set`] used
    /// by client commands. Used only when restoring from an RDB snapshot.
    pub fn restore(&self, key: Bytes, value: V, expires_at_ms: Option<u128>) {
        self.items.write().expect("lock poisoned").insert(
            key,
            Entry {
                value,
                expires_at: expires_at_ms,
            },
        );
    }

    /// Make sure `key` exists, inserting `make_default()` with no TTL if it
    /// is currently absent (or stale). Used by mutating set-shaped commands
    /// (`SADD`) that create the container on first write.
    pub fn ensure<F>(&self, key: &Bytes, make_default: F)
    where
        F: FnOnce() -> V,
    {
        let now_ms = epoch_ms();
        self.expire_if_stale(key, now_ms);
        let mut items = self.items.write().expect("lock poisoned");
        items.entry(key.clone()).or_insert_with(|| Entry {
            value: make_default(),
            expires_at: None,
        });
    }

    /// Replace the value for `key` in place via `f`, without disturbing its
    /// TTL. `key` must already exist (checked by the caller via `contains`
    /// or `get_or_insert_with`).
    pub fn update<F, R>(&self, key: &[u8], f: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        let mut items = self.items.write().expect("lock poisoned");
        items.get_mut(key).map(|entry| f(&mut entry.value))
    }

    /// Remove `key` unconditionally. Returns whether it was present (and
    /// live).
    pub fn remove(&self, key: &[u8]) -> bool {
        let now_ms = epoch_ms();
        if self.expire_if_stale(key, now_ms) {
            return false;
        }
        self.items.write().expect("lock poisoned").remove(key).is_some()
    }

    pub fn delete_many<'a, I: IntoIterator<Item = &'a [u8]>>(&self, keys: I) -> usize {
        keys.into_iter().filter(|key| self.remove(key)).count()
    }

    pub fn expire(&self, key: &[u8], ttl_secs: i64) -> ExpireOutcome {
        let now_ms = epoch_ms();
        self.expire_at_ms(key, now_ms, i128::from(ttl_secs) * 1000 + now_ms as i128)
    }

    pub fn expire_at_ms(&self, key: &[u8], now_ms: u128, deadline_ms: i128) -> ExpireOutcome {
        if self.expire_if_stale(key, now_ms) {
            return ExpireOutcome::Missing;
        }
        if deadline_ms <= now_ms as i128 {
            self.items.write().expect("lock poisoned").remove(key);
            return ExpireOutcome::Deleted;
        }
        let mut items = self.items.write().expect("lock poisoned");
        match items.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(deadline_ms as u128);
                ExpireOutcome::Set
            }
            None => ExpireOutcome::Missing,
        }
    }

    /// Seconds remaining on `key`'s TTL: `-1` for no deadline, `-2` for
    /// absent/expired, otherwise the rounded-up remaining seconds.
    pub fn ttl_secs(&self, key: &[u8]) -> i64 {
        let now_ms = epoch_ms();
        if self.expire_if_stale(key, now_ms) {
            return -2;
        }
        let items = self.items.read().expect("lock poisoned");
        match items.get(key) {
            None => -2,
            Some(Entry { expires_at: None, .. }) => -1,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => {
                let remaining_ms = at.saturating_sub(now_ms);
                i64::try_from(remaining_ms.div_ceil(1000)).unwrap_or(i64::MAX)
            }
        }
    }

    /// A defensive-copy snapshot of every live key/value pair, per I3: never
    /// exposes logically-expired keys.
    pub fn dump(&self) -> Vec<(Bytes, V)> {
        let now_ms = epoch_ms();
        let items = self.items.read().expect("lock poisoned");
        items
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now_ms))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// A defensive-copy snapshot of every live key/value pair alongside its
    /// absolute expiry deadline in epoch milliseconds, for RDB export.
    pub fn dump_with_expiry(&self) -> Vec<(Bytes, V, Option<u128>)> {
        let now_ms = epoch_ms();
        let items = self.items.read().expect("lock poisoned");
        items
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now_ms))
            .map(|(key, entry)| (key.clone(), entry.value.clone(), entry.expires_at))
            .collect()
    }

    /// Live keys only, for `KEYS` pattern matching.
    pub fn keys(&self) -> Vec<Bytes> {
        let now_ms = epoch_ms();
        let items = self.items.read().expect("lock poisoned");
        items
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now_ms))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        let now_ms = epoch_ms();
        let items = self.items.read().expect("lock poisoned");
        items.values().filter(|entry| !entry.is_expired_at(now_ms)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run one sampling pass per `SPEC_FULL.md` §4.3: up to `max_rounds`
    /// rounds, each drawing `min(max_sample_size, |keys|)` indices uniformly
    /// at random *with replacement* and deleting any expired entries found.
    /// A round that expires fewer than a quarter of what it checked (or
    /// checks nothing) ends the sweep early.
    pub fn active_expire(&self, max_sample_size: usize, max_rounds: usize) -> SweepStats {
        let mut stats = SweepStats::default();
        for _ in 0..max_rounds {
            let keys: Vec<Bytes> = {
                let items = self.items.read().expect("lock poisoned");
                items.keys().cloned().collect()
            };
            if keys.is_empty() {
                break;
            }
            let sample_size = max_sample_size.min(keys.len());
            let now_ms = epoch_ms();
            let mut checked = 0usize;
            let mut expired = 0usize;
            let mut rng = rand::thread_rng();
            for _ in 0..sample_size {
                let index = rng.gen_range(0..keys.len());
                let key = &keys[index];
                checked += 1;
                let stale = {
                    let items = self.items.read().expect("lock poisoned");
                    items.get(key).is_some_and(|entry| entry.is_expired_at(now_ms))
                };
                if stale {
                    self.items.write().expect("lock poisoned").remove(key);
                    expired += 1;
                }
            }
            stats.checked += checked;
            stats.expired += expired;
            if checked == 0 || expired * 4 < checked {
                break;
            }
        }
        stats
    }

    /// Spawn a background task that runs [`active_expire`] on `interval`
    /// until `shutdown` fires.
    pub fn spawn_active_expiration(
        self: std::sync::Arc<Self>,
        interval: Duration,
        max_sample_size: usize,
        max_rounds: usize,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
        label: &'static str,
    ) -> tokio::task::JoinHandle<()>
    where
        V: Send + Sync + 'static,
    {
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
    fn passive_expiration_on_get() {
        let map: Expiring<Bytes> = Expiring::new();
        map.set(Bytes::from_static(b"k"), Bytes::from_static(b"v"), Some(0));
        // ttl of 0 seconds still has a deadline equal to "now"; step past it.
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(map.get(b"k"), None);
    }

    #[test]
    fn ttl_contract() {
        let map: Expiring<Bytes> = Expiring::new();
        map.set(Bytes::from_static(b"k"), Bytes::from_static(b"v"), None);
        assert_eq!(map.ttl_secs(b"k"), -1);
        assert_eq!(map.ttl_secs(b"missing"), -2);
        map.expire(b"k", 10);
        assert!(map.ttl_secs(b"k") > 0);
    }

    #[test]
    fn expire_zero_deletes() {
        let map: Expiring<Bytes> = Expiring::new();
        map.set(Bytes::from_static(b"k"), Bytes::from_static(b"v"), None);
        assert_eq!(map.expire(b"k", 0), ExpireOutcome::Deleted);
        assert_eq!(map.get(b"k"), None);
    }

    #[test]
    fn dump_excludes_expired() {
        let map: Expiring<Bytes> = Expiring::new();
        map.set(Bytes::from_static(b"live"), Bytes::from_static(b"v"), None);
        map.set(Bytes::from_static(b"dead"), Bytes::from_static(b"v"), Some(0));
        std::thread::sleep(Duration::from_millis(5));
        let dump = map.dump();
        assert_eq!(dump.len(), 1);
        assert_eq!(dump[0].0, Bytes::from_static(b"live"));
    }

    #[test]
    fn active_expire_removes_stale_entries() {
        let map: Expiring<Bytes> = Expiring::new();
        for i in 0..20 {
            let key = Bytes::from(format!("k{i}"));
            map.set(key, Bytes::from_static(b"v"), Some(0));
        }
        std::thread::sleep(Duration::from_millis(5));
        let stats = map.active_expire(20, 3);
        assert!(stats.expired > 0);
    }
}
