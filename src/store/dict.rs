use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use super::expiring::{ExpireOutcome, Expiring, SweepStats};

/// The string value kind: `{ value: bytes, expired_at?: instant }`
/// (`SPEC_FULL.md` §3).
#[derive(Default)]
pub struct Dict {
    items: Expiring<Bytes>,
}

impl Dict {
    pub fn new() -> Self {
        Dict::default()
    }

    pub fn set(&self, key: Bytes, value: Bytes, ttl_secs: Option<u64>) {
        self.items.set(key, value, ttl_secs);
    }

    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.items.get(key)
    }

    /// Remove every key in `keys` that is present; returns the count
    /// actually removed.
    pub fn delete<'a, I: IntoIterator<Item = &'a [u8]>>(&self, keys: I) -> usize {
        self.items.delete_many(keys)
    }

    pub fn expire(&self, key: &[u8], ttl_secs: i64) -> ExpireOutcome {
        self.items.expire(key, ttl_secs)
    }

    pub fn expire_at_ms(&self, key: &[u8], deadline_ms: i64) -> ExpireOutcome {
        self.items.expire_at_ms(key, crate::time::epoch_ms(), i128::from(deadline_ms))
    }

    pub fn ttl_secs(&self, key: &[u8]) -> i64 {
        self.items.ttl_secs(key)
    }

    pub fn dump(&self) -> Vec<(Bytes, Bytes)> {
        self.items.dump()
    }

    /// Snapshot including each key's absolute expiry deadline, for RDB
    /// export.
    pub fn dump_with_expiry(&self) -> Vec<(Bytes, Bytes, Option<u128>)> {
        self.items.dump_with_expiry()
    }

    /// Restore a single key with an absolute expiry deadline, bypassing the
    /// relative-seconds `set` used by client commands. Used only by RDB
    /// load.
    pub fn restore(&self, key: Bytes, value: Bytes, expires_at_ms: Option<u128>) {
        self.items.restore(key, value, expires_at_ms);
    }

    pub fn keys(&self) -> Vec<Bytes> {
        self.items.keys()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
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
    fn set_then_get() {
        let dict = Dict::new();
        dict.set(Bytes::from_static(b"foo"), Bytes::from_static(b"bar"), None);
        assert_eq!(dict.get(b"foo"), Some(Bytes::from_static(b"bar")));
    }

    #[test]
    fn delete_counts_only_existing_keys() {
        let dict = Dict::new();
        dict.set(Bytes::from_static(b"a"), Bytes::from_static(b"1"), None);
        let removed = dict.delete([&b"a"[..], &b"missing"[..]]);
        assert_eq!(removed, 1);
        assert_eq!(dict.get(b"a"), None);
    }

    #[test]
    fn expire_with_seconds_ttl() {
        let dict = Dict::new();
        dict.set(Bytes::from_static(b"x"), Bytes::from_static(b"1"), Some(2));
        assert!(dict.ttl_secs(b"x") > 0);
    }
}
