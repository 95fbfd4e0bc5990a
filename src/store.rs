//! The four typed containers (`SPEC_FULL.md` §4.3) and the shared
//! expiring-map engine they are built on.

mod dict;
mod expiring;
mod hash;
mod list;
mod set;

pub use dict::Dict;
pub use expiring::{ExpireOutcome, SweepStats};
pub use hash::Hash;
pub use list::List;
pub use set::Set;

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ExpirationConfig;

/// The four disjoint typed containers a key may live in simultaneously
/// (`SPEC_FULL.md` §3). A key may exist in more than one container at once;
/// `KEYS` and `DEL` union across all four.
pub struct Containers {
    pub dict: Arc<Dict>,
    pub set: Arc<Set>,
    pub list: Arc<List>,
    pub hash: Arc<Hash>,
}

impl Default for Containers {
    fn default() -> Self {
        Containers {
            dict: Arc::new(Dict::new()),
            set: Arc::new(Set::new()),
            list: Arc::new(List::new()),
            hash: Arc::new(Hash::new()),
        }
    }
}

impl Containers {
    /// Every key present in any container, deduplicated — the union `KEYS`
    /// (and `DEL`) operate over.
    pub fn all_keys(&self) -> Vec<Bytes> {
        let mut keys: Vec<Bytes> = Vec::new();
        keys.extend(self.dict.keys());
        keys.extend(self.set.keys());
        keys.extend(self.list.keys());
        keys.extend(self.hash.keys());
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    /// Union-delete `key` from whichever containers currently hold it
    /// (resolves the distilled spec's open question on `DEL` scope, per
    /// `SPEC_FULL.md` §4.7). Returns whether any container held it.
    pub fn delete_key(&self, key: &[u8]) -> bool {
        let in_dict = self.dict.delete([key]) > 0;
        let in_set = self.set.remove_key(key);
        let in_list = self.list.remove_key(key);
        let in_hash = self.hash.remove_key(key);
        in_dict || in_set || in_list || in_hash
    }

    /// Spawn the active-expiration tickers for `Dict` and `Set` (the two
    /// kinds that carry a TTL). Returns their join handles so shutdown can
    /// await them.
    pub fn spawn_expiration_tickers(
        &self,
        config: &ExpirationConfig,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let interval = Duration::from_secs(config.check_interval_secs);
        vec![
            Arc::clone(&self.dict).spawn_active_expiration(
                interval,
                config.max_sample_size,
                config.max_sample_rounds,
                shutdown.clone(),
                "dict",
            ),
            Arc::clone(&self.set).spawn_active_expiration(
                interval,
                config.max_sample_size,
                config.max_sample_rounds,
                shutdown,
                "set",
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_keys_unions_every_kind() {
        let containers = Containers::default();
        containers.dict.set(Bytes::from_static(b"a"), Bytes::from_static(b"1"), None);
        containers.set.sadd(&Bytes::from_static(b"b"), [Bytes::from_static(b"x")]);
        containers.list.push(Bytes::from_static(b"c"), [Bytes::from_static(b"x")], false);
        containers.hash.hset(Bytes::from_static(b"d"), [(Bytes::from_static(b"f"), Bytes::from_static(b"v"))]);
        let mut keys = containers.all_keys();
        keys.sort();
        assert_eq!(keys, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b"), Bytes::from_static(b"c"), Bytes::from_static(b"d")]);
    }

    #[test]
    fn delete_key_is_union_across_kinds() {
        let containers = Containers::default();
        containers.dict.set(Bytes::from_static(b"k"), Bytes::from_static(b"1"), None);
        containers.set.sadd(&Bytes::from_static(b"k"), [Bytes::from_static(b"x")]);
        assert!(containers.delete_key(b"k"));
        assert_eq!(containers.dict.get(b"k"), None);
        assert_eq!(containers.set.smembers(b"k"), None);
    }
}
