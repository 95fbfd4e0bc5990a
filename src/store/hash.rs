use bytes::Bytes;
use std::collections::HashMap;
use std::sync::RwLock;

/// The hash value kind: `{ fields: mapping<bytes -> bytes> }`; no TTL in the
/// core. Empty fields removes the key (I2).
#[derive(Default)]
pub struct Hash {
    items: RwLock<HashMap<Bytes, HashMap<Bytes, Bytes>>>,
}

impl Hash {
    pub fn new() -> Self {
        Hash::default()
    }

    /// Set `field_value_pairs` on `key`, creating it if absent. Returns the
    /// number of fields that did not already exist (P5): updates to
    /// existing fields count zero.
    pub fn hset(&self, key: Bytes, field_value_pairs: impl IntoIterator<Item = (Bytes, Bytes)>) -> usize {
        let mut items = self.items.write().expect("lock poisoned");
        let fields = items.entry(key).or_default();
        let mut created = 0;
        for (field, value) in field_value_pairs {
            if fields.insert(field, value).is_none() {
                created += 1;
            }
        }
        created
    }

    pub fn hget(&self, key: &[u8], field: &[u8]) -> Option<Bytes> {
        self.items
            .read()
            .expect("lock poisoned")
            .get(key)
            .and_then(|fields| fields.get(field).cloned())
    }

    /// Remove `fields` from `key`. Returns the count actually removed;
    /// collapses and removes the key if it becomes empty (I2).
    pub fn hdel<'a>(&self, key: &[u8], fields: impl IntoIterator<Item = &'a [u8]>) -> usize {
        let mut items = self.items.write().expect("lock poisoned");
        let Some(entry) = items.get_mut(key) else {
            return 0;
        };
        let removed = fields.into_iter().filter(|field| entry.remove(*field).is_some()).count();
        if entry.is_empty() {
            items.remove(key);
        }
        removed
    }

    pub fn hgetall(&self, key: &[u8]) -> Vec<(Bytes, Bytes)> {
        self.items
            .read()
            .expect("lock poisoned")
            .get(key)
            .map(|fields| fields.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    pub fn hexists(&self, key: &[u8], field: &[u8]) -> bool {
        self.items
            .read()
            .expect("lock poisoned")
            .get(key)
            .is_some_and(|fields| fields.contains_key(field))
    }

    pub fn hlen(&self, key: &[u8]) -> usize {
        self.items.read().expect("lock poisoned").get(key).map_or(0, HashMap::len)
    }

    pub fn dump(&self) -> Vec<(Bytes, HashMap<Bytes, Bytes>)> {
        self.items
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|(key, fields)| (key.clone(), fields.clone()))
            .collect()
    }

    pub fn keys(&self) -> Vec<Bytes> {
        self.items.read().expect("lock poisoned").keys().cloned().collect()
    }

    pub fn remove_key(&self, key: &[u8]) -> bool {
        self.items.write().expect("lock poisoned").remove(key).is_some()
    }

    /// Restore `key` with `fields`, overwriting anything present. Used only
    /// by RDB load.
    pub fn restore(&self, key: Bytes, fields: HashMap<Bytes, Bytes>) {
        self.items.write().expect("lock poisoned").insert(key, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_owned())
    }

    #[test]
    fn hset_counts_new_fields_only() {
        let hash = Hash::new();
        let created = hash.hset(b("u"), [(b("name"), b("Ada")), (b("age"), b("36"))]);
        assert_eq!(created, 2);
        let updated = hash.hset(b("u"), [(b("name"), b("Grace"))]);
        assert_eq!(updated, 0);
        assert_eq!(hash.hget(b"u", b"name"), Some(b("Grace")));
    }

    #[test]
    fn hdel_collapses_empty_hash() {
        let hash = Hash::new();
        hash.hset(b("u"), [(b("a"), b("1"))]);
        assert_eq!(hash.hdel(b"u", [&b"a"[..]]), 1);
        assert_eq!(hash.hlen(b"u"), 0);
        assert_eq!(hash.hgetall(b"u"), Vec::new());
    }
}
