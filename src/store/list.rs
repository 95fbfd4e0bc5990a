use bytes::Bytes;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::deque::Deque;

/// The list value kind: a [`Deque`] of string items; no TTL in the core
/// command set. Empty deque removes the key (I2).
#[derive(Default)]
pub struct List {
    items: RwLock<HashMap<Bytes, Deque<Bytes>>>,
}

impl List {
    pub fn new() -> Self {
        List::default()
    }

    /// Push `values` onto the front (in argument order, so the last pushed
    /// value ends up closest to the head) or back of `key`'s list, creating
    /// it if absent. Returns the new length.
    pub fn push(&self, key: Bytes, values: impl IntoIterator<Item = Bytes>, front: bool) -> usize {
        let mut items = self.items.write().expect("lock poisoned");
        let deque = items.entry(key).or_default();
        for value in values {
            if front {
                deque.push_front(value);
            } else {
                deque.push_back(value);
            }
        }
        deque.len()
    }

    /// Pop up to `count` values from the front or back of `key`'s list, in
    /// pop order. Removes the key if the list becomes empty (I2).
    pub fn pop(&self, key: &[u8], count: usize, front: bool) -> Vec<Bytes> {
        let mut items = self.items.write().expect("lock poisoned");
        let Some(deque) = items.get_mut(key) else {
            return Vec::new();
        };
        let mut popped = Vec::with_capacity(count.min(deque.len()));
        for _ in 0..count {
            let value = if front { deque.pop_front() } else { deque.pop_back() };
            match value {
                Some(value) => popped.push(value),
                None => break,
            }
        }
        if deque.is_empty() {
            items.remove(key);
        }
        popped
    }

    pub fn len(&self, key: &[u8]) -> usize {
        self.items
            .read()
            .expect("lock poisoned")
            .get(key)
            .map_or(0, Deque::len)
    }

    /// `start`/`stop` are raw client indices, folded for negative values by
    /// adding the list length and clamped to `[0, length-1]`; `start > stop`
    /// after normalization returns an empty (not absent) result.
    pub fn range(&self, key: &[u8], start: i64, stop: i64) -> Vec<Bytes> {
        let items = self.items.read().expect("lock poisoned");
        let Some(deque) = items.get(key) else {
            return Vec::new();
        };
        let len = deque.len();
        if len == 0 {
            return Vec::new();
        }
        let normalize = |index: i64| -> i64 { if index < 0 { index + len as i64 } else { index } };
        let start = normalize(start).clamp(0, len as i64 - 1);
        let stop = normalize(stop).clamp(0, len as i64 - 1);
        if start > stop {
            return Vec::new();
        }
        (start..=stop)
            .filter_map(|i| deque.get(usize::try_from(i).expect("clamped non-negative")).cloned())
            .collect()
    }

    /// Sort `key`'s list in place. `alpha` compares raw bytes; otherwise
    /// every element must parse as `f64` or the comparator falls back to
    /// byte comparison for the whole sort (`SPEC_FULL.md` §4.3).
    pub fn sort(&self, key: &[u8], ascending: bool, alpha: bool) {
        let mut items = self.items.write().expect("lock poisoned");
        let Some(deque) = items.get_mut(key) else {
            return;
        };
        let numeric = !alpha && deque.iter().all(|value| parse_f64(value).is_some());
        deque.sort_by(|a, b| {
            let ordering = if numeric {
                parse_f64(a)
                    .unwrap()
                    .partial_cmp(&parse_f64(b).unwrap())
                    .unwrap_or(std::cmp::Ordering::Equal)
            } else {
                a.cmp(b)
            };
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
    }

    pub fn dump(&self) -> Vec<(Bytes, Vec<Bytes>)> {
        self.items
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|(key, deque)| (key.clone(), deque.iter().cloned().collect()))
            .collect()
    }

    pub fn keys(&self) -> Vec<Bytes> {
        self.items.read().expect("lock poisoned").keys().cloned().collect()
    }

    pub fn remove_key(&self, key: &[u8]) -> bool {
        self.items.write().expect("lock poisoned").remove(key).is_some()
    }

    /// Restore `key` with `values` in order, overwriting anything present.
    /// Used only by RDB load.
    pub fn restore(&self, key: Bytes, values: Vec<Bytes>) {
        self.items.write().expect("lock poisoned").insert(key, values.into_iter().collect());
    }
}

fn parse_f64(bytes: &[u8]) -> Option<f64> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}
