//! Channel-based publish/subscribe fan-out (`SPEC_FULL.md` §4.4).
//!
//! Each subscribed connection owns a bounded channel; `PUBLISH` is a
//! best-effort fan-out that never blocks a publisher on a slow subscriber —
//! a full channel simply drops the message for that one subscriber.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::mpsc;

use crate::resp::Value;

/// Messages are buffered per-subscriber up to this many frames before new
/// publishes are dropped for that subscriber (`SPEC_FULL.md` §4.4).
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 100;

/// Identifies one subscribed connection, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

impl SubscriberId {
    fn next() -> SubscriberId {
        SubscriberId(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The receiving half handed to a connection task; it polls this for
/// messages to forward to its client as RESP arrays.
pub type SubscriberReceiver = mpsc::Receiver<Value>;

struct Subscriber {
    id: SubscriberId,
    sender: mpsc::Sender<Value>,
}

/// The channel registry. One instance is shared across all connections.
#[derive(Default)]
pub struct Pubsub {
    channels: RwLock<HashMap<Bytes, Vec<Subscriber>>>,
}

impl Pubsub {
    pub fn new() -> Self {
        Pubsub::default()
    }

    /// Register a new subscriber to `channel`, returning its id and receiver.
    pub fn subscribe(&self, channel: Bytes) -> (SubscriberId, SubscriberReceiver) {
        let id = SubscriberId::next();
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.channels
            .write()
            .expect("lock poisoned")
            .entry(channel)
            .or_default()
            .push(Subscriber { id, sender });
        (id, receiver)
    }

    /// Add an already-registered subscriber to another channel, reusing its
    /// sender (a connection may subscribe to many channels over one
    /// receiver).
    pub fn subscribe_additional(&self, channel: Bytes, id: SubscriberId, sender: &mpsc::Sender<Value>) {
        self.channels
            .write()
            .expect("lock poisoned")
            .entry(channel)
            .or_default()
            .push(Subscriber {
                id,
                sender: sender.clone(),
            });
    }

    /// Remove `id` from `channel`. Returns whether it was subscribed.
    pub fn unsubscribe(&self, channel: &[u8], id: SubscriberId) -> bool {
        let mut channels = self.channels.write().expect("lock poisoned");
        let Some(subscribers) = channels.get_mut(channel) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        let removed = subscribers.len() != before;
        if subscribers.is_empty() {
            channels.remove(channel);
        }
        removed
    }

    /// Remove `id` from every channel it is subscribed to (connection close
    /// or `RESET`). Returns the channels it was removed from.
    pub fn unsubscribe_all(&self, id: SubscriberId) -> Vec<Bytes> {
        let mut channels = self.channels.write().expect("lock poisoned");
        let mut removed = Vec::new();
        channels.retain(|channel, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|subscriber| subscriber.id != id);
            if subscribers.len() != before {
                removed.push(channel.clone());
            }
            !subscribers.is_empty()
        });
        removed
    }

    /// Publish `message` to `channel`. Returns the number of subscribers the
    /// message was delivered to; a subscriber whose channel is full or
    /// whose connection has dropped does not count.
    pub fn publish(&self, channel: &[u8], message: &Bytes) -> usize {
        let channels = self.channels.read().expect("lock poisoned");
        let Some(subscribers) = channels.get(channel) else {
            return 0;
        };
        let frame = Value::array(vec![
            Value::bulk(Bytes::from_static(b"message")),
            Value::bulk(Bytes::copy_from_slice(channel)),
            Value::bulk(message.clone()),
        ]);
        subscribers
            .iter()
            .filter(|subscriber| subscriber.sender.try_send(frame.clone()).is_ok())
            .count()
    }

    /// The number of distinct subscribers to `channel`.
    pub fn numsub(&self, channel: &[u8]) -> usize {
        self.channels
            .read()
            .expect("lock poisoned")
            .get(channel)
            .map_or(0, Vec::len)
    }

    /// Channels with at least one subscriber, matching `pattern` if given.
    pub fn active_channels(&self, pattern: Option<&[u8]>) -> Vec<Bytes> {
        self.channels
            .read()
            .expect("lock poisoned")
            .keys()
            .filter(|channel| pattern.is_none_or(|pattern| crate::glob::matches(channel, pattern)))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_delivers_to_all_subscribers_of_a_channel() {
        let pubsub = Pubsub::new();
        let (_id_a, mut rx_a) = pubsub.subscribe(Bytes::from_static(b"news"));
        let (_id_b, mut rx_b) = pubsub.subscribe(Bytes::from_static(b"news"));
        let delivered = pubsub.publish(b"news", &Bytes::from_static(b"hello"));
        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn unsubscribe_stops_delivery_and_empties_channel_entry() {
        let pubsub = Pubsub::new();
        let (id, _rx) = pubsub.subscribe(Bytes::from_static(b"news"));
        assert!(pubsub.unsubscribe(b"news", id));
        assert_eq!(pubsub.numsub(b"news"), 0);
        assert_eq!(pubsub.publish(b"news", &Bytes::from_static(b"x")), 0);
    }

    #[test]
    fn unsubscribe_all_clears_every_channel_membership() {
        let pubsub = Pubsub::new();
        let (id, _rx) = pubsub.subscribe(Bytes::from_static(b"a"));
        pubsub.subscribe_additional(Bytes::from_static(b"b"), id, &mpsc::channel(1).0);
        let removed = pubsub.unsubscribe_all(id);
        assert!(removed.contains(&Bytes::from_static(b"a")));
        assert_eq!(pubsub.numsub(b"a"), 0);
    }

    #[test]
    fn active_channels_filters_by_pattern() {
        let pubsub = Pubsub::new();
        pubsub.subscribe(Bytes::from_static(b"news.tech"));
        pubsub.subscribe(Bytes::from_static(b"weather"));
        let mut matched = pubsub.active_channels(Some(b"news.*"));
        matched.sort();
        assert_eq!(matched, vec![Bytes::from_static(b"news.tech")]);
    }
}
