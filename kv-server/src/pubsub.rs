//! # Pub/sub interface
//!
//! Specified only at the interface level (wire-level fan-out semantics are
//! out of scope): channels are named byte strings, a publish reaches every
//! currently-subscribed connection, and ACL channel patterns (§4.5) gate
//! both subscribe and publish.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// One message delivered to a subscriber: the channel it was published on
/// and the raw payload.
#[derive(Debug, Clone)]
pub struct PubSubMessage {
    pub channel: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Registry of live channels. A channel exists only while it has at least
/// one subscriber; publishing to a channel with none is a no-op.
pub struct PubSub {
    channels: Mutex<HashMap<Vec<u8>, broadcast::Sender<PubSubMessage>>>,
}

impl PubSub {
    pub fn new() -> Self {
        PubSub { channels: Mutex::new(HashMap::new()) }
    }

    /// Subscribes to `channel`, creating it if this is the first listener.
    pub fn subscribe(&self, channel: &[u8]) -> broadcast::Receiver<PubSubMessage> {
        let mut channels = self.channels.lock().expect("pubsub lock poisoned");
        channels
            .entry(channel.to_vec())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publishes to `channel`, returning the number of subscribers reached.
    /// Zero if the channel has no current subscribers.
    pub fn publish(&self, channel: &[u8], payload: Vec<u8>) -> usize {
        let channels = self.channels.lock().expect("pubsub lock poisoned");
        match channels.get(channel) {
            Some(sender) => sender
                .send(PubSubMessage { channel: channel.to_vec(), payload })
                .unwrap_or(0),
            None => 0,
        }
    }
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let pubsub = PubSub::new();
        let mut rx = pubsub.subscribe(b"news");
        let reached = pubsub.publish(b"news", b"hello".to_vec());
        assert_eq!(reached, 1);
        let message = rx.recv().await.unwrap();
        assert_eq!(message.payload, b"hello");
    }

    #[test]
    fn publish_with_no_subscribers_is_a_no_op() {
        let pubsub = PubSub::new();
        assert_eq!(pubsub.publish(b"empty", b"x".to_vec()), 0);
    }
}
