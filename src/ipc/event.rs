//! Server-push notifications.
//!
//! Every daemon-initiated event flows through one broadcast channel:
//! `inline.suggestion`, `inline.status`, `chat.messageCreated`,
//! `review.opened`, `review.closed`, `daemon.ready`. Each connection task
//! holds a receiver and forwards frames to its WebSocket sink. Clients that
//! connect later simply miss earlier events; a slow client that lags past
//! the channel capacity drops the oldest frames, never blocks the daemon.

use serde_json::Value;
use tokio::sync::broadcast;

/// Frames buffered per receiver before lagging kicks in.
const CHANNEL_CAPACITY: usize = 1024;

/// Fan-out of JSON-RPC notification frames to all connected clients.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Send a JSON-RPC notification (a request with no id) to every
    /// connected client. With no subscribers the frame is dropped, which
    /// is fine — events describe state, they don't carry it.
    pub fn broadcast(&self, method: &str, params: Value) {
        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        })
        .to_string();
        let _ = self.tx.send(frame);
    }

    /// Subscribe to all events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Number of live subscriptions (reported by `daemon.status`).
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_every_subscriber() {
        let events = EventBroadcaster::new();
        let mut a = events.subscribe();
        let mut b = events.subscribe();
        assert_eq!(events.subscriber_count(), 2);

        events.broadcast("inline.status", serde_json::json!({ "state": "idle" }));

        for rx in [&mut a, &mut b] {
            let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
            assert_eq!(frame["jsonrpc"], "2.0");
            assert_eq!(frame["method"], "inline.status");
            assert_eq!(frame["params"]["state"], "idle");
            assert!(frame.get("id").is_none());
        }
    }

    #[test]
    fn broadcast_without_subscribers_is_a_noop() {
        let events = EventBroadcaster::new();
        events.broadcast("daemon.ready", serde_json::json!({}));
        assert_eq!(events.subscriber_count(), 0);
    }
}
