use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// A simple, unbounded broadcast channel for low-throughput use cases.
///
/// Each subscriber gets its own channel, so every subscriber receives every
/// message sent through the broadcaster. Not meant for high-throughput paths;
/// session-level events arrive at reconnect cadence.
#[derive(Debug, Clone)]
pub struct UnboundedBroadcast<T> {
    subscribed_senders: Arc<Mutex<Vec<Sender<T>>>>,
}

impl<T> Default for UnboundedBroadcast<T> {
    fn default() -> Self {
        Self {
            subscribed_senders: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> UnboundedBroadcast<T>
where
    T: Clone,
{
    /// Registers a new Receiver to the channel.
    pub fn subscribe(&mut self) -> Receiver<T> {
        let (tx, rx) = unbounded();

        self.subscribed_senders
            .lock()
            .expect("failed to acquire the lock")
            .push(tx);

        rx
    }

    /// Sends 'message' to all registered non-disconnected subscribers.
    /// Disconnected subscribers are dropped from the subscriber list.
    pub fn broadcast(&self, message: T) {
        self.subscribed_senders
            .lock()
            .expect("failed to acquire the lock")
            .retain(|s| s.send(message.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_sub() {
        let mut broadcaster = UnboundedBroadcast::default();

        let subs1 = broadcaster.subscribe();
        let subs2 = broadcaster.subscribe();

        broadcaster.broadcast("message");

        assert_eq!(subs1.recv().unwrap(), "message");
        assert_eq!(subs2.recv().unwrap(), "message");
    }

    #[test]
    fn test_subscriber_drops() {
        let mut broadcaster = UnboundedBroadcast::default();

        let subs1 = broadcaster.subscribe();
        let subs2 = broadcaster.subscribe();
        drop(subs2);

        broadcaster.broadcast("message");

        assert_eq!(subs1.recv().unwrap(), "message");
    }
}
