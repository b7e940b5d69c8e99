//! Live-view observation of published port messages
//!
//! A node can be given a secondary sink that mirrors everything it publishes,
//! e.g. for a UI watching values flow through the graph. Mirroring only
//! happens while the sink reports listeners.

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::bus::SharedMessage;

/// Trait for mirroring published messages
pub trait ObservationSink: Send + Sync {
    /// Whether anyone is currently watching
    fn has_listeners(&self) -> bool;

    /// Send a message
    ///
    /// Returns an error if the message could not be sent (e.g., channel closed)
    fn send(&self, message: SharedMessage) -> Result<(), EventError>;
}

/// Error when mirroring a message fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Sink backed by a tokio broadcast channel
pub struct BroadcastSink {
    sender: broadcast::Sender<SharedMessage>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Start watching; lagging receivers lose the oldest messages
    pub fn subscribe(&self) -> broadcast::Receiver<SharedMessage> {
        self.sender.subscribe()
    }
}

impl ObservationSink for BroadcastSink {
    fn has_listeners(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    fn send(&self, message: SharedMessage) -> Result<(), EventError> {
        self.sender
            .send(message)
            .map(|_| ())
            .map_err(|_| EventError::channel_closed())
    }
}

/// A sink that discards everything
pub struct NullSink;

impl ObservationSink for NullSink {
    fn has_listeners(&self) -> bool {
        false
    }

    fn send(&self, _message: SharedMessage) -> Result<(), EventError> {
        Ok(())
    }
}

/// A sink that collects messages into a vector (useful for testing)
#[derive(Default)]
pub struct VecSink {
    messages: Mutex<Vec<SharedMessage>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<SharedMessage> {
        self.messages.lock().clone()
    }
}

impl ObservationSink for VecSink {
    fn has_listeners(&self) -> bool {
        true
    }

    fn send(&self, message: SharedMessage) -> Result<(), EventError> {
        self.messages.lock().push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::PortMessage;
    use crate::types::{Port, PortDataType};
    use std::sync::Arc;

    fn message() -> SharedMessage {
        Arc::new(PortMessage {
            port: Port::output("out", "Out", PortDataType::Bool).with_value(true),
            node_uuid: "a1".to_string(),
            node_id: "switch".to_string(),
        })
    }

    #[test]
    fn test_broadcast_listeners() {
        let sink = BroadcastSink::new(8);
        assert!(!sink.has_listeners());
        assert!(sink.send(message()).is_err());

        let mut rx = sink.subscribe();
        assert!(sink.has_listeners());
        sink.send(message()).unwrap();
        assert_eq!(rx.try_recv().unwrap().node_uuid, "a1");

        drop(rx);
        assert!(!sink.has_listeners());
    }

    #[test]
    fn test_vec_sink() {
        let sink = VecSink::new();
        sink.send(message()).unwrap();
        sink.send(message()).unwrap();
        assert_eq!(sink.messages().len(), 2);
        assert!(!NullSink.has_listeners());
    }
}
