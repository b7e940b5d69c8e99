//! Topic-based event bus
//!
//! Producers publish on `{uuid}-{port}` topics; every queue subscribed to a
//! topic gets its own delivery task, so a full or abandoned mailbox only ever
//! stalls that one subscriber. Publishing never blocks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::types::Port;

/// A port value published by a node
#[derive(Debug, Clone, PartialEq)]
pub struct PortMessage {
    pub port: Port,
    pub node_uuid: String,
    pub node_id: String,
}

/// Messages are shared between every subscriber of a topic
pub type SharedMessage = Arc<PortMessage>;

/// Delivery queue of one input port
pub type Queue = mpsc::Sender<SharedMessage>;

struct Subscriber {
    queue: Queue,
    staging: mpsc::UnboundedSender<SharedMessage>,
    closed: watch::Sender<bool>,
}

/// Routes published messages to the queues subscribed to each topic
#[derive(Default)]
pub struct EventBus {
    topics: Mutex<HashMap<String, Vec<Subscriber>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.topics.lock().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queue under a topic
    ///
    /// Registering the same queue twice creates two independent
    /// subscriptions, each removed by its own `unsubscribe` call.
    ///
    /// Messages are staged without bound in front of the mailbox. A receiver
    /// that is never drained keeps its backlog in memory until the
    /// subscription is removed or the receiver is dropped.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime: each subscription owns a
    /// spawned delivery task.
    pub fn subscribe(&self, topic: &str, queue: Queue) {
        let (staging, staged) = mpsc::unbounded_channel();
        let (closed, closed_rx) = watch::channel(false);

        tokio::spawn(deliver(topic.to_string(), staged, queue.clone(), closed_rx));

        let mut topics = self.topics.lock();
        topics.entry(topic.to_string()).or_default().push(Subscriber {
            queue,
            staging,
            closed,
        });
        log::debug!("Subscribed queue to topic {}", topic);
    }

    /// Remove one registration of `queue` under `topic`
    ///
    /// Stops its delivery task; anything still staged for it is dropped.
    /// Returns false (and does nothing) when the pair is not registered.
    pub fn unsubscribe(&self, topic: &str, queue: &Queue) -> bool {
        let mut topics = self.topics.lock();
        let Some(subscribers) = topics.get_mut(topic) else {
            return false;
        };
        let Some(index) = subscribers
            .iter()
            .position(|s| s.queue.same_channel(queue))
        else {
            return false;
        };

        let subscriber = subscribers.remove(index);
        subscriber.closed.send_replace(true);
        if subscribers.is_empty() {
            topics.remove(topic);
        }
        log::debug!("Unsubscribed queue from topic {}", topic);
        true
    }

    /// Hand a message to every subscriber of `topic`
    ///
    /// Returns immediately. A topic without subscribers is a no-op.
    /// Subscribers whose receiver was dropped are removed here.
    pub fn publish(&self, topic: &str, message: SharedMessage) {
        let mut topics = self.topics.lock();
        let Some(subscribers) = topics.get_mut(topic) else {
            log::trace!("No subscribers on topic {}", topic);
            return;
        };
        subscribers.retain(|subscriber| {
            let alive = subscriber.staging.send(Arc::clone(&message)).is_ok();
            if !alive {
                log::debug!("Pruned stopped subscriber from topic {}", topic);
            }
            alive
        });
        if subscribers.is_empty() {
            topics.remove(topic);
        }
    }

    /// Number of live registrations under a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.lock().get(topic).map_or(0, Vec::len)
    }

    /// Topics with at least one subscriber
    pub fn topics(&self) -> Vec<String> {
        self.topics.lock().keys().cloned().collect()
    }
}

/// Forward staged messages into one subscriber's queue, in publish order
async fn deliver(
    topic: String,
    mut staged: mpsc::UnboundedReceiver<SharedMessage>,
    queue: Queue,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => break,
            message = staged.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => break,
            sent = queue.send(message) => {
                if sent.is_err() {
                    log::debug!("Queue for topic {} was dropped", topic);
                    break;
                }
            }
        }
    }
    log::trace!("Delivery task for topic {} finished", topic);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PortDataType;
    use std::time::Duration;
    use tokio::time::timeout;

    fn message(value: f64) -> SharedMessage {
        Arc::new(PortMessage {
            port: Port::output("out", "Out", PortDataType::Float).with_value(value),
            node_uuid: "a1".to_string(),
            node_id: "source".to_string(),
        })
    }

    async fn next(rx: &mut mpsc::Receiver<SharedMessage>) -> Option<SharedMessage> {
        timeout(Duration::from_millis(500), rx.recv()).await.ok().flatten()
    }

    async fn nothing(rx: &mut mpsc::Receiver<SharedMessage>) -> bool {
        timeout(Duration::from_millis(50), rx.recv()).await.is_err()
    }

    #[tokio::test]
    async fn test_topic_isolation() {
        let bus = EventBus::new();
        let (tx1, mut rx1) = mpsc::channel(1);
        let (tx2, mut rx2) = mpsc::channel(1);
        bus.subscribe("a1-out", tx1);
        bus.subscribe("a2-out", tx2);

        bus.publish("a1-out", message(1.0));

        assert!(next(&mut rx1).await.is_some());
        assert!(nothing(&mut rx2).await);
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_one_copy() {
        let bus = EventBus::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = mpsc::channel(1);
            bus.subscribe("a1-out", tx);
            receivers.push(rx);
        }
        assert_eq!(bus.subscriber_count("a1-out"), 3);

        bus.publish("a1-out", message(2.0));

        for rx in receivers.iter_mut() {
            let msg = next(rx).await.unwrap();
            assert_eq!(msg.port.value, Some(2.0.into()));
            assert!(nothing(rx).await);
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::channel(1);
        bus.subscribe("a1-out", tx.clone());

        assert!(bus.unsubscribe("a1-out", &tx));
        bus.publish("a1-out", message(3.0));

        assert!(nothing(&mut rx).await);
        assert_eq!(bus.subscriber_count("a1-out"), 0);
        assert!(bus.topics().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_is_noop() {
        let bus = EventBus::new();
        let (tx, _rx) = mpsc::channel(1);
        assert!(!bus.unsubscribe("missing", &tx));

        let (other, _other_rx) = mpsc::channel(1);
        bus.subscribe("a1-out", other);
        assert!(!bus.unsubscribe("a1-out", &tx));
        assert_eq!(bus.subscriber_count("a1-out"), 1);
    }

    #[tokio::test]
    async fn test_duplicate_subscriptions_removed_independently() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::channel(4);
        bus.subscribe("a1-out", tx.clone());
        bus.subscribe("a1-out", tx.clone());

        assert!(bus.unsubscribe("a1-out", &tx));
        assert_eq!(bus.subscriber_count("a1-out"), 1);

        bus.publish("a1-out", message(4.0));
        assert!(next(&mut rx).await.is_some());
        assert!(nothing(&mut rx).await);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish("nobody-out", message(5.0));
        assert_eq!(bus.subscriber_count("nobody-out"), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(1);
        bus.subscribe("a1-out", slow_tx);
        bus.subscribe("a1-out", fast_tx);

        for i in 0..5 {
            bus.publish("a1-out", message(i as f64));
        }

        // The slow mailbox is never drained while the fast one reads everything
        for i in 0..5 {
            let msg = next(&mut fast_rx).await.unwrap();
            assert_eq!(msg.port.value, Some((i as f64).into()));
        }

        let first = next(&mut slow_rx).await.unwrap();
        assert_eq!(first.port.value, Some(0.0.into()));
    }

    #[tokio::test]
    async fn test_delivery_preserves_publish_order() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::channel(1);
        bus.subscribe("a1-out", tx);

        for i in 0..20 {
            bus.publish("a1-out", message(i as f64));
        }
        for i in 0..20 {
            let msg = next(&mut rx).await.unwrap();
            assert_eq!(msg.port.value.as_ref().and_then(|v| v.as_f64()), Some(i as f64));
        }
    }

    #[tokio::test]
    async fn test_dropped_queue_does_not_break_publish() {
        let bus = EventBus::new();
        let (tx, rx) = mpsc::channel(1);
        bus.subscribe("a1-out", tx);
        drop(rx);

        // The delivery task stops on its first failed send; the next publish prunes it
        timeout(Duration::from_secs(1), async {
            let mut value = 0.0;
            while bus.subscriber_count("a1-out") > 0 {
                bus.publish("a1-out", message(value));
                value += 1.0;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(bus.topics().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_queue_pruned_without_touching_live_ones() {
        let bus = EventBus::new();
        let (dead_tx, dead_rx) = mpsc::channel(1);
        let (live_tx, mut live_rx) = mpsc::channel(8);
        bus.subscribe("a1-out", dead_tx);
        bus.subscribe("a1-out", live_tx);
        drop(dead_rx);

        timeout(Duration::from_secs(1), async {
            while bus.subscriber_count("a1-out") > 1 {
                bus.publish("a1-out", message(0.0));
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        bus.publish("a1-out", message(9.0));
        let mut last = None;
        while let Some(msg) = next(&mut live_rx).await {
            last = msg.port.value.clone();
            if last == Some(9.0.into()) {
                break;
            }
        }
        assert_eq!(last, Some(9.0.into()));
        assert_eq!(bus.subscriber_count("a1-out"), 1);
    }

    #[tokio::test]
    async fn test_undrained_backlog_is_kept_in_order() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::channel(1);
        bus.subscribe("a1-out", tx);

        for i in 0..200 {
            bus.publish("a1-out", message(i as f64));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        for i in 0..200 {
            let msg = next(&mut rx).await.unwrap();
            assert_eq!(msg.port.value.as_ref().and_then(|v| v.as_f64()), Some(i as f64));
        }
        assert!(nothing(&mut rx).await);
    }
}
