//! Runtime registry of live node instances
//!
//! The registry is the only owner of live nodes. It is built once by the
//! driver and handed to every node as a weak back-reference, so graph-wide
//! queries need no separate index.
//!
//! # Usage
//!
//! ```ignore
//! use reactive_graph::{shared, RuntimeRegistry};
//!
//! let registry = Arc::new(RuntimeRegistry::new());
//! let node = BaseNode::new(info, NodeOptions::default(), bus).with_registry(&registry);
//! registry.add(shared(node));
//! let snapshot = registry.all_node_values();
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::node::LastValues;
use crate::traits::{Node, NodeCore};
use crate::types::NodeValue;

/// A live node, shared between the registry, its parent and the driver
pub type SharedNode = Arc<RwLock<dyn Node>>;

/// Wrap a node for the registry
pub fn shared<N: Node + 'static>(node: N) -> SharedNode {
    Arc::new(RwLock::new(node))
}

struct Entry {
    node: SharedNode,
    node_id: String,
    values: LastValues,
}

impl Entry {
    fn node_value(&self, uuid: &str) -> NodeValue {
        NodeValue {
            node_id: self.node_id.clone(),
            node_uuid: uuid.to_string(),
            ports: self.values.port_values(),
        }
    }
}

/// Table of live nodes keyed by UUID
#[derive(Default)]
pub struct RuntimeRegistry {
    nodes: Mutex<HashMap<String, Entry>>,
}

impl std::fmt::Debug for RuntimeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeRegistry")
            .field("nodes", &self.len())
            .finish()
    }
}

impl RuntimeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under its own UUID, replacing any previous entry
    ///
    /// Briefly read-locks the node; the caller must not hold its write lock.
    pub fn add(&self, node: SharedNode) {
        let (uuid, node_id, values) = {
            let guard = node.read();
            let base = guard.base();
            (
                base.uuid().to_string(),
                base.id().to_string(),
                base.last_values().clone(),
            )
        };
        log::debug!("Registered node {}", uuid);
        self.nodes.lock().insert(
            uuid,
            Entry {
                node,
                node_id,
                values,
            },
        );
    }

    pub fn remove(&self, uuid: &str) -> Option<SharedNode> {
        let removed = self.nodes.lock().remove(uuid).map(|entry| entry.node);
        if removed.is_some() {
            log::debug!("Removed node {} from registry", uuid);
        }
        removed
    }

    pub fn get(&self, uuid: &str) -> Option<SharedNode> {
        self.nodes.lock().get(uuid).map(|entry| Arc::clone(&entry.node))
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.nodes.lock().contains_key(uuid)
    }

    pub fn all_nodes(&self) -> Vec<SharedNode> {
        self.nodes
            .lock()
            .values()
            .map(|entry| Arc::clone(&entry.node))
            .collect()
    }

    /// Observed port values of every registered node
    ///
    /// Reads each node's value cache, never the node lock, so nodes may call
    /// this while locked. Best-effort against concurrent changes. Nodes with
    /// no observed values are left out.
    pub fn all_node_values(&self) -> Vec<NodeValue> {
        self.nodes
            .lock()
            .iter()
            .map(|(uuid, entry)| entry.node_value(uuid))
            .filter(|value| !value.ports.is_empty())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::node::BaseNode;
    use crate::types::{Connection, NodeInfo, NodeOptions, Port, PortDataType};

    fn node(uuid: &str, bus: &Arc<EventBus>, registry: &Arc<RuntimeRegistry>) -> BaseNode {
        BaseNode::new(
            NodeInfo::new("test-node").with_uuid(uuid),
            NodeOptions::default(),
            Arc::clone(bus),
        )
        .with_registry(registry)
    }

    #[test]
    fn test_add_get_remove() {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(RuntimeRegistry::new());
        registry.add(shared(node("n1", &bus, &registry)));
        registry.add(shared(node("n2", &bus, &registry)));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("n1").is_some());
        assert!(registry.remove("n1").is_some());
        assert!(registry.remove("n1").is_none());
        assert!(!registry.contains("n1"));
        assert_eq!(registry.all_nodes().len(), 1);
    }

    #[test]
    fn test_all_node_values_skips_silent_nodes() {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(RuntimeRegistry::new());

        let mut a = node("a1", &bus, &registry);
        a.new_output_port(Port::output("temp", "Temp", PortDataType::Float));
        a.set_last_value(Port::output("temp", "Temp", PortDataType::Float).with_value(20.0));
        registry.add(shared(a));
        registry.add(shared(node("quiet", &bus, &registry)));

        let values = registry.all_node_values();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].node_uuid, "a1");
        assert_eq!(values[0].ports[0].value, Some(20.0.into()));
    }

    #[test]
    fn test_node_sees_graph_through_registry() {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(RuntimeRegistry::new());

        let mut a = node("a1", &bus, &registry);
        a.new_output_port(Port::output("temp", "Temp", PortDataType::Float));
        a.set_last_value(Port::output("temp", "Temp", PortDataType::Float).with_value(20.0));
        let a = shared(a);
        registry.add(Arc::clone(&a));

        let mut b = node("b1", &bus, &registry);
        b.new_input_port(Port::input("in", "In", PortDataType::Float));
        b.set_last_value(Port::input("in", "In", PortDataType::Float).with_value(20.0));
        let b = shared(b);
        registry.add(Arc::clone(&b));

        let guard = b.write();
        let values = guard.base().all_node_values().unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(guard.base().all_nodes().unwrap().len(), 2);
    }

    #[test]
    fn test_locked_nodes_query_each_other_concurrently() {
        use std::sync::{mpsc, Barrier};
        use std::time::Duration;

        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(RuntimeRegistry::new());
        let nodes: Vec<SharedNode> = ["a1", "b1"]
            .into_iter()
            .map(|uuid| {
                let mut n = node(uuid, &bus, &registry);
                n.new_output_port(Port::output("out", "Out", PortDataType::Float));
                n.set_last_value(Port::output("out", "Out", PortDataType::Float).with_value(1.0));
                let n = shared(n);
                registry.add(Arc::clone(&n));
                n
            })
            .collect();

        let barrier = Arc::new(Barrier::new(2));
        let (tx, rx) = mpsc::channel();
        for n in nodes {
            let barrier = Arc::clone(&barrier);
            let tx = tx.clone();
            std::thread::spawn(move || {
                let guard = n.write();
                barrier.wait();
                let count = guard.base().all_node_values().map(|v| v.len());
                let _ = tx.send(count);
            });
        }

        for _ in 0..2 {
            let count = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(count.unwrap(), 2);
        }
    }

    #[tokio::test]
    async fn test_delete_unwires_and_leaves_registry() {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(RuntimeRegistry::new());
        let mut b = node("b1", &bus, &registry);
        b.new_input_port(Port::input("in", "In", PortDataType::Float));
        b.add_connection(Connection::new("a1", "temp", "b1", "in"));
        let b = shared(b);
        registry.add(Arc::clone(&b));

        b.write().delete().unwrap();

        assert!(registry.is_empty());
        assert_eq!(bus.subscriber_count("a1-temp"), 0);
        assert!(b.read().base().connections().is_empty());
    }
}
