//! Child nodes owned by a parent node
//!
//! Composition only: children are not wired to their parent through the bus.

use crate::error::{ReactiveError, Result};
use crate::node::BaseNode;
use crate::registry::SharedNode;
use crate::traits::NodeCore;
use crate::types::Port;

impl BaseNode {
    /// Take ownership of a child node, keyed by its UUID
    pub fn register_child_node(&mut self, child: SharedNode) {
        let uuid = child.read().base().uuid().to_string();
        log::debug!("Node {} registered child {}", self.uuid, uuid);
        self.children.insert(uuid, child);
    }

    pub fn get_child_node(&self, uuid: &str) -> Option<SharedNode> {
        self.children.get(uuid).cloned()
    }

    pub fn child_nodes(&self) -> Vec<SharedNode> {
        self.children.values().cloned().collect()
    }

    /// Children whose type name is `node_id`
    pub fn children_by_type(&self, node_id: &str) -> Vec<SharedNode> {
        self.children
            .values()
            .filter(|child| child.read().base().id() == node_id)
            .cloned()
            .collect()
    }

    pub fn remove_child_node(&mut self, uuid: &str) -> Option<SharedNode> {
        self.children.remove(uuid)
    }

    /// Observed port values of one child
    pub fn port_values_of_child(&self, uuid: &str) -> Result<Vec<Port>> {
        let child = self.child(uuid)?;
        let values = child.read().base().all_port_values();
        Ok(values)
    }

    /// Record a last value on one child
    pub fn set_last_value_child(&self, uuid: &str, port: Port) -> Result<()> {
        let child = self.child(uuid)?;
        child.read().base().set_last_value(port);
        Ok(())
    }

    fn child(&self, uuid: &str) -> Result<&SharedNode> {
        self.children
            .get(uuid)
            .ok_or_else(|| ReactiveError::ChildNotFound(uuid.to_string()))
    }
}
