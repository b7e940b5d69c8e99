//! Inbound wiring of a node and live rewiring
//!
//! A node owns the connections that feed its own inputs. Each connection is
//! backed by exactly one bus subscription of the target input's mailbox on
//! the source output's topic.

use crate::node::{BaseNode, Mailbox};
use crate::types::Connection;

impl BaseNode {
    /// Wire a source output into one of this node's inputs
    ///
    /// Adding a connection that is already held is a no-op.
    pub fn add_connection(&mut self, connection: Connection) {
        if connection.target_uuid != self.uuid {
            log::warn!(
                "Connection into {} added to node {}",
                connection.target_uuid,
                self.uuid
            );
        }
        if self.connections.iter().any(|c| c.same_wire(&connection)) {
            log::debug!(
                "Connection {} -> {}:{} already exists",
                connection.topic(),
                self.uuid,
                connection.target_port
            );
            return;
        }

        let mailbox = self
            .mailboxes
            .entry(connection.target_port.clone())
            .or_insert_with(Mailbox::new);
        self.bus
            .subscribe(&connection.topic(), mailbox.sender.clone());

        log::debug!(
            "Connected {} -> {}:{}",
            connection.topic(),
            self.uuid,
            connection.target_port
        );
        self.connections.push(connection);
    }

    /// Rewire this node to exactly `connections`
    ///
    /// Held connections missing from the new set are unsubscribed and
    /// dropped, then every connection of the new set is added. Calls on the
    /// same node must not overlap.
    pub fn update_connections(&mut self, connections: Vec<Connection>) {
        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.connections)
            .into_iter()
            .partition(|existing| connections.iter().any(|c| c.same_wire(existing)));

        for connection in &removed {
            self.unsubscribe_connection(connection);
        }
        self.connections = kept;

        for connection in connections {
            self.add_connection(connection);
        }
        log::debug!(
            "Node {} rewired: {} removed, {} held",
            self.uuid,
            removed.len(),
            self.connections.len()
        );
    }

    /// Drop one held connection; false when it is not held
    pub fn remove_connection(&mut self, connection: &Connection) -> bool {
        let Some(index) = self
            .connections
            .iter()
            .position(|c| c.same_wire(connection))
        else {
            return false;
        };
        let removed = self.connections.remove(index);
        self.unsubscribe_connection(&removed);
        true
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub(crate) fn unsubscribe_connection(&self, connection: &Connection) {
        let Some(mailbox) = self.mailboxes.get(&connection.target_port) else {
            return;
        };
        if self.bus.unsubscribe(&connection.topic(), &mailbox.sender) {
            log::debug!(
                "Disconnected {} -> {}:{}",
                connection.topic(),
                self.uuid,
                connection.target_port
            );
        }
    }
}
