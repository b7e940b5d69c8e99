//! The node entity: identity, ports, last-value cache and publishing
//!
//! A [`BaseNode`] carries everything a node type needs to take part in a
//! graph. Concrete node types embed one and implement [`Node`](crate::Node)
//! on top of it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use reactive_tracer::{TraceStore, Tracer};
use tokio::sync::mpsc;

use crate::bus::{EventBus, PortMessage, Queue, SharedMessage};
use crate::constants::{defaults, NODE_UUID_LEN};
use crate::error::{ReactiveError, Result};
use crate::events::ObservationSink;
use crate::registry::{RuntimeRegistry, SharedNode};
use crate::types::{
    topic, Connection, Details, Meta, NodeInfo, NodeOptions, NodeUuid, NodeValue, Port, PortDataType,
    PortDirection, PortId, PortValue, Settings,
};

/// Generate a short random node UUID
pub fn node_uuid() -> NodeUuid {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(NODE_UUID_LEN);
    id
}

#[derive(Debug, Default)]
struct ValueTable {
    inputs: Vec<PortId>,
    outputs: Vec<PortId>,
    values: HashMap<PortId, Port>,
}

impl ValueTable {
    fn observed(&self, ids: &[PortId]) -> Vec<Port> {
        ids.iter()
            .filter_map(|id| self.values.get(id))
            .filter(|p| p.value.is_some())
            .cloned()
            .collect()
    }
}

/// The most recent value seen on each port of a node
///
/// Cloning shares the cache, so publishers and input receivers running in
/// other tasks write into the node's own map. The cache also keeps the
/// declared port order, which lets the registry read a node's values
/// without locking the node itself.
#[derive(Debug, Clone, Default)]
pub struct LastValues(Arc<Mutex<ValueTable>>);

impl LastValues {
    /// Insert the port, or update the value of the existing entry in place
    pub fn upsert(&self, port: Port) {
        let mut table = self.0.lock();
        match table.values.get_mut(&port.id) {
            Some(existing) => {
                existing.value = port.value;
                existing.last_updated = port.last_updated;
            }
            None => {
                table.values.insert(port.id.clone(), port);
            }
        }
    }

    pub fn get(&self, port_id: &str) -> Option<Port> {
        self.0.lock().values.get(port_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().values.is_empty()
    }

    pub(crate) fn declare(&self, direction: PortDirection, port_id: &str) {
        let mut table = self.0.lock();
        let ids = match direction {
            PortDirection::Input => &mut table.inputs,
            PortDirection::Output => &mut table.outputs,
        };
        if !ids.iter().any(|id| id == port_id) {
            ids.push(port_id.to_string());
        }
    }

    /// Observed values of declared inputs
    pub fn input_values(&self) -> Vec<Port> {
        let table = self.0.lock();
        table.observed(&table.inputs)
    }

    /// Observed values of declared outputs
    pub fn output_values(&self) -> Vec<Port> {
        let table = self.0.lock();
        table.observed(&table.outputs)
    }

    /// Observed values of inputs then outputs
    pub fn port_values(&self) -> Vec<Port> {
        let table = self.0.lock();
        let mut ports = table.observed(&table.inputs);
        ports.extend(table.observed(&table.outputs));
        ports
    }
}

/// Publishes on behalf of one node; cheap to clone into spawned tasks
#[derive(Clone)]
pub struct Publisher {
    node_uuid: NodeUuid,
    node_id: String,
    bus: Arc<EventBus>,
    last_values: LastValues,
    live_view: Option<Arc<dyn ObservationSink>>,
}

impl Publisher {
    /// Publish a port value on the node's `{uuid}-{port}` topic
    ///
    /// With `update_last_value` the node's cache is updated before the
    /// message reaches the bus, so a subscriber never sees a value the
    /// producer's own cache does not have yet.
    ///
    /// # Panics
    ///
    /// Panics if the port has an empty name; publishing from an unnamed
    /// port is a node definition bug.
    pub fn publish(&self, mut port: Port, update_last_value: bool) -> Result<()> {
        assert!(
            !port.name.is_empty(),
            "port name can not be empty (node {} port {})",
            self.node_uuid,
            port.id
        );
        port.validate()?;
        port.last_updated = Some(Utc::now());

        if update_last_value {
            self.last_values.upsert(port.clone());
        }

        let topic = topic(&self.node_uuid, &port.id);
        let message: SharedMessage = Arc::new(PortMessage {
            port,
            node_uuid: self.node_uuid.clone(),
            node_id: self.node_id.clone(),
        });
        log::debug!("Publishing on {}", topic);
        self.bus.publish(&topic, Arc::clone(&message));

        if let Some(sink) = &self.live_view {
            if sink.has_listeners() {
                if let Err(e) = sink.send(message) {
                    log::debug!("Live view dropped message from {}: {}", topic, e);
                }
            }
        }
        Ok(())
    }

    /// Publish a bare value on one of the node's output ports
    pub fn publish_value(
        &self,
        port_id: impl Into<String>,
        name: impl Into<String>,
        data_type: PortDataType,
        value: impl Into<PortValue>,
    ) -> Result<()> {
        self.publish(Port::output(port_id, name, data_type).with_value(value), true)
    }
}

/// Receiving end of one input port
///
/// Every delivered message is recorded in the node's last-value cache as
/// the value of this input before it is returned.
pub struct InputReceiver {
    port: Port,
    receiver: mpsc::Receiver<SharedMessage>,
    last_values: LastValues,
}

impl InputReceiver {
    pub fn port_id(&self) -> &str {
        &self.port.id
    }

    /// Wait for the next message; `None` once the node is gone
    pub async fn recv(&mut self) -> Option<SharedMessage> {
        let message = self.receiver.recv().await?;
        self.record(&message);
        Some(message)
    }

    /// Take a message if one is waiting
    pub fn try_recv(&mut self) -> Option<SharedMessage> {
        let message = self.receiver.try_recv().ok()?;
        self.record(&message);
        Some(message)
    }

    fn record(&self, message: &PortMessage) {
        let mut port = self.port.clone();
        port.value = message.port.value.clone();
        port.last_updated = message.port.last_updated.or_else(|| Some(Utc::now()));
        self.last_values.upsert(port);
    }
}

pub(crate) struct Mailbox {
    pub(crate) sender: Queue,
    receiver: Option<mpsc::Receiver<SharedMessage>>,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = mpsc::channel(defaults::MAILBOX_CAPACITY);
        Self {
            sender,
            receiver: Some(receiver),
        }
    }
}

/// Shared state and behavior of every node
pub struct BaseNode {
    pub(crate) id: String,
    pub(crate) uuid: NodeUuid,
    pub(crate) name: String,
    pub(crate) plugin_name: String,
    pub(crate) application: String,
    pub(crate) parent_uuid: Option<NodeUuid>,
    pub(crate) inputs: Vec<Port>,
    pub(crate) outputs: Vec<Port>,
    pub(crate) last_values: LastValues,
    pub(crate) mailboxes: HashMap<PortId, Mailbox>,
    pub(crate) connections: Vec<Connection>,
    pub(crate) settings: Option<Settings>,
    pub(crate) details: Details,
    pub(crate) meta: Meta,
    pub(crate) schema: Option<serde_json::Value>,
    pub(crate) children: HashMap<NodeUuid, SharedNode>,
    pub(crate) loaded: bool,
    pub(crate) allow_hot_fix: bool,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) registry: Option<Weak<RuntimeRegistry>>,
    pub(crate) live_view: Option<Arc<dyn ObservationSink>>,
    pub(crate) tracer: Option<Tracer>,
    pub(crate) store: Option<Arc<dyn TraceStore>>,
}

impl std::fmt::Debug for BaseNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseNode")
            .field("id", &self.id)
            .field("uuid", &self.uuid)
            .field("name", &self.name)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("connections", &self.connections.len())
            .field("children", &self.children.len())
            .field("loaded", &self.loaded)
            .finish()
    }
}

impl BaseNode {
    /// Create a node attached to a bus; a UUID is generated if none is given
    pub fn new(info: NodeInfo, options: NodeOptions, bus: Arc<EventBus>) -> Self {
        let uuid = if info.node_uuid.is_empty() {
            node_uuid()
        } else {
            info.node_uuid
        };
        let meta = options.meta.unwrap_or_default();
        let name = if info.name.is_empty() {
            info.node_id.clone()
        } else {
            info.name
        };

        Self {
            id: info.node_id,
            uuid,
            name,
            plugin_name: info.plugin_name,
            application: info.application,
            parent_uuid: meta.parent_uuid.clone(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            last_values: LastValues::default(),
            mailboxes: HashMap::new(),
            connections: Vec::new(),
            settings: None,
            details: Details::default(),
            meta,
            schema: None,
            children: HashMap::new(),
            loaded: false,
            allow_hot_fix: false,
            bus,
            registry: None,
            live_view: None,
            tracer: None,
            store: None,
        }
    }

    /// Keep a weak back-reference to the registry holding this node
    pub fn with_registry(mut self, registry: &Arc<RuntimeRegistry>) -> Self {
        self.registry = Some(Arc::downgrade(registry));
        self
    }

    pub fn with_live_view(mut self, sink: Arc<dyn ObservationSink>) -> Self {
        self.live_view = Some(sink);
        self
    }

    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn with_details(mut self, details: Details) -> Self {
        self.details = details;
        self
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Type name of the node, e.g. `math-scale`
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn parent_uuid(&self) -> Option<&str> {
        self.parent_uuid.as_deref()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    // ========================================================================
    // Ports
    // ========================================================================

    /// Add a port to the input or output set according to its direction
    pub fn new_port(&mut self, port: Port) {
        match port.direction {
            PortDirection::Input => self.new_input_port(port),
            PortDirection::Output => self.new_output_port(port),
        }
    }

    /// Add an input port and provision its delivery mailbox
    pub fn new_input_port(&mut self, mut port: Port) {
        port.direction = PortDirection::Input;
        self.last_values.declare(PortDirection::Input, &port.id);
        self.mailboxes
            .entry(port.id.clone())
            .or_insert_with(Mailbox::new);
        Self::replace_or_push(&mut self.inputs, port);
    }

    pub fn new_output_port(&mut self, mut port: Port) {
        port.direction = PortDirection::Output;
        self.last_values.declare(PortDirection::Output, &port.id);
        Self::replace_or_push(&mut self.outputs, port);
    }

    fn replace_or_push(ports: &mut Vec<Port>, port: Port) {
        match ports.iter_mut().find(|p| p.id == port.id) {
            Some(existing) => *existing = port,
            None => ports.push(port),
        }
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    /// Definition of an input port
    pub fn get_input(&self, port_id: &str) -> Result<&Port> {
        self.inputs
            .iter()
            .find(|p| p.id == port_id)
            .ok_or_else(|| self.unknown_port(port_id))
    }

    pub fn get_output(&self, port_id: &str) -> Result<&Port> {
        self.outputs
            .iter()
            .find(|p| p.id == port_id)
            .ok_or_else(|| self.unknown_port(port_id))
    }

    /// Set the value held by an input port's definition
    pub fn set_input_value(&mut self, port_id: &str, value: impl Into<PortValue>) -> Result<()> {
        let value = value.into();
        let node = self.uuid.clone();
        let port = self
            .inputs
            .iter_mut()
            .find(|p| p.id == port_id)
            .ok_or_else(|| ReactiveError::UnknownPort {
                node,
                port: port_id.to_string(),
            })?;
        if !port.data_type.accepts(&value) {
            return Err(ReactiveError::InvalidPortValue {
                port: port_id.to_string(),
                expected: port.data_type.as_str().to_string(),
                actual: value.kind().to_string(),
            });
        }
        port.value = Some(value);
        Ok(())
    }

    fn unknown_port(&self, port_id: &str) -> ReactiveError {
        ReactiveError::UnknownPort {
            node: self.uuid.clone(),
            port: port_id.to_string(),
        }
    }

    // ========================================================================
    // Last values
    // ========================================================================

    /// Record the latest value of a port
    pub fn set_last_value(&self, port: Port) {
        self.last_values.upsert(port);
    }

    /// Latest value observed on a port
    pub fn get_port_value(&self, port_id: &str) -> Result<Port> {
        self.last_values
            .get(port_id)
            .ok_or_else(|| ReactiveError::not_found(port_id))
    }

    pub fn last_values(&self) -> &LastValues {
        &self.last_values
    }

    pub fn all_input_values(&self) -> Vec<Port> {
        self.last_values.input_values()
    }

    pub fn all_output_values(&self) -> Vec<Port> {
        self.last_values.output_values()
    }

    /// Observed values of inputs then outputs
    pub fn all_port_values(&self) -> Vec<Port> {
        self.last_values.port_values()
    }

    pub fn node_value(&self) -> NodeValue {
        NodeValue {
            node_id: self.id.clone(),
            node_uuid: self.uuid.clone(),
            ports: self.all_port_values(),
        }
    }

    // ========================================================================
    // Publishing and receiving
    // ========================================================================

    pub fn publisher(&self) -> Publisher {
        Publisher {
            node_uuid: self.uuid.clone(),
            node_id: self.id.clone(),
            bus: Arc::clone(&self.bus),
            last_values: self.last_values.clone(),
            live_view: self.live_view.clone(),
        }
    }

    /// Publish a port value; see [`Publisher::publish`]
    ///
    /// # Panics
    ///
    /// Panics if the port has an empty name.
    pub fn publish_message(&self, port: Port, update_last_value: bool) -> Result<()> {
        self.publisher().publish(port, update_last_value)
    }

    /// Hand the receiving end of an input's mailbox to a processing loop
    ///
    /// Can be taken once per input port.
    pub fn take_input(&mut self, port_id: &str) -> Result<InputReceiver> {
        let port = self
            .inputs
            .iter()
            .find(|p| p.id == port_id)
            .cloned()
            .unwrap_or_else(|| Port::input(port_id, port_id, PortDataType::Any));
        let mailbox = self
            .mailboxes
            .get_mut(port_id)
            .ok_or_else(|| ReactiveError::UnknownPort {
                node: self.uuid.clone(),
                port: port_id.to_string(),
            })?;
        let receiver = mailbox
            .receiver
            .take()
            .ok_or_else(|| ReactiveError::InputTaken(port_id.to_string()))?;

        Ok(InputReceiver {
            port,
            receiver,
            last_values: self.last_values.clone(),
        })
    }

    // ========================================================================
    // Settings, details, meta, schema
    // ========================================================================

    pub fn add_settings(&mut self, settings: Settings) {
        self.settings = Some(settings);
    }

    pub fn update_settings(&mut self, settings: Settings) {
        log::debug!("Updating settings of node {}", self.uuid);
        self.settings = Some(settings);
    }

    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn supports_db(&self) -> bool {
        self.details.has_db
    }

    pub fn supports_logging(&self) -> bool {
        self.details.has_logger
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn set_meta(&mut self, meta: Meta) {
        self.parent_uuid = meta.parent_uuid.clone();
        self.meta = meta;
    }

    /// Schema document for configuration tooling, if one was built
    pub fn schema(&self) -> Option<&serde_json::Value> {
        self.schema.as_ref()
    }

    pub fn set_schema(&mut self, schema: serde_json::Value) {
        self.schema = Some(schema);
    }

    // ========================================================================
    // Lifecycle flags
    // ========================================================================

    pub fn loaded(&self) -> bool {
        self.loaded
    }

    pub fn set_loaded(&mut self, loaded: bool) {
        self.loaded = loaded;
    }

    /// Mark this instance as patchable in place; cannot be unset
    pub fn set_hot_fix(&mut self) {
        self.allow_hot_fix = true;
    }

    pub fn hot_fix(&self) -> bool {
        self.allow_hot_fix
    }

    // ========================================================================
    // Graph-wide queries
    // ========================================================================

    pub fn registry(&self) -> Result<Arc<RuntimeRegistry>> {
        self.registry
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(ReactiveError::RegistryUnavailable)
    }

    /// Every node in the registry this node belongs to
    pub fn all_nodes(&self) -> Result<Vec<SharedNode>> {
        Ok(self.registry()?.all_nodes())
    }

    /// Observed port values across the whole registry
    ///
    /// Reads each node's value cache only, so it is safe to call while
    /// holding this node's lock, even when other nodes do the same.
    pub fn all_node_values(&self) -> Result<Vec<NodeValue>> {
        Ok(self.registry()?.all_node_values())
    }

    /// Stop all inbound wiring and leave the registry
    pub fn teardown(&mut self) {
        for connection in std::mem::take(&mut self.connections) {
            self.unsubscribe_connection(&connection);
        }
        if let Ok(registry) = self.registry() {
            registry.remove(&self.uuid);
        }
        self.loaded = false;
        log::info!("Deleted node {} ({})", self.uuid, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::VecSink;
    use std::time::Duration;

    fn node(uuid: &str) -> BaseNode {
        BaseNode::new(
            NodeInfo::new("test-node").with_uuid(uuid),
            NodeOptions::default(),
            Arc::new(EventBus::new()),
        )
    }

    #[test]
    fn test_generated_uuid() {
        let node = BaseNode::new(
            NodeInfo::new("test-node"),
            NodeOptions::default(),
            Arc::new(EventBus::new()),
        );
        assert_eq!(node.uuid().len(), NODE_UUID_LEN);
        assert_eq!(node.name(), "test-node");
    }

    #[test]
    fn test_parent_from_meta() {
        let options = NodeOptions {
            meta: Some(Meta {
                parent_uuid: Some("p1".to_string()),
                ..Default::default()
            }),
        };
        let node = BaseNode::new(NodeInfo::new("n"), options, Arc::new(EventBus::new()));
        assert_eq!(node.parent_uuid(), Some("p1"));
    }

    #[test]
    fn test_input_ports_get_mailboxes() {
        let mut node = node("n1");
        node.new_input_port(Port::input("in", "In", PortDataType::Float));
        node.new_output_port(Port::output("out", "Out", PortDataType::Float));
        assert!(node.mailboxes.contains_key("in"));
        assert!(!node.mailboxes.contains_key("out"));

        // Same ID in the other direction is a different port
        node.new_port(Port::output("in", "Mirror", PortDataType::Float));
        assert_eq!(node.inputs().len(), 1);
        assert_eq!(node.outputs().len(), 2);
    }

    #[test]
    fn test_last_value_freshness() {
        let node = node("n1");
        assert!(matches!(
            node.get_port_value("temp"),
            Err(ReactiveError::PortValueNotFound(_))
        ));
        for v in [1.0, 2.0, 3.0] {
            node.set_last_value(Port::output("temp", "Temp", PortDataType::Float).with_value(v));
        }
        assert_eq!(node.get_port_value("temp").unwrap().value, Some(3.0.into()));
        assert_eq!(node.last_values().len(), 1);
    }

    #[test]
    fn test_set_input_value() {
        let mut node = node("n1");
        node.new_input_port(Port::input("enable", "Enable", PortDataType::Bool));
        node.set_input_value("enable", true).unwrap();
        assert_eq!(node.get_input("enable").unwrap().value, Some(true.into()));
        assert!(matches!(
            node.set_input_value("enable", 2.0),
            Err(ReactiveError::InvalidPortValue { .. })
        ));
        assert!(matches!(
            node.set_input_value("missing", 2.0),
            Err(ReactiveError::UnknownPort { .. })
        ));
    }

    #[test]
    fn test_port_values_only_observed() {
        let mut node = node("n1");
        node.new_input_port(Port::input("a", "A", PortDataType::Float));
        node.new_input_port(Port::input("b", "B", PortDataType::Float));
        node.new_output_port(Port::output("out", "Out", PortDataType::Float));
        node.set_last_value(Port::output("out", "Out", PortDataType::Float).with_value(9.0));
        node.set_last_value(Port::input("b", "B", PortDataType::Float).with_value(1.0));

        let ids: Vec<_> = node.all_port_values().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["b", "out"]);
        assert_eq!(node.all_input_values().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_updates_cache_and_live_view() {
        let sink = Arc::new(VecSink::new());
        let node = node("a1").with_live_view(sink.clone());

        node.publish_message(
            Port::output("temp", "Temp", PortDataType::Float).with_value(21.5),
            true,
        )
        .unwrap();

        let cached = node.get_port_value("temp").unwrap();
        assert_eq!(cached.value, Some(21.5.into()));
        assert!(cached.last_updated.is_some());
        assert_eq!(sink.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_without_cache_update() {
        let node = node("a1");
        node.publish_message(
            Port::output("temp", "Temp", PortDataType::Float).with_value(1.0),
            false,
        )
        .unwrap();
        assert!(node.get_port_value("temp").is_err());
    }

    #[tokio::test]
    async fn test_publish_rejects_wrong_kind() {
        let node = node("a1");
        let err = node
            .publish_message(
                Port::output("temp", "Temp", PortDataType::Float).with_value("hot"),
                true,
            )
            .unwrap_err();
        assert!(matches!(err, ReactiveError::InvalidPortValue { .. }));
        assert!(node.get_port_value("temp").is_err());
    }

    #[tokio::test]
    #[should_panic(expected = "port name can not be empty")]
    async fn test_publish_unnamed_port_panics() {
        let node = node("a1");
        let _ = node.publish_message(Port::output("temp", "", PortDataType::Float), true);
    }

    #[tokio::test]
    async fn test_input_receiver_records_value() {
        let mut node = node("b1");
        node.new_input_port(Port::input("in", "In", PortDataType::Float));
        let sender = node.mailboxes["in"].sender.clone();
        let mut input = node.take_input("in").unwrap();
        assert!(matches!(
            node.take_input("in"),
            Err(ReactiveError::InputTaken(_))
        ));

        sender
            .send(Arc::new(PortMessage {
                port: Port::output("temp", "Temp", PortDataType::Float).with_value(4.0),
                node_uuid: "a1".to_string(),
                node_id: "source".to_string(),
            }))
            .await
            .unwrap();

        let msg = tokio::time::timeout(Duration::from_millis(500), input.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.port.id, "temp");

        let cached = node.get_port_value("in").unwrap();
        assert_eq!(cached.value, Some(4.0.into()));
        assert_eq!(cached.direction, crate::types::PortDirection::Input);
    }

    #[test]
    fn test_hot_fix_latch() {
        let mut node = node("n1");
        assert!(!node.hot_fix());
        node.set_hot_fix();
        node.set_hot_fix();
        assert!(node.hot_fix());
    }

    #[test]
    fn test_registry_unavailable() {
        let node = node("n1");
        assert!(matches!(
            node.all_node_values(),
            Err(ReactiveError::RegistryUnavailable)
        ));
    }
}
