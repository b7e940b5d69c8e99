//! Node capability traits
//!
//! A node type embeds a [`BaseNode`] and implements [`NodeCore`] to expose
//! it. The port, tracing and persistence capabilities then come for free;
//! [`Node`] adds the lifecycle hooks a type may override.

use std::sync::Arc;

use reactive_tracer::{Message, TraceLevel, TraceStore, Tracer};

use crate::error::{ReactiveError, Result};
use crate::node::{BaseNode, Publisher};
use crate::types::{Connection, Port, PortValue};

/// Access to the shared node state
pub trait NodeCore {
    fn base(&self) -> &BaseNode;
    fn base_mut(&mut self) -> &mut BaseNode;
}

impl NodeCore for BaseNode {
    fn base(&self) -> &BaseNode {
        self
    }

    fn base_mut(&mut self) -> &mut BaseNode {
        self
    }
}

/// Ports, values and wiring
pub trait PortHolder: NodeCore {
    fn uuid(&self) -> &str {
        self.base().uuid()
    }

    fn get_port_value(&self, port_id: &str) -> Result<Port> {
        self.base().get_port_value(port_id)
    }

    fn set_last_value(&self, port: Port) {
        self.base().set_last_value(port)
    }

    fn all_port_values(&self) -> Vec<Port> {
        self.base().all_port_values()
    }

    fn set_input_value(&mut self, port_id: &str, value: PortValue) -> Result<()> {
        self.base_mut().set_input_value(port_id, value)
    }

    fn publisher(&self) -> Publisher {
        self.base().publisher()
    }

    fn add_connection(&mut self, connection: Connection) {
        self.base_mut().add_connection(connection)
    }

    fn update_connections(&mut self, connections: Vec<Connection>) {
        self.base_mut().update_connections(connections)
    }
}

impl<T: NodeCore + ?Sized> PortHolder for T {}

/// Per-node diagnostic trace
pub trait Traceable: NodeCore {
    fn attach_tracer(&mut self, tracer: Tracer) {
        let base = self.base_mut();
        let mut tracer = tracer;
        if let Some(store) = &base.store {
            tracer.bind_store(Arc::clone(store));
        }
        base.tracer = Some(tracer);
    }

    fn tracer(&self) -> Result<&Tracer> {
        self.base()
            .tracer
            .as_ref()
            .ok_or(ReactiveError::TracerNotAttached)
    }

    fn tracer_mut(&mut self) -> Result<&mut Tracer> {
        self.base_mut()
            .tracer
            .as_mut()
            .ok_or(ReactiveError::TracerNotAttached)
    }

    /// Record a disk-bound message on this node's tracer
    fn trace(&mut self, level: TraceLevel, text: impl Into<String>) -> Result<Message>
    where
        Self: Sized,
    {
        let tracer = self.tracer_mut()?;
        let path = tracer.path().to_string();
        Ok(tracer.add_message(path, text, level, true))
    }

    /// Migrate buffered trace messages to the durable store
    fn save_traces(&mut self, max_table_size: usize) -> Result<()> {
        self.tracer_mut()?.save_messages_to_db(max_table_size)?;
        Ok(())
    }
}

impl<T: NodeCore + ?Sized> Traceable for T {}

/// Durable store handle
pub trait Persistable: NodeCore {
    /// Attach a store; an attached tracer is bound to it too
    fn attach_store(&mut self, store: Arc<dyn TraceStore>) {
        let base = self.base_mut();
        if let Some(tracer) = base.tracer.as_mut() {
            tracer.bind_store(Arc::clone(&store));
        }
        base.store = Some(store);
    }

    fn store(&self) -> Result<Arc<dyn TraceStore>> {
        self.base()
            .store
            .clone()
            .ok_or(ReactiveError::StoreNotAttached)
    }
}

impl<T: NodeCore + ?Sized> Persistable for T {}

/// A graph node
pub trait Node: NodeCore + Send + Sync {
    /// Bring the node up; the default only marks it loaded
    fn start(&mut self) -> Result<()> {
        let base = self.base_mut();
        base.set_loaded(true);
        log::info!("Started node {} ({})", base.uuid(), base.id());
        Ok(())
    }

    /// Disconnect every inbound wire and leave the registry
    fn delete(&mut self) -> Result<()> {
        self.base_mut().teardown();
        Ok(())
    }

    /// Produce the configuration schema document
    ///
    /// Schema content comes from outside this crate; the default builds
    /// nothing.
    fn build_schema(&mut self) -> Result<()> {
        Ok(())
    }

    fn get_schema(&self) -> Option<&serde_json::Value> {
        self.base().schema()
    }
}

impl Node for BaseNode {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::types::{NodeInfo, NodeOptions, PortDataType};
    use reactive_tracer::InMemoryTraceStore;

    struct ScaleNode {
        base: BaseNode,
    }

    impl NodeCore for ScaleNode {
        fn base(&self) -> &BaseNode {
            &self.base
        }

        fn base_mut(&mut self) -> &mut BaseNode {
            &mut self.base
        }
    }

    impl Node for ScaleNode {
        fn build_schema(&mut self) -> Result<()> {
            self.base
                .set_schema(serde_json::json!({"type": "object", "title": "scale"}));
            Ok(())
        }
    }

    fn scale() -> ScaleNode {
        ScaleNode {
            base: BaseNode::new(
                NodeInfo::new("math-scale").with_uuid("s1"),
                NodeOptions::default(),
                Arc::new(EventBus::new()),
            ),
        }
    }

    #[test]
    fn test_capabilities_through_node_type() {
        let mut node = scale();
        node.set_last_value(Port::output("out", "Out", PortDataType::Float).with_value(2.0));
        assert_eq!(PortHolder::uuid(&node), "s1");
        assert_eq!(node.get_port_value("out").unwrap().value, Some(2.0.into()));

        assert!(node.get_schema().is_none());
        node.build_schema().unwrap();
        assert_eq!(node.get_schema().unwrap()["title"], "scale");
    }

    #[test]
    fn test_start_marks_loaded() {
        let mut node = scale();
        assert!(!node.base().loaded());
        node.start().unwrap();
        assert!(node.base().loaded());
    }

    #[test]
    fn test_missing_tracer_and_store() {
        let mut node = scale();
        assert!(matches!(
            node.trace(TraceLevel::Info, "hello"),
            Err(ReactiveError::TracerNotAttached)
        ));
        assert!(matches!(node.store(), Err(ReactiveError::StoreNotAttached)));
    }

    #[test]
    fn test_trace_and_save() {
        let mut node = scale();
        let store: Arc<dyn TraceStore> = Arc::new(InMemoryTraceStore::new());
        node.attach_tracer(Tracer::new("math", "demo", None));
        node.attach_store(Arc::clone(&store));
        node.tracer_mut().unwrap().add_tracer("s1", "scale").unwrap();

        node.trace(TraceLevel::Info, "scaled 2.0").unwrap();
        node.trace(TraceLevel::Warning, "input missing").unwrap();
        assert_eq!(node.tracer().unwrap().in_memory_messages().len(), 2);

        node.save_traces(10).unwrap();
        let tracer = node.tracer().unwrap();
        assert!(tracer.in_memory_messages().is_empty());
        assert_eq!(tracer.all_messages(false).unwrap().len(), 2);
    }
}
