//! Driver-side glue: one bus, one registry, one trace store
//!
//! A [`Runtime`] owns the shared collaborators every node needs and wires
//! them into each node it creates.

use std::sync::Arc;

use reactive_tracer::{InMemoryTraceStore, SqliteTraceStore, TraceStore, Tracer};
use tokio::sync::broadcast;

use crate::bus::{EventBus, SharedMessage};
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::events::BroadcastSink;
use crate::node::BaseNode;
use crate::registry::{shared, RuntimeRegistry, SharedNode};
use crate::traits::{Node, Traceable};
use crate::types::{NodeInfo, NodeOptions, NodeValue};

pub struct Runtime {
    config: RuntimeConfig,
    bus: Arc<EventBus>,
    registry: Arc<RuntimeRegistry>,
    live_view: Option<Arc<BroadcastSink>>,
    store: Option<Arc<dyn TraceStore>>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("nodes", &self.registry.len())
            .field("live_view", &self.live_view.is_some())
            .field("store", &self.store.is_some())
            .finish()
    }
}

impl Runtime {
    /// Build a runtime; opens the SQLite trace store when one is configured
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let store: Option<Arc<dyn TraceStore>> = if config.trace.enabled {
            match &config.trace.database_path {
                Some(path) => {
                    log::info!("Opening trace store at {}", path.display());
                    Some(Arc::new(SqliteTraceStore::open(path)?))
                }
                None => Some(Arc::new(InMemoryTraceStore::new())),
            }
        } else {
            None
        };

        let live_view = (config.live_view_capacity > 0)
            .then(|| Arc::new(BroadcastSink::new(config.live_view_capacity)));

        Ok(Self {
            config,
            bus: Arc::new(EventBus::new()),
            registry: Arc::new(RuntimeRegistry::new()),
            live_view,
            store,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<RuntimeRegistry> {
        &self.registry
    }

    pub fn store(&self) -> Option<&Arc<dyn TraceStore>> {
        self.store.as_ref()
    }

    /// Watch every message published by nodes of this runtime
    pub fn subscribe_live_view(&self) -> Option<broadcast::Receiver<SharedMessage>> {
        self.live_view.as_ref().map(|sink| sink.subscribe())
    }

    /// Create a node wired to this runtime's bus, registry, live view and store
    ///
    /// With tracing enabled the node gets its own tracer, registered in the
    /// store under the node's UUID.
    pub fn new_node(&self, info: NodeInfo, options: NodeOptions) -> Result<BaseNode> {
        let path = if info.plugin_name.is_empty() {
            info.node_id.clone()
        } else {
            info.plugin_name.clone()
        };
        let application = info.application.clone();

        let mut node =
            BaseNode::new(info, options, Arc::clone(&self.bus)).with_registry(&self.registry);
        if let Some(sink) = &self.live_view {
            node = node.with_live_view(sink.clone());
        }

        if let Some(store) = &self.store {
            node.store = Some(Arc::clone(store));
            let mut tracer = Tracer::new(path, application, Some(Arc::clone(store)));
            tracer.add_tracer(node.uuid(), node.id())?;
            node.tracer = Some(tracer);
        }

        log::debug!("Created node {} ({})", node.uuid(), node.id());
        Ok(node)
    }

    /// Hand a node to the registry
    pub fn register<N: Node + 'static>(&self, node: N) -> SharedNode {
        let node = shared(node);
        self.registry.add(Arc::clone(&node));
        node
    }

    /// Start every registered node
    pub fn start_all(&self) -> Result<()> {
        for node in self.registry.all_nodes() {
            node.write().start()?;
        }
        Ok(())
    }

    /// Snapshot of observed values across the graph
    pub fn node_values(&self) -> Vec<NodeValue> {
        self.registry.all_node_values()
    }

    /// Migrate every node's buffered traces to the store
    pub fn save_traces(&self) -> Result<()> {
        let max = self.config.trace.max_table_size;
        for node in self.registry.all_nodes() {
            let mut node = node.write();
            if node.tracer().is_err() {
                continue;
            }
            node.save_traces(max)?;
        }
        Ok(())
    }
}
