//! Reactive Graph - a live dataflow runtime for typed node graphs
//!
//! Nodes expose typed input and output ports. Publishing an output value
//! sends it on the topic `{node_uuid}-{port_id}`; every input wired to that
//! output has its mailbox subscribed to the topic on the [`EventBus`].
//! Wiring can be changed while values flow with
//! [`BaseNode::update_connections`].
//!
//! # Architecture
//!
//! - [`EventBus`]: topic table with one delivery task per subscription
//! - [`BaseNode`]: identity, ports, last-value cache, inbound connections
//! - [`Node`]: lifecycle hooks on top of the port/trace/persistence traits
//! - [`RuntimeRegistry`]: owner of live nodes, backs graph-wide queries
//! - [`Runtime`]: driver glue creating nodes with bus, registry and tracer
//!
//! Per-node diagnostics come from the `reactive-tracer` crate.

pub mod bus;
pub mod children;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod events;
pub mod node;
pub mod registry;
pub mod runtime;
pub mod traits;
pub mod types;

pub use bus::{EventBus, PortMessage, Queue, SharedMessage};
pub use config::RuntimeConfig;
pub use error::{ReactiveError, Result};
pub use events::{BroadcastSink, EventError, NullSink, ObservationSink, VecSink};
pub use node::{node_uuid, BaseNode, InputReceiver, LastValues, Publisher};
pub use registry::{shared, RuntimeRegistry, SharedNode};
pub use runtime::Runtime;
pub use traits::{Node, NodeCore, Persistable, PortHolder, Traceable};
pub use types::{
    topic, Connection, Details, FlowDirection, Meta, NodeInfo, NodeOptions, NodeUuid, NodeValue,
    Port, PortDataType, PortDirection, PortId, PortValue, Position, Settings,
};

pub use reactive_tracer;
