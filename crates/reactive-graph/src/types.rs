//! Core types for reactive node graphs
//!
//! These types define ports, the values that flow through them, the wiring
//! records between nodes, and node metadata. Field names on the serialized
//! shapes are part of the on-wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier of a node instance
pub type NodeUuid = String;

/// Identifier of a port, unique within one direction of one node
pub type PortId = String;

/// The data kind a port declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDataType {
    /// Accepts any value
    #[default]
    Any,
    /// Numeric value
    Float,
    /// Text string
    String,
    /// Boolean value
    Bool,
}

impl PortDataType {
    /// Check whether a value may be written to a port of this kind
    pub fn accepts(&self, value: &PortValue) -> bool {
        match self {
            PortDataType::Any => true,
            PortDataType::Float => matches!(value, PortValue::Float(_) | PortValue::Int(_)),
            PortDataType::String => matches!(value, PortValue::String(_)),
            PortDataType::Bool => matches!(value, PortValue::Bool(_)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PortDataType::Any => "any",
            PortDataType::Float => "float",
            PortDataType::String => "string",
            PortDataType::Bool => "bool",
        }
    }
}

/// A value carried by a port
///
/// Serialized as the bare JSON value. Integers deserialize as `Int`,
/// other numbers as `Float`; anything that is not a scalar stays `Raw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Raw(serde_json::Value),
}

impl PortValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PortValue::Float(v) => Some(*v),
            PortValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PortValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PortValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            PortValue::Bool(_) => "bool",
            PortValue::Int(_) => "int",
            PortValue::Float(_) => "float",
            PortValue::String(_) => "string",
            PortValue::Raw(_) => "raw",
        }
    }
}

impl std::fmt::Display for PortValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortValue::Bool(v) => write!(f, "{}", v),
            PortValue::Int(v) => write!(f, "{}", v),
            PortValue::Float(v) => write!(f, "{}", v),
            PortValue::String(v) => f.write_str(v),
            PortValue::Raw(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for PortValue {
    fn from(v: f64) -> Self {
        PortValue::Float(v)
    }
}

impl From<i64> for PortValue {
    fn from(v: i64) -> Self {
        PortValue::Int(v)
    }
}

impl From<bool> for PortValue {
    fn from(v: bool) -> Self {
        PortValue::Bool(v)
    }
}

impl From<&str> for PortValue {
    fn from(v: &str) -> Self {
        PortValue::String(v.to_string())
    }
}

impl From<String> for PortValue {
    fn from(v: String) -> Self {
        PortValue::String(v)
    }
}

/// Whether a port receives or produces values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

/// A typed, named data slot on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub id: PortId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<PortValue>,
    /// Last time the port got a value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    pub direction: PortDirection,
    pub data_type: PortDataType,
}

impl Port {
    /// Create an input port with no value
    pub fn input(id: impl Into<String>, name: impl Into<String>, data_type: PortDataType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value: None,
            last_updated: None,
            direction: PortDirection::Input,
            data_type,
        }
    }

    /// Create an output port with no value
    pub fn output(id: impl Into<String>, name: impl Into<String>, data_type: PortDataType) -> Self {
        Self {
            direction: PortDirection::Output,
            ..Self::input(id, name, data_type)
        }
    }

    /// Set the carried value (builder style)
    pub fn with_value(mut self, value: impl Into<PortValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Check the carried value against the declared data kind
    pub fn validate(&self) -> crate::Result<()> {
        match &self.value {
            Some(value) if !self.data_type.accepts(value) => {
                Err(crate::ReactiveError::InvalidPortValue {
                    port: self.id.clone(),
                    expected: self.data_type.as_str().to_string(),
                    actual: value.kind().to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Role of a wire relative to the node holding it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowDirection {
    /// The wire feeds one of the holder's inputs
    #[default]
    Subscriber,
    /// The wire leaves one of the holder's outputs
    Publisher,
}

/// One directed wire from a source output port to a target input port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    #[serde(rename = "source")]
    pub source_uuid: NodeUuid,
    #[serde(rename = "sourceHandle")]
    pub source_port: PortId,
    #[serde(rename = "target")]
    pub target_uuid: NodeUuid,
    #[serde(rename = "targetHandle")]
    pub target_port: PortId,
    #[serde(rename = "flowDirection", default)]
    pub flow_direction: FlowDirection,
}

impl Connection {
    /// Create a subscriber wire
    pub fn new(
        source_uuid: impl Into<String>,
        source_port: impl Into<String>,
        target_uuid: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        Self {
            source_uuid: source_uuid.into(),
            source_port: source_port.into(),
            target_uuid: target_uuid.into(),
            target_port: target_port.into(),
            flow_direction: FlowDirection::Subscriber,
        }
    }

    /// Bus topic the wire listens on
    pub fn topic(&self) -> String {
        topic(&self.source_uuid, &self.source_port)
    }

    /// Check whether two records describe the same wire
    pub fn same_wire(&self, other: &Connection) -> bool {
        self.source_uuid == other.source_uuid
            && self.source_port == other.source_port
            && self.target_uuid == other.target_uuid
            && self.target_port == other.target_port
    }
}

/// Build the bus address for one output port of one node
pub fn topic(node_uuid: &str, port_id: &str) -> String {
    format!("{}-{}", node_uuid, port_id)
}

/// Canvas position of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub position_x: i32,
    pub position_y: i32,
}

/// Editor metadata of a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub position: Position,
    #[serde(rename = "parentUUID", default, skip_serializing_if = "Option::is_none")]
    pub parent_uuid: Option<NodeUuid>,
}

/// User settings of a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub value: serde_json::Value,
}

impl Settings {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Numeric setting, or 0 when absent or not a number
    pub fn float_value(&self) -> f64 {
        self.float_value_opt().unwrap_or(0.0)
    }

    pub fn float_value_opt(&self) -> Option<f64> {
        self.value.as_f64()
    }
}

/// Static description of what a node type supports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Details {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub has_db: bool,
    #[serde(default)]
    pub has_logger: bool,
}

/// Identity handed to the node constructor
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    /// Type name, e.g. `modbus-point`
    pub node_id: String,
    /// Instance UUID; generated when empty
    pub node_uuid: String,
    pub name: String,
    pub plugin_name: String,
    /// Application tag, e.g. `modbus-driver`
    pub application: String,
}

impl NodeInfo {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Default::default()
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.node_uuid = uuid.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_plugin(mut self, plugin_name: impl Into<String>) -> Self {
        self.plugin_name = plugin_name.into();
        self
    }

    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = application.into();
        self
    }
}

/// Optional construction settings for a node
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    pub meta: Option<Meta>,
}

/// Observed port values of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeValue {
    pub node_id: String,
    #[serde(rename = "nodeUUID")]
    pub node_uuid: NodeUuid,
    pub ports: Vec<Port>,
}
