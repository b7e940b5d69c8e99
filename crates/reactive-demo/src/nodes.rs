//! Demo node types
//!
//! `constant` emits its configured number; `math-scale` multiplies every
//! value arriving on `in` by its configured factor and publishes it on `out`.

use reactive_graph::{
    BaseNode, Node, NodeCore, NodeInfo, NodeOptions, Port, PortDataType, PortValue, Result, Runtime,
    Settings, Traceable,
};
use reactive_tracer::TraceLevel;
use tokio::task::JoinHandle;

const PLUGIN: &str = "core";
const APPLICATION: &str = "reactive-demo";

fn info(node_id: &str, uuid: &str) -> NodeInfo {
    NodeInfo::new(node_id)
        .with_uuid(uuid)
        .with_plugin(PLUGIN)
        .with_application(APPLICATION)
}

pub struct ConstantNode {
    base: BaseNode,
}

impl ConstantNode {
    pub const NODE_ID: &'static str = "constant";

    pub fn new(runtime: &Runtime, uuid: &str, value: f64) -> Result<Self> {
        let mut base = runtime.new_node(info(Self::NODE_ID, uuid), NodeOptions::default())?;
        base.new_output_port(Port::output("out", "Out", PortDataType::Float));
        base.add_settings(Settings::new(serde_json::json!(value)));
        Ok(Self { base })
    }

    /// Publish the configured value
    pub fn emit(&mut self) -> Result<()> {
        let value = self.base.settings().map(Settings::float_value).unwrap_or_default();
        self.base.publish_message(
            Port::output("out", "Out", PortDataType::Float).with_value(value),
            true,
        )?;
        if self.tracer().is_ok() {
            self.trace(TraceLevel::Debug, format!("emitted {}", value))?;
        }
        Ok(())
    }
}

impl NodeCore for ConstantNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseNode {
        &mut self.base
    }
}

impl Node for ConstantNode {}

pub struct ScaleNode {
    base: BaseNode,
    task: Option<JoinHandle<()>>,
}

impl ScaleNode {
    pub const NODE_ID: &'static str = "math-scale";

    pub fn new(runtime: &Runtime, uuid: &str, factor: f64) -> Result<Self> {
        let mut base = runtime.new_node(info(Self::NODE_ID, uuid), NodeOptions::default())?;
        base.new_input_port(Port::input("in", "In", PortDataType::Float));
        base.new_output_port(Port::output("out", "Out", PortDataType::Float));
        base.add_settings(Settings::new(serde_json::json!(factor)));
        Ok(Self { base, task: None })
    }
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
    fn start(&mut self) -> Result<()> {
        let factor = self.base.settings().map(Settings::float_value).unwrap_or(1.0);
        let mut input = self.base.take_input("in")?;
        let publisher = self.base.publisher();
        let uuid = self.base.uuid().to_string();

        self.task = Some(tokio::spawn(async move {
            while let Some(message) = input.recv().await {
                let Some(value) = message.port.value.as_ref().and_then(PortValue::as_f64) else {
                    log::warn!("{} ignored non-numeric input from {}", uuid, message.node_uuid);
                    continue;
                };
                if let Err(e) =
                    publisher.publish_value("out", "Out", PortDataType::Float, value * factor)
                {
                    log::warn!("{} failed to publish: {}", uuid, e);
                }
            }
        }));

        self.base.set_loaded(true);
        if self.tracer().is_ok() {
            self.trace(TraceLevel::Info, format!("scaling by {}", factor))?;
        }
        Ok(())
    }

    fn delete(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.base.teardown();
        Ok(())
    }
}
