//! Reactive demo driver
//!
//! Usage: `reactive-demo [config.json]`
//!
//! Wires `constant(c1) -> math-scale(s1)`, rewires the scale node to a second
//! constant while the graph is live, then saves every node's traces and
//! prints the observed port values as JSON.

mod nodes;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reactive_graph::{Connection, Node, PortHolder, Result, Runtime, RuntimeConfig, SharedMessage};
use tokio::sync::broadcast;

use crate::nodes::{ConstantNode, ScaleNode};

const SETTLE: Duration = Duration::from_secs(2);

/// Wait until the live view shows a message from `uuid`
async fn next_from(
    live: Option<&mut broadcast::Receiver<SharedMessage>>,
    uuid: &str,
) -> Option<SharedMessage> {
    let Some(live) = live else {
        tokio::time::sleep(Duration::from_millis(100)).await;
        return None;
    };
    let wait = async {
        loop {
            match live.recv().await {
                Ok(message) if message.node_uuid == uuid => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("Live view lagged by {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    };
    tokio::time::timeout(SETTLE, wait).await.ok().flatten()
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_filter))
        .format_timestamp_millis()
        .init();

    log::info!("Reactive demo starting...");

    let runtime = Runtime::new(config)?;
    let mut live = runtime.subscribe_live_view();

    let first = Arc::new(RwLock::new(ConstantNode::new(&runtime, "c1", 21.5)?));
    let second = Arc::new(RwLock::new(ConstantNode::new(&runtime, "c2", 10.0)?));
    runtime.registry().add(first.clone());
    runtime.registry().add(second.clone());

    let mut scale = ScaleNode::new(&runtime, "s1", 2.0)?;
    scale.add_connection(Connection::new("c1", "out", "s1", "in"));
    let scale = runtime.register(scale);
    runtime.start_all()?;

    first.write().emit()?;
    match next_from(live.as_mut(), "s1").await {
        Some(message) => log::info!("s1 published {:?}", message.port.value),
        None => log::warn!("No output from s1"),
    }

    log::info!("Rewiring s1 from c1 to c2");
    scale
        .write()
        .update_connections(vec![Connection::new("c2", "out", "s1", "in")]);

    first.write().emit()?;
    second.write().emit()?;
    match next_from(live.as_mut(), "s1").await {
        Some(message) => log::info!("s1 published {:?}", message.port.value),
        None => log::warn!("No output from s1"),
    }

    runtime.save_traces()?;
    println!("{}", serde_json::to_string_pretty(&runtime.node_values())?);

    scale.write().delete()?;
    log::info!("Reactive demo finished");
    Ok(())
}
