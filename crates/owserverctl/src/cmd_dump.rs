use std::time::Instant;

use anyhow::{Context, Result};
use eds_core::NodeExtractor;
use owserver::OwServerConfig;

use crate::common;

/// Fetch the document once and print the extracted device nodes.
pub async fn run(config: &OwServerConfig, json: bool) -> Result<()> {
    let client = common::client(config)?;
    let started = Instant::now();
    let root = client.read_document().await.context("read gateway document")?;
    let nodes = NodeExtractor::default().extract(&root, started.elapsed());

    if json {
        return common::print_json(&nodes);
    }

    println!("gateway {}", client.last_address());
    for node in &nodes {
        println!(
            "{:<12} {:<20} {} ({})",
            node.device_type, node.node_id, node.name, node.description
        );
        for attr in node.attributes.values() {
            let marker = match (attr.is_sensor, attr.writable) {
                (true, true) => "sensor, writable",
                (true, false) => "sensor",
                (false, true) => "writable",
                (false, false) => "",
            };
            println!(
                "    {:<28} {:>12} {:<6} {}",
                attr.name, attr.value, attr.unit, marker
            );
        }
    }
    Ok(())
}
