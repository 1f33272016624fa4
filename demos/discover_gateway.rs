use std::error::Error;
use std::time::{Duration, Instant};

use eds_core::NodeExtractor;
use tl_eds::{EdsClient, EdsConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let timeout = Duration::from_secs(3);
    let ip = tl_eds::discover(timeout).await?;
    println!("Gateway answered from {ip}");

    let client = EdsClient::new(EdsConfig {
        address: ip.to_string(),
        login: std::env::var("OWSERVER_LOGIN").unwrap_or_default(),
        password: std::env::var("OWSERVER_PASSWORD").unwrap_or_default(),
        ..EdsConfig::default()
    })?;
    let started = Instant::now();
    let root = eds_xml::parse_document(&client.read_raw().await?)?;
    let nodes = NodeExtractor::default().extract(&root, started.elapsed());
    for node in nodes {
        println!(
            "{:<12} {:<20} {} attributes",
            node.device_type,
            node.node_id,
            node.attributes.len()
        );
    }
    Ok(())
}
