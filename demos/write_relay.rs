use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use owserver::vocab::names;
use owserver::{MemoryPublisher, OwServerBinding, OwServerConfig, SimulatedGateway};
use tokio::time::Instant;

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/owserver-details.xml");
const MULTISENSOR: &str = "A10000003C6E177E";

async fn relay(binding: &OwServerBinding) -> Result<String, Box<dyn Error>> {
    let values = binding.poll_values().await?;
    let relay = values
        .iter()
        .find(|(id, _)| id.contains(MULTISENSOR))
        .and_then(|(_, values)| values.get(names::RELAY))
        .cloned()
        .ok_or("multisensor relay not found")?;
    Ok(relay)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let gateway = Arc::new(SimulatedGateway::from_file(FIXTURE).await?);
    let publisher = Arc::new(MemoryPublisher::default());
    let binding = OwServerBinding::new(OwServerConfig::default(), publisher.clone())
        .with_gateway(gateway);
    binding.poll().await?;
    println!("relay before write: {}", relay(&binding).await?);

    binding
        .write_property(MULTISENSOR, names::RELAY, "true")
        .await?;
    println!("relay right after write: {}", relay(&binding).await?);

    let ran = binding
        .run_due_verifications(Instant::now() + Duration::from_secs(5))
        .await;
    println!("ran {ran} verification polls");
    println!("relay after verification: {}", relay(&binding).await?);
    Ok(())
}
