use std::env;
use std::error::Error;
use std::sync::Arc;

use owserver::{MemoryPublisher, OwServerBinding, OwServerConfig, SimulatedGateway};

const DEFAULT_FIXTURE: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/fixtures/owserver-details.xml"
);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    let path = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_FIXTURE.to_string());

    let gateway = Arc::new(SimulatedGateway::from_file(&path).await?);
    let publisher = Arc::new(MemoryPublisher::default());
    let binding = OwServerBinding::new(OwServerConfig::default(), publisher.clone())
        .with_gateway(gateway);
    binding.poll().await?;

    for td in publisher.descriptions() {
        println!(
            "{:<56} {:>2} properties {:>2} events {:>2} actions",
            td.id,
            td.properties.len(),
            td.events.len(),
            td.actions.len()
        );
    }
    for (thing_id, values) in publisher.value_batches() {
        println!("{thing_id}");
        println!("{}", serde_json::to_string_pretty(&values)?);
    }
    Ok(())
}
