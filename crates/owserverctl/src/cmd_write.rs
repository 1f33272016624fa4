use anyhow::{Context, Result};
use owserver::OwServerConfig;
use tokio::time::{self, Instant};
use tracing::info;

use crate::common;

/// Write a property, then wait for the verification polls unless `no_wait`.
pub async fn run(
    config: OwServerConfig,
    node: String,
    property: String,
    value: String,
    no_wait: bool,
) -> Result<()> {
    let delays = config.verify_delays();
    let binding = common::binding(config)?;
    binding
        .refresh_descriptions()
        .await
        .context("register devices")?;
    binding
        .write_property(&node, &property, &value)
        .await
        .with_context(|| format!("write {property} of {node}"))?;
    info!(%node, %property, %value, "write accepted");
    if no_wait {
        return Ok(());
    }

    let mut delays = delays;
    delays.sort();
    let start = Instant::now();
    for delay in delays {
        time::sleep_until(start + delay).await;
        binding.run_due_verifications(Instant::now()).await;
    }
    Ok(())
}
