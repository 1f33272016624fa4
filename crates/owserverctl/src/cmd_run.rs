use anyhow::{Context, Result};
use owserver::OwServerConfig;
use tracing::info;

use crate::common;

/// Run the binding until interrupted.
pub async fn run(config: OwServerConfig) -> Result<()> {
    let binding = common::binding(config)?;
    binding.start().await.context("start binding")?;
    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("interrupted, stopping");
    binding.stop().await;
    Ok(())
}
