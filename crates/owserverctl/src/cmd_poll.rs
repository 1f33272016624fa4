use anyhow::{Context, Result};
use owserver::OwServerConfig;

use crate::common;

/// One-shot poll. With `values_only` the current values are printed without
/// publishing descriptions.
pub async fn run(config: OwServerConfig, values_only: bool) -> Result<()> {
    let binding = common::binding(config)?;
    if values_only {
        let values = binding.poll_values().await.context("poll values")?;
        return common::print_json(&values);
    }
    binding.poll().await.context("poll gateway")?;
    Ok(())
}
