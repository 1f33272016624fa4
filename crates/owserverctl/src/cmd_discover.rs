use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::common;

#[derive(Serialize)]
struct Found {
    address: String,
}

pub async fn run(timeout_ms: u64, json: bool) -> Result<()> {
    let timeout = Duration::from_millis(timeout_ms);
    let ip = tl_eds::discover(timeout)
        .await
        .context("broadcast discovery")?;
    info!(gateway = %ip, "discovered gateway");

    if json {
        return common::print_json(&Found {
            address: ip.to_string(),
        });
    }
    println!("OWServer gateway at {ip}");
    Ok(())
}
