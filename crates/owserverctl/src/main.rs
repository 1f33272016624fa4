use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use owserverctl::cmd_discover;
use owserverctl::cmd_dump;
use owserverctl::cmd_poll;
use owserverctl::cmd_run;
use owserverctl::cmd_write;
use owserverctl::common::{self, GatewayOverrides};

#[derive(Parser, Debug)]
#[command(name = "owserverctl", version, about = "EDS OWServer CLI")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Output JSON where applicable
    #[arg(long)]
    json: bool,
    /// JSON configuration file
    #[arg(long, env = "OWSERVER_CONFIG")]
    config: Option<PathBuf>,
    #[command(flatten)]
    gateway: GatewayArgs,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args, Debug)]
struct GatewayArgs {
    /// Gateway host, URL or file:// path; discovered when omitted
    #[arg(long, env = "OWSERVER_ADDRESS", global = true)]
    address: Option<String>,
    #[arg(long, env = "OWSERVER_LOGIN", global = true)]
    login: Option<String>,
    #[arg(long, env = "OWSERVER_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Locate the gateway (UDP broadcast)
    Discover {
        #[arg(long, default_value_t = 3000)]
        timeout_ms: u64,
    },
    /// Print the device nodes of the gateway document
    Dump,
    /// Poll once and print descriptions and values as JSON lines
    Poll {
        /// Print current values only
        #[arg(long)]
        values: bool,
    },
    /// Write a device property
    Write {
        #[arg(long)]
        node: String,
        #[arg(long)]
        property: String,
        #[arg(long)]
        value: String,
        /// Return without waiting for the verification polls
        #[arg(long)]
        no_wait: bool,
    },
    /// Run the poll/publish loop until ctrl-c
    Run {
        #[arg(long)]
        td_interval: Option<u64>,
        #[arg(long)]
        value_interval: Option<u64>,
        /// Also publish the binding's own description
        #[arg(long)]
        publish_td: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        verbose,
        json,
        config,
        gateway,
        cmd,
    } = Cli::parse();

    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.into()),
        ))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let overrides = GatewayOverrides {
        address: gateway.address,
        login: gateway.login,
        password: gateway.password,
    };
    let mut config = common::load_config(config.as_deref(), &overrides)?;

    match cmd {
        Cmd::Discover { timeout_ms } => cmd_discover::run(timeout_ms, json).await?,
        Cmd::Dump => cmd_dump::run(&config, json).await?,
        Cmd::Poll { values } => cmd_poll::run(config, values).await?,
        Cmd::Write {
            node,
            property,
            value,
            no_wait,
        } => cmd_write::run(config, node, property, value, no_wait).await?,
        Cmd::Run {
            td_interval,
            value_interval,
            publish_td,
        } => {
            if let Some(secs) = td_interval {
                config.td_interval = secs;
            }
            if let Some(secs) = value_interval {
                config.value_interval = secs;
            }
            config.publish_td |= publish_td;
            cmd_run::run(config.normalized()).await?
        }
    };

    Ok(())
}
