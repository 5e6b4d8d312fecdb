//! SetuIO demo - beacon a line endpoint and log what comes back
//!
//! ```text
//! setu-io --address 127.0.0.1:2000 --frequency 2 --payload ping
//! ```
//!
//! Runs until Ctrl-C, then closes the session.

use clap::Parser;
use setu_io::{Channel, EventPacket, LineEndpoint, Message, SessionConfig};
use std::path::PathBuf;
use std::sync::Arc;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "setu-io", version, about = "Line-oriented device session demo")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Endpoint address as host:port (overrides the config file)
    #[arg(short, long)]
    address: Option<String>,

    /// Beacon messages per second
    #[arg(short, long, default_value_t = 1.0)]
    frequency: f64,

    /// Beacon payload
    #[arg(short, long, default_value = "ping")]
    payload: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Using config: {}", path.display());
            SessionConfig::from_file(path)?
        }
        None => SessionConfig::default(),
    };
    if let Some(address) = args.address {
        config.address = address;
    }

    let endpoint = Arc::new(LineEndpoint::new(config.clone())?);
    endpoint.subscribe(
        "console",
        |pkt: &EventPacket<Message>| {
            log::info!("{} <- {}", pkt.event, pkt.payload.trimmed());
            Ok(())
        },
        Channel::Rx,
        None,
    );

    endpoint.open(&config)?;

    let closer = Arc::clone(&endpoint);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        closer.close();
    })?;

    let sent = endpoint.beacon(args.frequency, args.payload)?;
    endpoint.close();
    log::info!("Sent {} beacon messages", sent);
    Ok(())
}
