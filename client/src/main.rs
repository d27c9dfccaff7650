use clap::Parser;
use client::config::ClientConfig;
use client::runner::{HeadlessClient, RunnerOptions};
use log::info;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file; command line flags override it
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Server WebSocket URL
    #[arg(short = 'u', long)]
    url: Option<String>,

    /// Simulate inbound network latency in milliseconds
    #[arg(short = 'l', long)]
    fake_ping: Option<i64>,

    /// Simulation ticks per second
    #[arg(short = 't', long, default_value = "60")]
    tick_rate: u32,

    /// Constrained (mobile) host: heartbeat more often
    #[arg(long)]
    constrained: bool,

    /// Drive the player with random input
    #[arg(short = 'b', long)]
    bot: bool,

    /// Display name sent with every input
    #[arg(short = 'n', long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    if let Some(url) = args.url {
        config.url = url;
    }
    if let Some(fake_ping) = args.fake_ping {
        config.latency_ms = fake_ping;
    }
    if args.constrained {
        config.connection.constrained = true;
    }
    if args.name.is_some() {
        config.display_name = args.name;
    }
    config.validate()?;

    info!("Starting client...");
    info!("Connecting to: {}", config.url);
    if config.latency_ms > 0 {
        info!("Simulating {}ms latency", config.latency_ms);
    }
    if args.bot {
        info!("Bot input enabled");
    }

    let mut client = HeadlessClient::new(
        config,
        RunnerOptions {
            tick_rate: args.tick_rate,
            bot: args.bot,
        },
    );

    client.run().await?;

    Ok(())
}
