use clap::Parser;
use log::info;
use server::bots::BotConfig;
use server::network::{Server, ServerConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Maximum number of connected players
    #[arg(short, long, default_value = "16")]
    max_players: usize,

    /// Players needed before the round starts
    #[arg(long, default_value = "2")]
    min_players: usize,

    /// Number of bot riders to spawn
    #[arg(short, long, default_value = "0")]
    bots: usize,

    /// Spawn bots without light trails
    #[arg(long)]
    no_bot_trails: bool,

    /// Bot updates per second
    #[arg(short, long, default_value = "20")]
    tick_rate: u32,

    /// Seconds of silence before a connection is dropped
    #[arg(long, default_value = "120")]
    idle_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let config = ServerConfig {
        max_players: args.max_players,
        min_players: args.min_players,
        tick_duration: Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64),
        idle_timeout: Duration::from_secs(args.idle_timeout),
        bots: BotConfig {
            count: args.bots,
            enable_trails: !args.no_bot_trails,
            ..BotConfig::default()
        },
        ..ServerConfig::default()
    };

    info!("Starting relay on {} ({} bots)", addr, args.bots);
    let server = Server::bind(&addr, config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
