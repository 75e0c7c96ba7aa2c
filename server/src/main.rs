use clap::Parser;
use log::info;
use server::accounts::MemoryAccountStore;
use server::config::ServerConfig;
use server::network::Server;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// IPv4 listen address as "ip, port"; replaces the configured list
    #[arg(long)]
    listen4: Vec<String>,

    /// IPv6 listen address as "ip, port"; replaces the configured list
    #[arg(long)]
    listen6: Vec<String>,

    /// Tick rate (updates per second)
    #[arg(short, long)]
    tick_rate: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if !args.listen4.is_empty() || !args.listen6.is_empty() {
        config.network.listen4 = args.listen4;
        config.network.listen6 = args.listen6;
    }
    if let Some(tick_rate) = args.tick_rate {
        config.tick_rate = tick_rate;
    }

    info!("Starting server at {} Hz", config.tick_rate);

    let mut server = Server::bind(&config, Box::new(MemoryAccountStore::new())).await?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            shutdown.shutdown();
        }
    });

    server.run().await;

    Ok(())
}
