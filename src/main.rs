//! matchline-server - matchmaking and chat-relay daemon

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;

use matchline::config::Config;
use matchline::server::ServerListener;

#[derive(Parser)]
#[command(name = "matchline-server")]
#[command(about = "Anonymous user/moderator matchmaking and chat-relay server")]
#[command(version)]
struct Cli {
    /// Socket path override
    #[arg(long)]
    socket: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::load()?;
    let socket_path = cli.socket.unwrap_or_else(|| config.socket_path());

    let listener = ServerListener::new(config, socket_path);

    // Forward ctrl-c into the listener's shutdown channel
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    listener.run(shutdown_rx).await
}
