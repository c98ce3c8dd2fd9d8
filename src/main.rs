use clap::Parser;
use docstream::{MemoryDatabase, ServerConfig, StreamServer, WireFormat};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "docstream")]
#[command(about = "Multiplexed stream server for in-memory document databases", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind
    #[arg(long)]
    host: Option<String>,

    /// Create an in-memory database (repeatable, e.g. --database users --database orders)
    #[arg(long = "database")]
    databases: Vec<String>,

    /// Refuse every write method
    #[arg(long)]
    read_only: bool,

    /// Frame payload encoding
    #[arg(long)]
    format: Option<WireFormat>,

    /// Answer `timeout` when a handler runs longer than this
    #[arg(long)]
    request_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docstream=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ServerConfig::load(args.config.as_deref())?;
    config.apply_env()?;
    apply_args(&mut config, args);

    let server = Arc::new(StreamServer::new(config.to_options())?);
    for name in &config.databases {
        server.dbs().add(name.as_str(), MemoryDatabase::handle(name.as_str()));
        tracing::info!("Created in-memory database '{}'", name);
    }
    if config.read_only {
        tracing::info!("Write methods are refused (read-only)");
    }

    // Frames with an empty database name go to the first configured database
    let default_db = config.databases.first().cloned().unwrap_or_default();

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    server
        .serve_with_shutdown(listener, &default_db, shutdown_signal())
        .await?;

    Ok(())
}

fn apply_args(config: &mut ServerConfig, args: Args) {
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(format) = args.format {
        config.format = format;
    }
    if let Some(ms) = args.request_timeout_ms {
        config.request_timeout_ms = Some(ms);
    }
    if args.read_only {
        config.read_only = true;
    }
    for name in args.databases {
        if !config.databases.contains(&name) {
            config.databases.push(name);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
