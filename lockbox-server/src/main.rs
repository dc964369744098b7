//! Lockbox sync server binary.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lockbox_server::{build_router, ServerConfig, Storage};

#[derive(Parser)]
#[command(name = "lockbox-server", about = "Lockbox sync server")]
struct Cli {
    /// Listen address override (host:port)
    #[arg(short, long)]
    listen: Option<String>,

    /// Database path override
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut cfg = ServerConfig::from_env();
    if let Some(listen) = cli.listen {
        cfg.base_url = listen;
    }
    if let Some(database) = cli.database {
        cfg.database_uri = database.display().to_string();
    }

    tracing::info!(
        addr = %cfg.base_url,
        database = %cfg.database_uri,
        https = cfg.enable_https,
        blob_max_mb = cfg.blob_max_mb,
        "starting lockbox server"
    );

    let storage = Storage::open(std::path::Path::new(&cfg.database_uri))?;
    let app = build_router(storage, cfg.clone());

    let listener = tokio::net::TcpListener::bind(&cfg.base_url).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown handler");
        return;
    }
    tracing::info!("shutting down");
}
