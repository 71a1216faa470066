//! Caisse server binary
//!
//! Usage:
//!   caisse-server --db caisse.db --port 3000

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use caisse_core::Database;
use caisse_server::{serve_with_config, ServerConfig};

#[derive(Parser)]
#[command(name = "caisse-server", about = "REST API server for the Caisse personal finance tracker")]
struct Cli {
    /// Database file path
    #[arg(long, default_value = "caisse.db")]
    db: String,

    /// Host to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Use an unencrypted database (development only)
    #[arg(long)]
    no_encrypt: bool,

    /// Disable the owner header requirement (local development only)
    #[arg(long)]
    no_auth: bool,

    /// Comma-separated list of allowed CORS origins
    #[arg(long)]
    allowed_origins: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let db = if cli.no_encrypt {
        Database::new_unencrypted(&cli.db)?
    } else {
        Database::new(&cli.db)?
    };

    let config = ServerConfig {
        require_auth: !cli.no_auth,
        allowed_origins: cli
            .allowed_origins
            .as_deref()
            .map(|s| s.split(',').map(|o| o.trim().to_string()).collect())
            .unwrap_or_default(),
    };

    serve_with_config(db, &cli.host, cli.port, config).await
}
