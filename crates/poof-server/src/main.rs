//! Poof server binary.
//!
//! # Usage
//!
//! ```bash
//! # Volatile store (secrets lost on restart)
//! poof-server --bind 0.0.0.0:5000
//!
//! # Durable store
//! poof-server --bind 0.0.0.0:5000 --persist /var/lib/poof/secrets.redb
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use poof_server::{Server, ServerConfig, StoreConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Burn-after-reading secret server
#[derive(Parser, Debug)]
#[command(name = "poof-server")]
#[command(about = "Burn-after-reading secret server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:5000")]
    bind: String,

    /// Path to the durable store file; omit for a volatile store
    #[arg(short, long)]
    persist: Option<PathBuf>,

    /// Maximum HTTP request body in bytes
    #[arg(long, default_value = "51200")]
    max_http_size: usize,

    /// Maximum number of live secrets (0 = unlimited)
    #[arg(long, default_value = "1048576")]
    max_secrets: u64,

    /// Seconds between expiry sweeps of the durable store
    #[arg(long, default_value = "10")]
    sweep_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Poof server starting");
    tracing::info!("Binding to {}", args.bind);

    if args.sweep_interval_secs == 0 {
        return Err("--sweep-interval-secs must be at least 1".into());
    }

    let config = ServerConfig {
        bind_address: args.bind,
        persist: args.persist,
        max_body_bytes: args.max_http_size,
        store: StoreConfig {
            capacity: args.max_secrets,
            sweep_interval: Duration::from_secs(args.sweep_interval_secs),
        },
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
