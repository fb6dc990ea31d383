//! minikv server binary
//!
//! Parses flags, sets up logging, and runs the server until Ctrl+C or
//! SIGTERM.

use clap::Parser;
use minikv::{Config, Server};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// In-memory key-value server
#[derive(Parser, Debug)]
#[command(name = "minikv")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "0.0.0.0:6379")]
    listen: String,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Maximum concurrent client connections
    #[arg(short, long, default_value_t = 100)]
    max_clients: usize,

    /// Interval between expiry sweeps, in milliseconds
    #[arg(long, default_value_t = 1000)]
    sweep_interval_ms: u64,

    /// Drop clients idle for this many seconds (0 = never)
    #[arg(long, default_value_t = 0)]
    read_timeout_secs: u64,

    /// Give up on a reply after this many seconds (0 = never)
    #[arg(long, default_value_t = 0)]
    write_timeout_secs: u64,
}

impl Args {
    fn into_config(self) -> Config {
        let secs = |n: u64| (n > 0).then(|| Duration::from_secs(n));

        Config::builder()
            .addr(self.listen)
            .log_level(self.log_level)
            .max_clients(self.max_clients)
            .sweep_interval(Duration::from_millis(self.sweep_interval_ms.max(1)))
            .read_timeout(secs(self.read_timeout_secs))
            .write_timeout(secs(self.write_timeout_secs))
            .build()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    fmt().with_env_filter(filter).with_target(false).init();

    info!("minikv v{}", minikv::VERSION);

    let server = Server::bind(config).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(forward_signals(shutdown.clone()));

    server.run(shutdown).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Cancels `shutdown` on the first Ctrl+C or SIGTERM.
async fn forward_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
