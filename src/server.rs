//! TCP server that accepts client connections and spawns handler tasks.
//!
//! ## States
//!
//! ```text
//! Listening ──(shutdown token cancelled)──> Draining ──(all sessions done)──> Stopped
//! ```
//!
//! - **Listening**: every accept first takes a permit from the admission
//!   semaphore. When all `max_clients` permits are out, the loop waits for a
//!   session to end; clients are never turned away.
//! - **Draining**: the listener is closed and the loop waits until every
//!   permit has been returned. Running sessions are not interrupted; they end
//!   when their client disconnects.
//! - **Stopped**: the expiry sweeper is stopped and [`Server::run`] returns.
//!
//! Both waits in the accept loop race the shutdown token, so cancellation is
//! noticed immediately rather than on the next accepted connection.

use crate::commands::CommandHandler;
use crate::config::{Config, MAX_CLIENTS_LIMIT};
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::{ExpirySweeper, Store};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors that prevent the server from starting or keep it from running.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A bound server, ready to [`run`](Server::run).
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    config: Config,
    store: Arc<Store>,
    stats: Arc<ConnectionStats>,
    sweeper: ExpirySweeper,
}

impl Server {
    /// Binds the listening socket, creates the store and starts its expiry
    /// sweeper.
    ///
    /// Failing to bind is the only fatal startup error.
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.addr.clone(),
                source,
            })?;

        let store = Arc::new(Store::new());
        let sweeper = ExpirySweeper::start(Arc::clone(&store), config.sweep_interval);

        Ok(Self {
            listener,
            config,
            store,
            stats: Arc::new(ConnectionStats::new()),
            sweeper,
        })
    }

    /// The address the listener is bound to (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The store shared by all sessions.
    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Runs the accept loop until `shutdown` is cancelled, then waits for
    /// every open session to finish.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let Server {
            listener,
            config,
            store,
            stats,
            sweeper,
        } = self;

        let max_clients = config.max_clients.clamp(1, MAX_CLIENTS_LIMIT);
        let semaphore = Arc::new(Semaphore::new(max_clients));
        let handler = CommandHandler::new(store);
        let timeouts = config.timeouts();

        info!(
            addr = %listener.local_addr()?,
            max_clients = max_clients,
            "Server started"
        );

        loop {
            let permit = tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    // the semaphore is never closed
                    Err(_) => break,
                },
            };

            let (stream, peer) = tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                result = listener.accept() => match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            debug!(client = %peer, "Accepted connection");

            let handler = handler.clone();
            let stats = Arc::clone(&stats);

            tokio::spawn(async move {
                handle_connection(stream, peer, handler, timeouts, stats).await;
                // returning the slot on every exit path
                drop(permit);
            });
        }

        info!("Shutdown signal received, closing listener");
        drop(listener);

        info!(
            active = stats.active_connections.load(Ordering::Relaxed),
            "Waiting for active clients to disconnect"
        );
        let permits = u32::try_from(max_clients).unwrap_or(u32::MAX);
        let _drained = semaphore.acquire_many(permits).await;

        sweeper.stop();
        info!("All connections drained, server stopped");

        Ok(())
    }
}
