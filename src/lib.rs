//! # minikv - A Small In-Memory Key-Value Server
//!
//! minikv is a single-node, in-memory string store that speaks a subset of
//! the Redis wire protocol (RESP) over TCP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             minikv                               │
//! │                                                                  │
//! │  ┌─────────────┐    ┌──────────────┐    ┌────────────────┐       │
//! │  │   Server    │───>│  Connection  │───>│ CommandHandler │       │
//! │  │ accept loop │    │   Handler    │    └───────┬────────┘       │
//! │  │ + admission │    │ parse/write  │            │                │
//! │  └─────────────┘    └──────────────┘            ▼                │
//! │                                       ┌────────────────────┐     │
//! │                                       │       Store        │     │
//! │                                       │ RwLock{values,ttl} │     │
//! │                                       └────────────────────┘     │
//! │                                                 ▲                │
//! │                                       ┌─────────┴──────────┐     │
//! │                                       │   ExpirySweeper    │     │
//! │                                       └────────────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use minikv::{Config, Server};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::bind(Config::default()).await?;
//!     let shutdown = CancellationToken::new();
//!
//!     let trigger = shutdown.clone();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         trigger.cancel();
//!     });
//!
//!     server.run(shutdown).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! `PING`, `ECHO`, `SET`, `GET`, `DEL`, `MGET`, `EXPIRE`, `TTL`.
//!
//! ## Module Overview
//!
//! - [`protocol`]: request decoding and reply encoding
//! - [`storage`]: the shared store and its expiry sweeper
//! - [`commands`]: command dispatch
//! - [`connection`]: per-client session loop
//! - [`server`]: accept loop, admission control and graceful shutdown
//! - [`config`]: runtime settings

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{Config, DEFAULT_PORT};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{FrameError, Reply, RequestParser};
pub use server::{Server, ServerError};
pub use storage::{ExpirySweeper, Store};

/// Version of minikv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
