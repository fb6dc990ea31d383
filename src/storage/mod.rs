//! Storage Module
//!
//! This module provides the shared in-memory store and the background task
//! that enforces key expiration.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                   Store                     │
//! │   RwLock { values, expirations }            │
//! └─────────────────────────────────────────────┘
//!                        ▲
//!                        │ purge_expired() every tick
//!              ┌─────────┴─────────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use minikv::storage::Store;
//! use bytes::Bytes;
//!
//! let store = Store::new();
//! store.set(Bytes::from("name"), Bytes::from("Ariz"));
//! assert_eq!(store.del(&[Bytes::from("name"), Bytes::from("other")]), 1);
//! ```

pub mod engine;
pub mod expiry;

// Re-export commonly used types
pub use engine::{Store, TTL_MISSING, TTL_PERSISTENT};
pub use expiry::{ExpirySweeper, DEFAULT_SWEEP_INTERVAL};
