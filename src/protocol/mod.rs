//! Wire Protocol Codec
//!
//! This module implements the subset of the Redis Serialization Protocol (RESP)
//! that minikv speaks.
//!
//! ## Overview
//!
//! Clients send every request as an array of bulk strings. The server answers
//! with exactly one reply per request, in one of five shapes: simple string,
//! error, integer, bulk string (possibly nil), or an array of bulk strings.
//!
//! ## Modules
//!
//! - `types`: Defines the `Reply` enum and its wire encoding
//! - `parser`: Incremental decoder for inbound request frames
//!
//! ## Example
//!
//! ```
//! use minikv::protocol::{encode_request, parse_request, Reply};
//!
//! // Decoding an inbound request
//! let frame = encode_request(&["GET", "name"]);
//! let (args, consumed) = parse_request(&frame).unwrap().unwrap();
//! assert_eq!(args, vec!["GET", "name"]);
//! assert_eq!(consumed, frame.len());
//!
//! // Encoding a reply
//! let reply = Reply::bulk("Ariz");
//! assert_eq!(&reply.encode()[..], b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{encode_request, parse_request, FrameError, FrameResult, RequestParser};
pub use types::Reply;
