//! Reply Types
//!
//! Every command produces exactly one [`Reply`]. The enum is closed: each
//! variant carries the one payload shape its wire form needs, so a reply can
//! never disagree with its own type tag.
//!
//! ## Wire Format
//!
//! | Reply            | Bytes                        |
//! |------------------|------------------------------|
//! | `Simple("OK")`   | `+OK\r\n`                    |
//! | `Error("ERR x")` | `-ERR x\r\n`                 |
//! | `Integer(42)`    | `:42\r\n`                    |
//! | `Bulk(None)`     | `$-1\r\n`                    |
//! | `Bulk(Some(v))`  | `$<len>\r\n<v>\r\n`          |
//! | `Array(items)`   | `*<n>\r\n` + each item as a bulk |

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// Null bulk marker, shared by `Bulk(None)` and nil array items.
const NULL_BULK: &[u8] = b"$-1\r\n";

/// A reply to be sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Status reply, e.g. `OK` or `PONG`.
    /// Must not contain CRLF.
    Simple(String),

    /// Error reply. By convention the message starts with an error code
    /// such as `ERR`.
    Error(String),

    /// 64-bit signed integer.
    Integer(i64),

    /// Binary-safe string; `None` is the nil bulk.
    Bulk(Option<Bytes>),

    /// Flat array of bulk strings, any of which may be nil.
    Array(Vec<Option<Bytes>>),
}

impl Reply {
    /// Creates a simple string reply.
    pub fn simple(s: impl Into<String>) -> Self {
        Reply::Simple(s.into())
    }

    /// Creates an error reply.
    ///
    /// # Example
    /// ```
    /// use minikv::protocol::Reply;
    /// let err = Reply::error("ERR unknown command 'FOO'");
    /// assert!(err.is_error());
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// Creates a non-nil bulk string reply.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(Some(data.into()))
    }

    /// The nil bulk string.
    pub fn nil() -> Self {
        Reply::Bulk(None)
    }

    pub fn array(items: Vec<Option<Bytes>>) -> Self {
        Reply::Array(items)
    }

    /// Common reply for successful writes
    pub fn ok() -> Self {
        Reply::simple("OK")
    }

    pub fn pong() -> Self {
        Reply::simple("PONG")
    }

    /// Encodes the reply into a freshly allocated buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len_hint());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Appends the wire form of the reply to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Reply::Simple(s) => {
                buf.put_u8(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.put_u8(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Integer(n) => {
                buf.put_u8(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Bulk(data) => encode_bulk(buf, data.as_ref()),
            Reply::Array(items) => {
                buf.put_u8(prefix::ARRAY);
                buf.extend_from_slice(items.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for item in items {
                    encode_bulk(buf, item.as_ref());
                }
            }
        }
    }

    /// Returns true if this reply is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Returns true if this reply is the nil bulk.
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Bulk(None))
    }

    fn encoded_len_hint(&self) -> usize {
        match self {
            Reply::Simple(s) | Reply::Error(s) => s.len() + 3,
            Reply::Integer(_) => 24,
            Reply::Bulk(Some(data)) => data.len() + 16,
            Reply::Bulk(None) => NULL_BULK.len(),
            Reply::Array(items) => {
                16 + items
                    .iter()
                    .map(|item| item.as_ref().map_or(NULL_BULK.len(), |d| d.len() + 16))
                    .sum::<usize>()
            }
        }
    }
}

fn encode_bulk(buf: &mut BytesMut, data: Option<&Bytes>) {
    match data {
        Some(data) => {
            buf.put_u8(prefix::BULK_STRING);
            buf.extend_from_slice(data.len().to_string().as_bytes());
            buf.extend_from_slice(CRLF);
            buf.extend_from_slice(data);
            buf.extend_from_slice(CRLF);
        }
        None => buf.extend_from_slice(NULL_BULK),
    }
}

fn fmt_bulk(f: &mut fmt::Formatter<'_>, data: Option<&Bytes>) -> fmt::Result {
    match data {
        None => write!(f, "(nil)"),
        Some(data) => match std::str::from_utf8(data) {
            Ok(s) => write!(f, "\"{}\"", s),
            Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
        },
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Simple(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(data) => fmt_bulk(f, data.as_ref()),
            Reply::Array(items) if items.is_empty() => write!(f, "(empty array)"),
            Reply::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) ", i + 1)?;
                    fmt_bulk(f, item.as_ref())?;
                }
                Ok(())
            }
        }
    }
}
