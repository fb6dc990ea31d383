//! Request Frame Parser
//!
//! Decodes inbound request frames into argument lists. A request frame is an
//! array of bulk strings:
//!
//! ```text
//! *<n>\r\n
//! $<len>\r\n<len bytes>\r\n     (repeated n times)
//! ```
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((args, consumed)))` - A complete frame, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the frame is incomplete
//! - `Err(FrameError)` - The bytes can never form a valid frame
//!
//! The caller appends network data to a buffer, calls `parse()`, and on
//! success advances the buffer by `consumed` bytes. A framing error is fatal
//! to the session: there is no attempt to resynchronize on the stream.
//!
//! Integer lines run up to `\n` and are trimmed of ASCII whitespace before
//! parsing, so a stray space or a missing `\r` is tolerated. A line still
//! unterminated after [`MAX_INTEGER_LINE`] bytes is rejected. The two bytes
//! after each bulk payload are skipped without inspection.

use crate::protocol::types::{prefix, CRLF};
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Errors that can occur while decoding a request frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A frame or element started with the wrong type byte
    #[error("expected '{expected}', got {found:#04x}")]
    UnexpectedByte { expected: char, found: u8 },

    /// A length line did not hold a decimal integer
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid array length: {0}")]
    NegativeArrayLength(i64),

    #[error("invalid bulk length: {0}")]
    NegativeBulkLength(i64),

    /// The bulk string exceeds the maximum allowed size
    #[error("bulk string too large: {size} bytes (max: {max})")]
    BulkTooLarge { size: usize, max: usize },

    /// The stream ended in the middle of a frame
    #[error("unexpected end of stream")]
    UnexpectedEof,
}

/// Result type for parsing operations.
pub type FrameResult<T> = Result<T, FrameError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Longest length line accepted after the type byte, terminator included.
/// Any `i64` with padding fits well within it.
pub const MAX_INTEGER_LINE: usize = 32;

/// Incremental decoder for request frames.
///
/// # Example
///
/// ```
/// use minikv::protocol::RequestParser;
/// use bytes::{Buf, BytesMut};
///
/// let mut parser = RequestParser::new();
/// let mut buffer = BytesMut::from(&b"*1\r\n$4\r\nPING\r\n*1\r\n$4"[..]);
///
/// let (args, consumed) = parser.parse(&buffer).unwrap().unwrap();
/// buffer.advance(consumed);
/// assert_eq!(args, vec!["PING"]);
///
/// // The second frame is not complete yet
/// assert!(parser.parse(&buffer).unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct RequestParser {
    /// Scratch position within the buffer being parsed
    pos: usize,
}

impl RequestParser {
    pub fn new() -> Self {
        Self { pos: 0 }
    }

    /// Attempts to decode one request frame from the start of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> FrameResult<Option<(Vec<Bytes>, usize)>> {
        self.pos = 0;

        let count = match self.read_header(buf, prefix::ARRAY)? {
            Some(n) => n,
            None => return Ok(None),
        };
        if count < 0 {
            return Err(FrameError::NegativeArrayLength(count));
        }

        // Cap the preallocation; a hostile count must not reserve memory
        // before the elements actually arrive.
        let mut args = Vec::with_capacity((count as usize).min(64));

        for _ in 0..count {
            let len = match self.read_header(buf, prefix::BULK_STRING)? {
                Some(n) => n,
                None => return Ok(None),
            };
            if len < 0 {
                return Err(FrameError::NegativeBulkLength(len));
            }

            let len = len as usize;
            if len > MAX_BULK_SIZE {
                return Err(FrameError::BulkTooLarge {
                    size: len,
                    max: MAX_BULK_SIZE,
                });
            }

            // payload plus the fixed-width terminator
            let end = self.pos + len + CRLF.len();
            if buf.len() < end {
                return Ok(None);
            }

            args.push(Bytes::copy_from_slice(&buf[self.pos..self.pos + len]));
            self.pos = end;
        }

        Ok(Some((args, self.pos)))
    }

    /// Reads `<prefix><integer>\n` at the current position.
    fn read_header(&mut self, buf: &[u8], expected: u8) -> FrameResult<Option<i64>> {
        let Some(&found) = buf.get(self.pos) else {
            return Ok(None);
        };
        if found != expected {
            return Err(FrameError::UnexpectedByte {
                expected: expected as char,
                found,
            });
        }

        let line_start = self.pos + 1;
        let window = &buf[line_start..buf.len().min(line_start + MAX_INTEGER_LINE)];
        let Some(newline) = find_newline(window) else {
            if window.len() == MAX_INTEGER_LINE {
                return Err(FrameError::InvalidInteger(
                    String::from_utf8_lossy(window).into_owned(),
                ));
            }
            return Ok(None);
        };

        let line = &buf[line_start..line_start + newline];
        let n = parse_integer(line)?;

        self.pos = line_start + newline + 1;
        Ok(Some(n))
    }
}

#[inline]
fn find_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

fn parse_integer(line: &[u8]) -> FrameResult<i64> {
    let text = std::str::from_utf8(line)
        .map_err(|_| FrameError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))?;
    text.trim()
        .parse()
        .map_err(|_| FrameError::InvalidInteger(text.trim().to_string()))
}

/// Helper function to parse a single request frame from bytes.
pub fn parse_request(buf: &[u8]) -> FrameResult<Option<(Vec<Bytes>, usize)>> {
    RequestParser::new().parse(buf)
}

/// Encodes an argument list as a request frame.
///
/// This is the client side of the codec; the server only ever decodes
/// requests.
pub fn encode_request<A: AsRef<[u8]>>(args: &[A]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(prefix::ARRAY);
    buf.extend_from_slice(args.len().to_string().as_bytes());
    buf.extend_from_slice(CRLF);
    for arg in args {
        let arg = arg.as_ref();
        buf.put_u8(prefix::BULK_STRING);
        buf.extend_from_slice(arg.len().to_string().as_bytes());
        buf.extend_from_slice(CRLF);
        buf.extend_from_slice(arg);
        buf.extend_from_slice(CRLF);
    }
    buf.freeze()
}
