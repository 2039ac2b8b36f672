//! Incremental RESP Parser
//!
//! The parser works on a byte slice and never blocks. It returns either:
//! - `Ok(Some((value, consumed)))` - a complete value, `consumed` bytes were used
//! - `Ok(None)` - the value is incomplete, more bytes are needed
//! - `Err(ParseError)` - the bytes can never form a valid value
//!
//! The caller appends incoming data to a buffer, calls `parse()`, and advances
//! the buffer by `consumed` on success. There is no resynchronisation after an
//! error: the stream is considered broken.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a header line, simple string or error message
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, excessive nesting)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The declared bulk length exceeds the allowed maximum
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// An incremental RESP protocol parser.
///
/// # Example
///
/// ```
/// use tidekv::protocol::{RespParser, RespValue};
/// use bytes::Bytes;
///
/// let mut parser = RespParser::new();
/// let (value, consumed) = parser.parse(b"$4\r\nname\r\n").unwrap().unwrap();
/// assert_eq!(value, RespValue::bulk_string(Bytes::from("name")));
/// assert_eq!(consumed, 10);
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
}

impl RespParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one RESP value from the start of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => Ok(read_line(buf)?
                .map(|(line, consumed)| (RespValue::SimpleString(line.to_string()), consumed))),
            prefix::ERROR => Ok(read_line(buf)?
                .map(|(line, consumed)| (RespValue::Error(line.to_string()), consumed))),
            prefix::INTEGER => self.parse_integer(buf),
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses an integer: `:<integer>\r\n`
    fn parse_integer(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        match read_line(buf)? {
            Some((line, consumed)) => {
                let n = parse_i64(line)?;
                Ok(Some((RespValue::Integer(n), consumed)))
            }
            None => Ok(None),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (length, data_start) = match read_line(buf)? {
            Some((line, consumed)) => (parse_i64(line)?, consumed),
            None => return Ok(None),
        };

        if length == -1 {
            return Ok(Some((RespValue::Null, data_start)));
        }

        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let total_needed = data_start + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        // The body is opaque: only its declared length matters.
        if &buf[data_start + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);
        Ok(Some((RespValue::BulkString(data), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (count, mut consumed) = match read_line(buf)? {
            Some((line, consumed)) => (parse_i64(line)?, consumed),
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((RespValue::NullArray, consumed)));
        }

        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        // Don't trust the header for the allocation size.
        let mut elements = Vec::with_capacity(count.min(1024));

        self.depth += 1;
        let result = loop {
            if elements.len() == count {
                break Ok(Some(consumed));
            }
            match self.parse_value(&buf[consumed..]) {
                Ok(Some((value, element_consumed))) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                Ok(None) => break Ok(None),
                Err(e) => break Err(e),
            }
        };
        self.depth -= 1;

        Ok(result?.map(|consumed| (RespValue::Array(elements), consumed)))
    }
}

/// Reads the header line that follows the type prefix.
///
/// Returns the line without prefix and CRLF, plus the bytes consumed
/// including both.
fn read_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => {
            let line = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Some((line, 1 + pos + 2)))
        }
        None => Ok(None),
    }
}

fn parse_i64(line: &str) -> ParseResult<i64> {
    line.parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(format!("{:?}: {}", line, e)))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Parses a single RESP message from bytes.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
