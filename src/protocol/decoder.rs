//! Streaming RESP Decoder
//!
//! Wraps any `AsyncRead` and yields one complete [`RespValue`] at a time.
//! Client connections and AOF replay both read through this type, so a record
//! in the log is decoded exactly like a request on the wire.
//!
//! End-of-stream is only clean when it falls on a value boundary. Running out
//! of bytes in the middle of a value is reported as [`DecodeError::Truncated`].

use crate::protocol::parser::{ParseError, RespParser, MAX_BULK_SIZE};
use crate::protocol::types::RespValue;
use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Initial read buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Upper bound on a single buffered frame: the largest bulk string plus
/// room for its headers.
pub const DEFAULT_MAX_FRAME_SIZE: usize = MAX_BULK_SIZE + 64 * 1024;

/// Errors produced while decoding a stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The underlying reader failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes do not form a valid RESP value
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The stream ended in the middle of a value
    #[error("unexpected end of stream ({buffered} bytes of a partial value)")]
    Truncated { buffered: usize },

    /// A partial frame grew beyond the configured limit
    #[error("frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },
}

/// Reads RESP values from a byte stream.
#[derive(Debug)]
pub struct RespDecoder<R> {
    reader: R,
    buffer: BytesMut,
    parser: RespParser,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> RespDecoder<R> {
    /// Creates a decoder with the default frame limit.
    pub fn new(reader: R) -> Self {
        Self::with_max_frame_size(reader, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates a decoder that rejects partial frames larger than `max_frame_size`.
    pub fn with_max_frame_size(reader: R, max_frame_size: usize) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            max_frame_size,
        }
    }

    /// Decodes the next value.
    ///
    /// Returns `Ok(None)` on a clean end-of-stream. Values already buffered
    /// (pipelined requests) are returned without touching the reader.
    pub async fn decode(&mut self) -> Result<Option<RespValue>, DecodeError> {
        loop {
            if let Some((value, consumed)) = self.parser.parse(&self.buffer)? {
                self.buffer.advance(consumed);
                trace!(
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Decoded value"
                );
                return Ok(Some(value));
            }

            if self.buffer.len() >= self.max_frame_size {
                return Err(DecodeError::FrameTooLarge {
                    max: self.max_frame_size,
                });
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = self.reader.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(DecodeError::Truncated {
                        buffered: self.buffer.len(),
                    })
                };
            }
            trace!(bytes = n, "Read data");
        }
    }

    /// Number of bytes read but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
