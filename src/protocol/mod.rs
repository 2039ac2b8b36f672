//! RESP codec.
//!
//! The same length-prefixed, binary-safe format is used on the socket and in
//! the append-only file:
//!
//! - [`types`]: the [`RespValue`] enum and its encoder
//! - [`parser`]: non-blocking parser over a byte slice
//! - [`decoder`]: async wrapper that pulls whole values out of a reader
//!
//! ```
//! use tidekv::protocol::{parse_message, RespValue};
//! use bytes::Bytes;
//!
//! let wire = b"*3\r\n$4\r\nHGET\r\n$6\r\nuser:1\r\n$5\r\nemail\r\n";
//! let (request, consumed) = parse_message(wire).unwrap().unwrap();
//! assert_eq!(consumed, wire.len());
//! assert!(matches!(request, RespValue::Array(ref parts) if parts.len() == 3));
//!
//! let reply = RespValue::bulk_string(Bytes::from("a@b.c"));
//! assert_eq!(reply.serialize(), b"$5\r\na@b.c\r\n");
//! ```

pub mod decoder;
pub mod parser;
pub mod types;

pub use decoder::{DecodeError, RespDecoder};
pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
