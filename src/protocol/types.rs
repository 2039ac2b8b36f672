//! RESP values.
//!
//! [`RespValue`] is the one type that crosses every boundary in TideKV:
//! requests from clients, replies to them, and the records of the AOF.
//!
//! | Type          | Prefix | Wire form                      |
//! |---------------|--------|--------------------------------|
//! | simple string | `+`    | `+OK\r\n`                      |
//! | error         | `-`    | `-ERR syntax error\r\n`        |
//! | integer       | `:`    | `:2\r\n`                       |
//! | bulk string   | `$`    | `$6\r\nuser:1\r\n`             |
//! | null bulk     | `$`    | `$-1\r\n`                      |
//! | array         | `*`    | `*2\r\n$3\r\nGET\r\n$1\r\nk\r\n` |
//! | null array    | `*`    | `*-1\r\n`                      |

use bytes::Bytes;

/// Line terminator.
pub const CRLF: &[u8] = b"\r\n";

/// Type prefix bytes.
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single RESP value.
///
/// Encoding is lossless: decoding the bytes produced by
/// [`serialize`](Self::serialize) yields an equal value, which is what lets
/// the AOF store requests verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Text without CR or LF.
    SimpleString(String),
    /// Error reply, conventionally starting with an uppercase code (`ERR`).
    Error(String),
    Integer(i64),
    /// Length-prefixed binary payload.
    BulkString(Bytes),
    /// `$-1`, the "no value" reply of GET and HGET.
    Null,
    /// `*-1`
    NullArray,
    /// Ordered elements of any type.
    Array(Vec<RespValue>),
}

impl RespValue {
    /// `+<s>`
    ///
    /// ```
    /// use tidekv::protocol::RespValue;
    /// assert_eq!(RespValue::simple_string("PONG").serialize(), b"+PONG\r\n");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        Self::SimpleString(s.into())
    }

    /// `-<msg>`
    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error(msg.into())
    }

    pub fn integer(n: i64) -> Self {
        Self::Integer(n)
    }

    /// `$<len>\r\n<data>`
    ///
    /// ```
    /// use tidekv::protocol::RespValue;
    /// use bytes::Bytes;
    /// let reply = RespValue::bulk_string(Bytes::from("a@b.c"));
    /// assert_eq!(reply.serialize(), b"$5\r\na@b.c\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        Self::BulkString(data.into())
    }

    /// The null bulk string.
    pub fn null() -> Self {
        Self::Null
    }

    pub fn array(items: Vec<RespValue>) -> Self {
        Self::Array(items)
    }

    /// `+OK`
    pub fn ok() -> Self {
        Self::simple_string("OK")
    }

    /// `+PONG`
    pub fn pong() -> Self {
        Self::simple_string("PONG")
    }

    /// Encodes the value into a fresh buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        self.serialize_into(&mut out);
        out
    }

    /// Encodes the value at the end of `buf`.
    ///
    /// Appends to `buf`; several values can be encoded back to back, which is
    /// how pipelined replies and AOF records are laid out.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => line(buf, prefix::SIMPLE_STRING, s.as_bytes()),
            RespValue::Error(msg) => line(buf, prefix::ERROR, msg.as_bytes()),
            RespValue::Integer(n) => line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            RespValue::BulkString(data) => {
                line(buf, prefix::BULK_STRING, data.len().to_string().as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => line(buf, prefix::BULK_STRING, b"-1"),
            RespValue::NullArray => line(buf, prefix::ARRAY, b"-1"),
            RespValue::Array(items) => {
                line(buf, prefix::ARRAY, items.len().to_string().as_bytes());
                items.iter().for_each(|item| item.serialize_into(buf));
            }
        }
    }

    /// Returns true if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Returns the payload of a BulkString or SimpleString.
    ///
    /// Command arguments are accepted in either form, the way most clients
    /// and `redis-cli` send them.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(b) => Some(b),
            RespValue::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Like [`as_bytes`](Self::as_bytes), but returns an owned `Bytes`.
    ///
    /// Cloning a `BulkString` only bumps a reference count.
    pub fn to_bytes(&self) -> Option<Bytes> {
        match self {
            RespValue::BulkString(b) => Some(b.clone()),
            RespValue::SimpleString(s) => Some(Bytes::copy_from_slice(s.as_bytes())),
            _ => None,
        }
    }
}

/// Writes `<prefix><body>\r\n`.
#[inline]
fn line(buf: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    buf.reserve(body.len() + 3);
    buf.push(prefix);
    buf.extend_from_slice(body);
    buf.extend_from_slice(CRLF);
}
