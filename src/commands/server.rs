//! Connection-level commands that never touch the keyspace.

use crate::commands::{invalid_argument, wrong_arity};
use crate::protocol::RespValue;
use crate::storage::StorageEngine;

/// PING [message]
///
/// The message comes back as a simple string. Payloads that cannot be framed
/// as one (CR/LF or non-UTF-8 bytes) come back as a bulk string instead.
pub fn ping(_storage: &StorageEngine, args: &[RespValue]) -> RespValue {
    match args {
        [] => RespValue::pong(),
        [message] => match message.as_bytes() {
            Some(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) if !s.contains(['\r', '\n']) => RespValue::simple_string(s),
                _ => RespValue::bulk_string(bytes.to_vec()),
            },
            None => invalid_argument(),
        },
        _ => wrong_arity("ping"),
    }
}

/// ECHO message
pub fn echo(_storage: &StorageEngine, args: &[RespValue]) -> RespValue {
    if args.len() != 1 {
        return wrong_arity("echo");
    }

    match args[0].to_bytes() {
        Some(msg) => RespValue::bulk_string(msg),
        None => invalid_argument(),
    }
}
