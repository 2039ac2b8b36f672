//! String commands: SET, GET, DEL.

use crate::commands::{invalid_argument, wrong_arity};
use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use std::time::Duration;

/// SET key value [PX milliseconds]
///
/// Options are validated before anything is stored, so a rejected SET leaves
/// the key untouched.
pub fn set(storage: &StorageEngine, args: &[RespValue]) -> RespValue {
    if args.len() < 2 {
        return wrong_arity("set");
    }

    let (key, value) = match (args[0].to_bytes(), args[1].to_bytes()) {
        (Some(k), Some(v)) => (k, v),
        _ => return invalid_argument(),
    };

    let mut ttl: Option<Duration> = None;
    let mut options = args[2..].iter();
    while let Some(opt) = options.next() {
        let opt = match opt.as_bytes() {
            Some(opt) => opt.to_ascii_uppercase(),
            None => return invalid_argument(),
        };

        match opt.as_slice() {
            b"PX" if ttl.is_none() => {
                let ms = match options.next() {
                    Some(arg) => arg,
                    None => return RespValue::error("ERR syntax error"),
                };
                match parse_positive(ms) {
                    Some(ms) => ttl = Some(Duration::from_millis(ms)),
                    None => {
                        return RespValue::error("ERR invalid expire time in 'set' command")
                    }
                }
            }
            _ => return RespValue::error("ERR syntax error"),
        }
    }

    storage.set_string(key, value, ttl);
    RespValue::ok()
}

/// GET key
pub fn get(storage: &StorageEngine, args: &[RespValue]) -> RespValue {
    if args.len() != 1 {
        return wrong_arity("get");
    }

    let key = match args[0].as_bytes() {
        Some(k) => k,
        None => return invalid_argument(),
    };

    match storage.get_string(key) {
        Some(value) => RespValue::bulk_string(value),
        None => RespValue::null(),
    }
}

/// DEL key [key ...]
///
/// Removes each key from both the string and the hash family and replies
/// with the number of keys that existed.
pub fn del(storage: &StorageEngine, args: &[RespValue]) -> RespValue {
    if args.is_empty() {
        return wrong_arity("del");
    }

    // Reject before touching the keyspace: an error reply must mean no change.
    let Some(keys) = args.iter().map(RespValue::as_bytes).collect::<Option<Vec<_>>>() else {
        return invalid_argument();
    };

    let deleted = keys.into_iter().filter(|key| storage.delete(key)).count();
    RespValue::integer(deleted as i64)
}

/// Parses a strictly positive decimal integer argument.
///
/// Only plain digits are accepted; a sign, even `+`, is rejected.
fn parse_positive(arg: &RespValue) -> Option<u64> {
    let digits = arg.as_bytes()?;
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    match std::str::from_utf8(digits).ok()?.parse::<i64>() {
        Ok(n) if n > 0 => Some(n as u64),
        _ => None,
    }
}
