//! Hash commands: HSET, HGET.

use crate::commands::{invalid_argument, wrong_arity};
use crate::protocol::RespValue;
use crate::storage::StorageEngine;

/// HSET key field value
pub fn hset(storage: &StorageEngine, args: &[RespValue]) -> RespValue {
    let [key, field, value] = args else {
        return wrong_arity("hset");
    };

    match (key.to_bytes(), field.to_bytes(), value.to_bytes()) {
        (Some(key), Some(field), Some(value)) => {
            storage.set_hash_field(key, field, value);
            RespValue::ok()
        }
        _ => invalid_argument(),
    }
}

/// HGET key field
pub fn hget(storage: &StorageEngine, args: &[RespValue]) -> RespValue {
    let [key, field] = args else {
        return wrong_arity("hget");
    };

    match (key.as_bytes(), field.as_bytes()) {
        (Some(key), Some(field)) => match storage.get_hash_field(key, field) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        },
        _ => invalid_argument(),
    }
}
