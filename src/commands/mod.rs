//! Command Handler Module
//!
//! This module turns parsed RESP requests into keyspace operations and reply
//! values. Every outcome, including bad arguments, is a reply: dispatch never
//! fails.
//!
//! ## Architecture
//!
//! ```text
//! Client Request / AOF record
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Decoder   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ CommandHandler  │────>│ CommandRegistry  │  name -> dyn Command
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`, `ECHO message`
//! - `SET key value [PX milliseconds]`, `GET key`, `DEL key [key ...]`
//! - `HSET key field value`, `HGET key field`

pub mod handler;
pub mod hash;
pub mod registry;
pub mod server;
pub mod string;

use crate::protocol::RespValue;

// Re-export the main command handler
pub use handler::CommandHandler;
pub use registry::{Command, CommandRegistry, FnCommand, HandlerFn};

/// Builds the standard arity error for `cmd`.
pub(crate) fn wrong_arity(cmd: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        cmd.to_lowercase()
    ))
}

pub(crate) fn invalid_argument() -> RespValue {
    RespValue::error("ERR invalid argument type, expected string")
}
