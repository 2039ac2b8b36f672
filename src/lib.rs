//! # TideKV - An In-Memory Key-Value Server with an Append-Only Log
//!
//! TideKV speaks the Redis serialization protocol (RESP), keeps its keyspace
//! in memory, and survives restarts by replaying an append-only file of
//! every write it accepted.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               TideKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────────────────┐ │
//! │  │ AofFlusher  │───>│ AppendLog   │    │        StorageEngine         │ │
//! │  │ (fsync 1s)  │    │ (RESP file) │    │  strings + TTL  │   hashes   │ │
//! │  └─────────────┘    └──────┬──────┘    └──────────────────────────────┘ │
//! │                            │ replay at startup        ▲                 │
//! │                            └──────────────────────────┘                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use tidekv::aof::{self, AofFlusher, AppendLog, DEFAULT_FSYNC_INTERVAL};
//! use tidekv::commands::CommandHandler;
//! use tidekv::connection::{handle_connection, ConnectionStats};
//! use tidekv::storage::StorageEngine;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let handler = CommandHandler::new(Arc::clone(&storage));
//!
//!     let log = Arc::new(AppendLog::open("database.aof").await?);
//!     aof::restore(&log, &handler).await?;
//!     let _flusher = AofFlusher::start(Arc::clone(&log), DEFAULT_FSYNC_INTERVAL);
//!
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind("127.0.0.1:6379").await?;
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         tokio::spawn(handle_connection(
//!             stream,
//!             addr,
//!             handler.clone(),
//!             Some(Arc::clone(&log)),
//!             Arc::clone(&stats),
//!         ));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`, `ECHO message`
//! - `SET key value [PX milliseconds]`, `GET key`, `DEL key [key ...]`
//! - `HSET key field value`, `HGET key field`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP types, parser and stream decoder
//! - [`storage`]: Thread-safe keyspace with lazy TTL expiry
//! - [`commands`]: Command registry and dispatcher
//! - [`aof`]: Append-only file, replay and background fsync
//! - [`connection`]: Client connection loop

pub mod aof;
pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use aof::{AofError, AofFlusher, AppendLog};
pub use commands::{CommandHandler, CommandRegistry};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{DecodeError, ParseError, RespDecoder, RespParser, RespValue};
pub use storage::StorageEngine;

/// The default port TideKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host TideKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default append-only file path
pub const DEFAULT_AOF_PATH: &str = "database.aof";

/// Version of TideKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
