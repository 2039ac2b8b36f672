//! Client connections.
//!
//! The listener in `main.rs` spawns one task per accepted socket. Tasks share
//! only the keyspace (through [`CommandHandler`](crate::commands::CommandHandler))
//! and the append-only file.
//!
//! ```text
//! accept() ──spawn──> ConnectionHandler::run
//!                       decode ─> dispatch ─> append (writes only) ─> reply
//!                         ▲                                            │
//!                         └────────────────────────────────────────────┘
//! ```
//!
//! ```ignore
//! use tidekv::connection::{handle_connection, ConnectionStats};
//! use tidekv::commands::CommandHandler;
//! use tidekv::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let handler = CommandHandler::new(Arc::new(StorageEngine::new()));
//! let stats = Arc::new(ConnectionStats::new());
//!
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler, None, stats));
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
