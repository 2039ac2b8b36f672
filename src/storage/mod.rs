//! Storage Engine Module
//!
//! The in-memory keyspace: a sharded string store with per-key expiry, and a
//! separate store of hashes (field -> value maps).
//!
//! ## Features
//!
//! - **Sharded Storage**: 64 independent shards reduce lock contention
//! - **RwLock per family**: concurrent readers, exclusive writers, and the
//!   string and hash families never block each other
//! - **TTL Support**: string keys can carry a time-to-live
//! - **Lazy Expiry**: expired keys are evicted by the read that finds them
//!
//! ## Example
//!
//! ```
//! use tidekv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! engine.set_string(Bytes::from("name"), Bytes::from("Ariz"), None);
//! assert_eq!(engine.get_string(b"name"), Some(Bytes::from("Ariz")));
//! ```

pub mod engine;

pub use engine::{StorageEngine, StorageStats};
