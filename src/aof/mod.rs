//! Append-Only File Persistence
//!
//! Every accepted write command is appended to the AOF in its RESP wire form.
//! At startup the file is replayed through the command handler to rebuild the
//! keyspace, then the server starts accepting connections.
//!
//! ## Durability
//!
//! Appends reach the operating system immediately. A background
//! [`AofFlusher`] fsyncs the file on a fixed interval, so a crash loses at
//! most one interval's worth of writes.
//!
//! ```text
//!  connection ──append()──┐
//!  connection ──append()──┼──> Mutex<File> <──sync()── AofFlusher (every 1s)
//!  connection ──append()──┘
//! ```
//!
//! ## Relative TTLs
//!
//! `SET key value PX ms` is logged as received. Replaying it starts a fresh
//! `ms` window from the moment of replay, not from the original write.

pub mod flusher;
pub mod log;

use crate::commands::CommandHandler;
use crate::protocol::DecodeError;
use thiserror::Error;
use tracing::{info, warn};

pub use flusher::{AofFlusher, DEFAULT_FSYNC_INTERVAL};
pub use log::AppendLog;

/// Errors raised by the AOF.
#[derive(Debug, Error)]
pub enum AofError {
    /// Opening, writing or syncing the file failed
    #[error("AOF I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be decoded during replay
    #[error("AOF record {index} is corrupt: {source}")]
    Decode {
        index: u64,
        #[source]
        source: DecodeError,
    },

    /// A record decoded to something other than a request array
    #[error("AOF record {index} is not a command array")]
    InvalidRecord { index: u64 },
}

/// Replays `log` through `handler`, rebuilding its keyspace.
///
/// Nothing is written back to the log and no replies are sent. Commands that
/// reply with an error are logged and skipped. Returns the number of records
/// applied.
pub async fn restore(log: &AppendLog, handler: &CommandHandler) -> Result<u64, AofError> {
    let mut rejected = 0u64;
    let records = log
        .replay(|record| {
            let reply = handler.execute(&record);
            if reply.is_error() {
                rejected += 1;
                warn!(?reply, "AOF record rejected during replay");
            }
        })
        .await?;

    info!(
        path = %log.path().display(),
        records,
        rejected,
        "AOF replay complete"
    );
    Ok(records)
}
