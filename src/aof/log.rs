//! The append-only file.
//!
//! Each record is the RESP encoding of one request array, exactly as the
//! client sent it. Records are concatenated with no header or framing of
//! their own, so the file can be inspected with any RESP tool.
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n*4\r\n$4\r\nHSET\r\n$1\r\nh\r\n...
//! └──────────── record 1 ──────────────┘└──────── record 2 ────────...
//! ```

use crate::aof::AofError;
use crate::protocol::{RespDecoder, RespValue};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Append-only command log.
///
/// One mutex guards the file for appends, syncs and replay, so a sync never
/// observes half of an append.
#[derive(Debug)]
pub struct AppendLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AppendLog {
    /// Opens the log at `path`, creating it if it does not exist.
    ///
    /// Existing records are kept; new ones are appended after them.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AofError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;

        let len = file.metadata().await?.len();
        info!(path = %path.display(), bytes = len, "AOF opened");

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one request.
    ///
    /// The bytes are handed to the operating system before this returns;
    /// reaching stable storage is the job of [`sync`](Self::sync).
    pub async fn append(&self, request: &RespValue) -> Result<(), AofError> {
        let bytes = request.serialize();

        let mut file = self.file.lock().await;
        file.write_all(&bytes).await?;
        file.flush().await?;

        debug!(bytes = bytes.len(), "AOF record appended");
        Ok(())
    }

    /// Flushes the file to stable storage.
    pub async fn sync(&self) -> Result<(), AofError> {
        let mut file = self.file.lock().await;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }

    /// Reads every record from the start of the file and hands it to `apply`,
    /// in file order.
    ///
    /// Appends wait until replay finishes. Returns the number of records read.
    /// A truncated or malformed record aborts the replay with an error.
    pub async fn replay<F>(&self, mut apply: F) -> Result<u64, AofError>
    where
        F: FnMut(RespValue),
    {
        let _guard = self.file.lock().await;

        let reader = File::open(&self.path).await?;
        let mut decoder = RespDecoder::new(reader);

        let mut index = 0u64;
        while let Some(record) = decoder
            .decode()
            .await
            .map_err(move |source| AofError::Decode { index, source })?
        {
            if !matches!(record, RespValue::Array(_)) {
                return Err(AofError::InvalidRecord { index });
            }
            apply(record);
            index += 1;
        }

        debug!(path = %self.path.display(), records = index, "AOF replay finished");
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DecodeError;
    use bytes::Bytes;
    use tempfile::TempDir;

    fn make_command(args: &[&str]) -> RespValue {
        RespValue::Array(
            args.iter()
                .map(|s| RespValue::bulk_string(Bytes::from(s.to_string())))
                .collect(),
        )
    }

    async fn collect(log: &AppendLog) -> Result<Vec<RespValue>, AofError> {
        let mut records = Vec::new();
        log.replay(|r| records.push(r)).await?;
        Ok(records)
    }

    #[tokio::test]
    async fn test_open_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.aof");

        let log = AppendLog::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(log.path(), path.as_path());
        assert!(collect(&log).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_writes_exact_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.aof");

        let log = AppendLog::open(&path).await.unwrap();
        log.append(&make_command(&["SET", "a", "1"])).await.unwrap();

        let contents = tokio::fs::read(&path).await.unwrap();
        assert_eq!(contents, b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n");
    }

    #[tokio::test]
    async fn test_replay_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.aof");

        let log = AppendLog::open(&path).await.unwrap();
        let commands = vec![
            make_command(&["SET", "a", "1"]),
            make_command(&["HSET", "h", "f", "v"]),
            make_command(&["SET", "a", "2", "PX", "1000"]),
        ];
        for cmd in &commands {
            log.append(cmd).await.unwrap();
        }
        log.sync().await.unwrap();

        assert_eq!(collect(&log).await.unwrap(), commands);
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.aof");

        {
            let log = AppendLog::open(&path).await.unwrap();
            log.append(&make_command(&["SET", "a", "1"])).await.unwrap();
            log.sync().await.unwrap();
        }

        let log = AppendLog::open(&path).await.unwrap();
        log.append(&make_command(&["SET", "b", "2"])).await.unwrap();

        let records = collect(&log).await.unwrap();
        assert_eq!(
            records,
            vec![make_command(&["SET", "a", "1"]), make_command(&["SET", "b", "2"])]
        );
    }

    #[tokio::test]
    async fn test_replay_binary_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.aof");

        let log = AppendLog::open(&path).await.unwrap();
        let record = RespValue::Array(vec![
            RespValue::bulk_string(Bytes::from("SET")),
            RespValue::bulk_string(Bytes::from(&b"k\r\n"[..])),
            RespValue::bulk_string(Bytes::from(&b"\x00\xff*1\r\n"[..])),
        ]);
        log.append(&record).await.unwrap();

        assert_eq!(collect(&log).await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_truncated_tail_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.aof");
        tokio::fs::write(&path, b"*1\r\n$4\r\nPING\r\n*3\r\n$3\r\nSET\r\n$1\r\na")
            .await
            .unwrap();

        let log = AppendLog::open(&path).await.unwrap();
        let err = collect(&log).await.unwrap_err();
        assert!(matches!(
            err,
            AofError::Decode {
                index: 1,
                source: DecodeError::Truncated { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_garbage_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.aof");
        tokio::fs::write(&path, b"hello world\r\n").await.unwrap();

        let log = AppendLog::open(&path).await.unwrap();
        let err = collect(&log).await.unwrap_err();
        assert!(matches!(
            err,
            AofError::Decode {
                index: 0,
                source: DecodeError::Protocol(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_non_array_record_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.aof");
        tokio::fs::write(&path, b"+OK\r\n").await.unwrap();

        let log = AppendLog::open(&path).await.unwrap();
        let err = collect(&log).await.unwrap_err();
        assert!(matches!(err, AofError::InvalidRecord { index: 0 }));
    }
}
