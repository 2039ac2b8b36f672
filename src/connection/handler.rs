//! Connection Handler Module
//!
//! Each client connection is served by its own task running a
//! read-dispatch-respond loop until the client goes away.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects, task spawned
//!        │
//!        ▼
//! 2. ┌──────────────────────────────────┐
//!    │  Decode one request              │<─────┐
//!    │  Shape check (non-empty array)   │      │
//!    │  Dispatch to CommandHandler      │      │
//!    │  Append write commands to AOF    │      │
//!    │  Encode and send reply           │──────┘
//!    └──────────────────────────────────┘
//!        │
//!        ▼
//! 3. Clean EOF, protocol error or I/O error: task ends
//! ```
//!
//! A malformed request shape gets an error reply and the loop continues.
//! Malformed framing closes the connection, since the stream cannot be
//! resynchronised.

use crate::aof::AppendLog;
use crate::commands::CommandHandler;
use crate::protocol::{DecodeError, RespDecoder, RespValue};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf};
use tracing::{debug, error, info, trace, warn};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Serves a single client connection.
pub struct ConnectionHandler<S> {
    /// Incoming requests
    decoder: RespDecoder<ReadHalf<S>>,

    /// Outgoing replies
    writer: BufWriter<WriteHalf<S>>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// The command handler (shares the keyspace with every connection)
    command_handler: CommandHandler,

    /// Where write commands are logged, if persistence is enabled
    aof: Option<Arc<AppendLog>>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The client's byte stream
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `aof` - The append-only file, or `None` to run without persistence
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        aof: Option<Arc<AppendLog>>,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();
        let (reader, writer) = tokio::io::split(stream);

        Self {
            decoder: RespDecoder::new(reader),
            writer: BufWriter::new(writer),
            addr,
            command_handler,
            aof,
            stats,
        }
    }

    /// Runs the connection loop until the client disconnects or an error
    /// occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::Io(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection closed with error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        while let Some(request) = self.decoder.decode().await? {
            let reply = self.process(&request).await;
            self.stats.command_processed();
            self.send_response(&reply).await?;
        }
        Ok(())
    }

    /// Executes one request and returns its reply.
    async fn process(&self, request: &RespValue) -> RespValue {
        let (name, args) = match CommandHandler::parse_request(request) {
            Ok(parsed) => parsed,
            Err(reply) => {
                debug!(client = %self.addr, "Rejected malformed request");
                return reply;
            }
        };

        trace!(client = %self.addr, command = %name, args = args.len(), "Executing command");
        let reply = self.command_handler.dispatch(&name, args);

        // Rejected commands changed nothing, so they stay out of the log.
        if reply.is_error() || !self.command_handler.is_write(&name) {
            return reply;
        }

        if let Some(aof) = &self.aof {
            if let Err(e) = aof.append(request).await {
                error!(
                    client = %self.addr,
                    command = %name,
                    error = %e,
                    "Command applied but not persisted to AOF"
                );
                return RespValue::error(format!("ERR command applied but AOF write failed: {}", e));
            }
        }

        reply
    }

    /// Sends a response to the client.
    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error while writing a reply
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request stream was malformed, truncated or unreadable
    #[error("{0}")]
    Decode(#[from] DecodeError),
}

/// Serves a client connection to completion.
///
/// Convenience wrapper that builds a [`ConnectionHandler`] and runs it,
/// logging how the connection ended.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    aof: Option<Arc<AppendLog>>,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, aof, stats);
    if let Err(e) = handler.run().await {
        debug!(client = %addr, error = %e, "Connection ended with error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use bytes::Bytes;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    /// Spawns a handler on one end of an in-memory pipe and returns the other.
    fn spawn_pipe(
        storage: Arc<StorageEngine>,
        aof: Option<Arc<AppendLog>>,
    ) -> (DuplexStream, JoinHandle<Result<(), ConnectionError>>, Arc<ConnectionStats>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let stats = Arc::new(ConnectionStats::new());
        let handler = ConnectionHandler::new(
            server,
            test_addr(),
            CommandHandler::new(storage),
            aof,
            Arc::clone(&stats),
        );
        (client, tokio::spawn(handler.run()), stats)
    }

    async fn roundtrip(client: &mut DuplexStream, request: &[u8], expected: &[u8]) {
        client.write_all(request).await.unwrap();
        let mut buf = vec![0u8; expected.len()];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(
            String::from_utf8_lossy(&buf),
            String::from_utf8_lossy(expected)
        );
    }

    #[tokio::test]
    async fn test_ping_pong_and_clean_close() {
        let (mut client, task, stats) = spawn_pipe(Arc::new(StorageEngine::new()), None);

        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
        drop(client);

        assert!(task.await.unwrap().is_ok());
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_bad_request_shape_keeps_connection() {
        let (mut client, _task, _) = spawn_pipe(Arc::new(StorageEngine::new()), None);

        roundtrip(
            &mut client,
            b"+PING\r\n",
            b"-ERR invalid request, expected array\r\n",
        )
        .await;
        roundtrip(&mut client, b"*0\r\n", b"-ERR empty command\r\n").await;
        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
    }

    #[tokio::test]
    async fn test_protocol_error_closes_connection() {
        let (mut client, task, _) = spawn_pipe(Arc::new(StorageEngine::new()), None);

        client.write_all(b"$abc\r\n").await.unwrap();
        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(ConnectionError::Decode(DecodeError::Protocol(_)))
        ));
    }

    #[tokio::test]
    async fn test_truncated_request_is_an_error() {
        let (mut client, task, _) = spawn_pipe(Arc::new(StorageEngine::new()), None);

        client.write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nna").await.unwrap();
        drop(client);
        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(ConnectionError::Decode(DecodeError::Truncated { .. }))
        ));
    }

    #[tokio::test]
    async fn test_writes_are_logged_reads_are_not() {
        let dir = TempDir::new().unwrap();
        let aof = Arc::new(AppendLog::open(dir.path().join("conn.aof")).await.unwrap());
        let (mut client, task, _) =
            spawn_pipe(Arc::new(StorageEngine::new()), Some(Arc::clone(&aof)));

        roundtrip(&mut client, b"*3\r\n$3\r\nset\r\n$1\r\na\r\n$1\r\n1\r\n", b"+OK\r\n").await;
        roundtrip(&mut client, b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n", b"$1\r\n1\r\n").await;
        roundtrip(
            &mut client,
            b"*4\r\n$4\r\nHSET\r\n$1\r\nh\r\n$1\r\nf\r\n$1\r\nv\r\n",
            b"+OK\r\n",
        )
        .await;
        // Rejected: bad PX value
        roundtrip(
            &mut client,
            b"*5\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n2\r\n$2\r\nPX\r\n$1\r\n0\r\n",
            b"-ERR invalid expire time in 'set' command\r\n",
        )
        .await;
        drop(client);
        task.await.unwrap().unwrap();

        let mut records = Vec::new();
        aof.replay(|r| records.push(r)).await.unwrap();
        let bulk = |s: &'static str| RespValue::bulk_string(Bytes::from(s));
        assert_eq!(
            records,
            vec![
                RespValue::array(vec![bulk("set"), bulk("a"), bulk("1")]),
                RespValue::array(vec![bulk("HSET"), bulk("h"), bulk("f"), bulk("v")]),
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_del_matches_replayed_log() {
        let dir = TempDir::new().unwrap();
        let aof = Arc::new(AppendLog::open(dir.path().join("del.aof")).await.unwrap());
        let storage = Arc::new(StorageEngine::new());
        let (mut client, task, _) = spawn_pipe(Arc::clone(&storage), Some(Arc::clone(&aof)));

        roundtrip(&mut client, b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n", b"+OK\r\n").await;
        roundtrip(
            &mut client,
            b"*3\r\n$3\r\nDEL\r\n$1\r\na\r\n:1\r\n",
            b"-ERR invalid argument type, expected string\r\n",
        )
        .await;
        roundtrip(&mut client, b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n", b"$1\r\n1\r\n").await;
        drop(client);
        task.await.unwrap().unwrap();

        let replayed = Arc::new(StorageEngine::new());
        crate::aof::restore(&aof, &CommandHandler::new(Arc::clone(&replayed)))
            .await
            .unwrap();
        assert_eq!(storage.get_string(b"a"), replayed.get_string(b"a"));
        assert_eq!(storage.len(), replayed.len());
    }

    #[tokio::test]
    async fn test_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let stats = Arc::new(ConnectionStats::new());

        let storage_clone = Arc::clone(&storage);
        let stats_clone = Arc::clone(&stats);
        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = CommandHandler::new(Arc::clone(&storage_clone));
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(stream, client_addr, handler, None, stats));
            }
        });

        let mut client = TcpStream::connect(addr).await.unwrap();

        // Pipelined: SET, GET and an unknown command in one write
        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n*2\r\n$3\r\nGET\r\n$4\r\nname\r\n*1\r\n$4\r\nNOPE\r\n")
            .await
            .unwrap();

        let expected = b"+OK\r\n$4\r\nAriz\r\n-ERR unknown command 'NOPE'\r\n";
        let mut buf = vec![0u8; expected.len()];
        tokio::time::timeout(
            tokio::time::Duration::from_secs(2),
            client.read_exact(&mut buf),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(&buf[..], &expected[..]);

        assert_eq!(storage.get_string(b"name"), Some(Bytes::from("Ariz")));
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_concurrent_clients_same_key() {
        let storage = Arc::new(StorageEngine::new());
        let clients = 8;

        let mut tasks = Vec::new();
        for i in 0..clients {
            let storage = Arc::clone(&storage);
            tasks.push(tokio::spawn(async move {
                let (mut client, _task, _) = spawn_pipe(storage, None);
                let value = format!("v{}", i);
                let request = RespValue::array(vec![
                    RespValue::bulk_string(Bytes::from("SET")),
                    RespValue::bulk_string(Bytes::from("k")),
                    RespValue::bulk_string(Bytes::from(value)),
                ]);
                roundtrip(&mut client, &request.serialize(), b"+OK\r\n").await;
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let value = storage.get_string(b"k").unwrap();
        let written: Vec<_> = (0..clients).map(|i| Bytes::from(format!("v{}", i))).collect();
        assert!(written.contains(&value));
    }
}
