//! TideKV - An In-Memory Key-Value Server with an Append-Only Log
//!
//! Entry point: parses the command line, rebuilds the keyspace from the AOF,
//! then accepts connections until Ctrl+C.

use std::sync::Arc;
use std::time::Duration;
use tidekv::aof::{self, AofFlusher, AppendLog};
use tidekv::commands::CommandHandler;
use tidekv::connection::{handle_connection, ConnectionStats};
use tidekv::storage::StorageEngine;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// AOF path, or None to run without persistence
    aof_path: Option<String>,
    /// Interval between background fsyncs of the AOF
    fsync_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: tidekv::DEFAULT_HOST.to_string(),
            port: tidekv::DEFAULT_PORT,
            aof_path: Some(tidekv::DEFAULT_AOF_PATH.to_string()),
            fsync_interval: aof::DEFAULT_FSYNC_INTERVAL,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let mut args = std::env::args().skip(1);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => config.host = required_value(&arg, args.next()),
                "--port" | "-p" => {
                    let value = required_value(&arg, args.next());
                    config.port = value.parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number: {}", value);
                        std::process::exit(1);
                    });
                }
                "--aof" => config.aof_path = Some(required_value(&arg, args.next())),
                "--no-aof" => config.aof_path = None,
                "--fsync-interval-ms" => {
                    let value = required_value(&arg, args.next());
                    match value.parse::<u64>() {
                        Ok(ms) if ms > 0 => config.fsync_interval = Duration::from_millis(ms),
                        _ => {
                            eprintln!("Error: invalid fsync interval: {}", value);
                            std::process::exit(1);
                        }
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("TideKV version {}", tidekv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", arg);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn required_value(flag: &str, value: Option<String>) -> String {
    value.unwrap_or_else(|| {
        eprintln!("Error: {} requires a value", flag);
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
TideKV - An In-Memory Key-Value Server with an Append-Only Log

USAGE:
    tidekv [OPTIONS]

OPTIONS:
    -h, --host <HOST>             Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>             Port to listen on (default: 6379)
        --aof <PATH>              Append-only file (default: database.aof)
        --no-aof                  Run without persistence
        --fsync-interval-ms <MS>  Interval between AOF fsyncs (default: 1000)
    -v, --version                 Print version information
        --help                    Print this help message

ENVIRONMENT:
    RUST_LOG                      Log filter (default: info)
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!(version = tidekv::VERSION, "Starting TideKV");

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::new());
    let handler = CommandHandler::new(Arc::clone(&storage));

    // Rebuild the keyspace before accepting any client
    let (log, flusher) = match &config.aof_path {
        Some(path) => {
            let log = Arc::new(AppendLog::open(path).await?);
            aof::restore(&log, &handler).await?;
            let stats = storage.stats();
            info!(
                string_keys = stats.string_keys,
                hash_keys = stats.hash_keys,
                "Keyspace restored"
            );
            let flusher = AofFlusher::start(Arc::clone(&log), config.fsync_interval);
            (Some(log), Some(flusher))
        }
        None => {
            warn!("Persistence disabled, data will be lost on exit");
            (None, None)
        }
    };

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, handler, log, Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    if let Some(flusher) = flusher {
        flusher.shutdown().await?;
    }

    info!(
        connections = stats.connections_accepted.load(std::sync::atomic::Ordering::Relaxed),
        commands = stats.commands_processed.load(std::sync::atomic::Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    handler: CommandHandler,
    log: Option<Arc<AppendLog>>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(
                    stream,
                    addr,
                    handler.clone(),
                    log.clone(),
                    Arc::clone(&stats),
                ));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
