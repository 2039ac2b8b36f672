//! Background AOF Flusher
//!
//! Appends only hand bytes to the operating system. This task fsyncs the log
//! on a fixed interval, bounding how much a crash can lose without paying
//! for an fsync on every write.
//!
//! ## Design
//!
//! The flusher runs as a Tokio task and:
//! 1. Waits for the next tick (default: every second)
//! 2. Takes the log's lock and syncs the file
//! 3. Logs a failed sync once; the next tick simply tries again
//!
//! The task is owned by an [`AofFlusher`] handle. [`AofFlusher::shutdown`]
//! stops and joins it and performs one last sync; dropping the handle only
//! signals the task to stop.

use crate::aof::{AofError, AppendLog};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Default interval between fsyncs.
pub const DEFAULT_FSYNC_INTERVAL: Duration = Duration::from_secs(1);

/// A handle to the running flusher task.
#[derive(Debug)]
pub struct AofFlusher {
    log: Arc<AppendLog>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl AofFlusher {
    /// Starts syncing `log` every `interval` in a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use tidekv::aof::{AofFlusher, AppendLog, DEFAULT_FSYNC_INTERVAL};
    /// use std::sync::Arc;
    ///
    /// let log = Arc::new(AppendLog::open("database.aof").await?);
    /// let flusher = AofFlusher::start(Arc::clone(&log), DEFAULT_FSYNC_INTERVAL);
    ///
    /// // ... serve traffic ...
    ///
    /// flusher.shutdown().await?;
    /// ```
    pub fn start(log: Arc<AppendLog>, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(flusher_loop(Arc::clone(&log), interval, shutdown_rx));

        info!(
            interval_ms = interval.as_millis() as u64,
            "Background AOF flusher started"
        );

        Self {
            log,
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the task to stop without waiting for it.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stops the task, waits for it to exit and syncs the log one last time.
    pub async fn shutdown(mut self) -> Result<(), AofError> {
        self.stop();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "AOF flusher task ended abnormally");
            }
        }

        self.log.sync().await?;
        info!("Background AOF flusher stopped");
        Ok(())
    }
}

impl Drop for AofFlusher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main flusher loop.
async fn flusher_loop(
    log: Arc<AppendLog>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("AOF flusher received shutdown signal");
                    return;
                }
            }
        }

        match log.sync().await {
            Ok(()) => trace!("AOF synced"),
            Err(e) => error!(
                error = %e,
                path = %log.path().display(),
                "Failed to sync AOF"
            ),
        }
    }
}
