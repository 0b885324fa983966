//! Background sweep for stream sessions.
//!
//! Stops sessions whose duration elapsed without a poll and reclaims
//! stopped sessions once they pass the configured retention.

use super::StreamSessionManager;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Statistics from one sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepStats {
    /// Sessions stopped because their duration elapsed
    pub expired: usize,
    /// Stopped sessions removed from the table
    pub removed: usize,
}

/// Periodic sweeper bound to one session manager.
#[derive(Debug)]
pub struct StreamCleanupService {
    streams: Arc<StreamSessionManager>,
    interval: Duration,
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl StreamCleanupService {
    pub fn new(streams: Arc<StreamSessionManager>) -> Self {
        let interval = streams.config().cleanup_interval;
        Self {
            streams,
            interval,
            stop_tx: None,
        }
    }

    /// Start the sweep loop in the background.
    /// Returns immediately; sweeps run in a spawned task.
    pub fn start(&mut self) -> tokio::task::JoinHandle<()> {
        let streams = self.streams.clone();
        let period = self.interval;
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        self.stop_tx = Some(stop_tx);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = streams.sweep().await;
                        let completed_at: DateTime<Utc> = Utc::now();
                        if stats != SweepStats::default() {
                            tracing::debug!(
                                expired = stats.expired,
                                removed = stats.removed,
                                %completed_at,
                                "stream_sweep_completed"
                            );
                        }
                    }
                    _ = &mut stop_rx => {
                        tracing::info!("stream_cleanup_stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Stop the sweep loop.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}
