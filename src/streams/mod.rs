//! Stream session manager - owns every live-stream session.
//!
//! Locking discipline:
//! - the session table lock is held only to look up, insert or remove an
//!   entry, never across an await on a session or the instrument
//! - each session has its own mutex, so `poll`/`stop` on the same id
//!   serialize while different ids proceed independently
//!
//! Polling is split in two so the caller can read the instrument between
//! [`StreamSessionManager::ensure_live`] and
//! [`StreamSessionManager::next_frame`] without holding any lock.

pub mod cleanup;
mod session;

pub use cleanup::{StreamCleanupService, SweepStats};
pub use session::{FrameTicket, StreamInfo, StreamSession};

use crate::envelope::enums::StreamStatus;
use crate::types::{Error, Result, StreamConfig, StreamId};
use crate::validation::validate_positive;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

type SessionHandle = Arc<Mutex<StreamSession>>;

/// Session store with explicit lifecycle and expiry.
#[derive(Debug)]
pub struct StreamSessionManager {
    config: StreamConfig,
    sessions: RwLock<HashMap<StreamId, SessionHandle>>,
    live: AtomicUsize,
}

impl StreamSessionManager {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            live: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Start a new session in the `started` state.
    pub async fn start(
        &self,
        stream_type: &str,
        frame_rate: f64,
        duration: f64,
    ) -> Result<StreamInfo> {
        validate_positive(frame_rate, "frame_rate")?;
        validate_positive(duration, "duration")?;

        // No await between reserving a slot and inserting the session, so a
        // cancelled call cannot leak a slot.
        let mut sessions = self.sessions.write().await;
        let previous = self.live.fetch_add(1, Ordering::SeqCst);
        if previous >= self.config.max_sessions {
            self.live.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::quota_exceeded(format!(
                "at most {} live streams allowed",
                self.config.max_sessions
            )));
        }

        let session = StreamSession::new(
            stream_type.to_string(),
            frame_rate,
            duration,
            Instant::now(),
        );
        let info = session.info();
        let id = session.id().clone();
        sessions.insert(id.clone(), Arc::new(Mutex::new(session)));
        drop(sessions);

        tracing::info!(stream_id = %id, stream_type, frame_rate, duration, "stream_started");
        Ok(info)
    }

    /// Fail with `SessionNotFound` / `SessionStopped` unless the session can
    /// deliver a frame.
    pub async fn ensure_live(&self, stream_id: &str) -> Result<()> {
        let handle = self.lookup(stream_id).await?;
        let mut session = handle.lock().await;
        let (expired, result) = session.check_live(Instant::now());
        if expired {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }

    /// Assign the next frame of a live session.
    ///
    /// Re-checks liveness under the session lock, so a concurrent `stop`
    /// always wins over a poll that was already in flight.
    pub async fn next_frame(&self, stream_id: &str) -> Result<FrameTicket> {
        let handle = self.lookup(stream_id).await?;
        let mut session = handle.lock().await;
        let (expired, result) = session.check_live(Instant::now());
        if expired {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        result?;
        Ok(session.next_frame())
    }

    /// Stop a session. Stopping an already stopped session succeeds.
    pub async fn stop(&self, stream_id: &str) -> Result<StreamInfo> {
        let handle = self.lookup(stream_id).await?;
        let mut session = handle.lock().await;
        if session.stop(Instant::now()) {
            self.live.fetch_sub(1, Ordering::SeqCst);
            tracing::info!(stream_id, "stream_stopped");
        } else {
            tracing::debug!(stream_id, "stream_already_stopped");
        }
        Ok(session.info())
    }

    /// Snapshot of one session.
    pub async fn get(&self, stream_id: &str) -> Result<StreamInfo> {
        let handle = self.lookup(stream_id).await?;
        let session = handle.lock().await;
        Ok(session.info())
    }

    /// Number of sessions in the `started` state.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Number of sessions still held (live or awaiting reclamation).
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Stop expired sessions and reclaim stopped ones past retention.
    pub async fn sweep(&self) -> SweepStats {
        let handles: Vec<(StreamId, SessionHandle)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, h)| (id.clone(), h.clone()))
            .collect();

        let now = Instant::now();
        let mut stats = SweepStats::default();
        let mut reclaim = Vec::new();
        for (id, handle) in handles {
            let mut session = handle.lock().await;
            if session.status() == StreamStatus::Started && session.is_expired(now) {
                if session.stop(now) {
                    self.live.fetch_sub(1, Ordering::SeqCst);
                    stats.expired += 1;
                }
            }
            if session
                .stopped_for(now)
                .is_some_and(|d| d >= self.config.stopped_retention)
            {
                reclaim.push(id);
            }
        }

        if !reclaim.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in &reclaim {
                sessions.remove(id);
            }
            stats.removed = reclaim.len();
        }

        stats
    }

    async fn lookup(&self, stream_id: &str) -> Result<SessionHandle> {
        let id = StreamId::from_string(stream_id.to_string())
            .map_err(|e| Error::invalid_arguments(e.to_string()))?;
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::session_not_found(stream_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use std::time::Duration;

    fn manager() -> StreamSessionManager {
        StreamSessionManager::new(StreamConfig {
            max_sessions: 3,
            cleanup_interval: Duration::from_secs(1),
            stopped_retention: Duration::from_secs(10),
        })
    }

    #[tokio::test]
    async fn test_start_returns_unique_ids() {
        let streams = manager();
        let a = streams.start("camera", 10.0, 5.0).await.unwrap();
        let b = streams.start("camera", 10.0, 5.0).await.unwrap();
        assert!(!a.stream_id.is_empty());
        assert_ne!(a.stream_id, b.stream_id);
        assert_eq!(a.status, StreamStatus::Started);
        assert_eq!(streams.live_count(), 2);
    }

    #[tokio::test]
    async fn test_start_rejects_non_positive_rates() {
        let streams = manager();
        let err = streams.start("camera", 0.0, 5.0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(streams.start("camera", 10.0, -1.0).await.is_err());
        assert!(streams.start("camera", f64::NAN, 1.0).await.is_err());
        assert_eq!(streams.live_count(), 0);
    }

    #[tokio::test]
    async fn test_start_enforces_session_cap() {
        let streams = manager();
        for _ in 0..3 {
            streams.start("camera", 10.0, 5.0).await.unwrap();
        }
        let err = streams.start("camera", 10.0, 5.0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
        assert_eq!(streams.live_count(), 3);
    }

    #[tokio::test]
    async fn test_stop_frees_a_slot() {
        let streams = manager();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(streams.start("camera", 10.0, 5.0).await.unwrap().stream_id);
        }
        streams.stop(&ids[0]).await.unwrap();
        assert!(streams.start("camera", 10.0, 5.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_poll_is_monotonic() {
        let streams = manager();
        let id = streams.start("camera", 10.0, 5.0).await.unwrap().stream_id;
        let mut last = 0;
        for _ in 0..5 {
            streams.ensure_live(&id).await.unwrap();
            let ticket = streams.next_frame(&id).await.unwrap();
            assert!(ticket.frame_number >= last);
            last = ticket.frame_number;
        }
    }

    #[tokio::test]
    async fn test_poll_after_stop_fails_and_double_stop_succeeds() {
        let streams = manager();
        let id = streams.start("camera", 10.0, 5.0).await.unwrap().stream_id;
        streams.stop(&id).await.unwrap();
        let err = streams.next_frame(&id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionStopped);

        let info = streams.stop(&id).await.unwrap();
        assert_eq!(info.status, StreamStatus::Stopped);
        assert_eq!(streams.live_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let streams = manager();
        assert_eq!(
            streams.ensure_live("nope").await.unwrap_err().kind(),
            ErrorKind::SessionNotFound
        );
        assert_eq!(
            streams.stop("nope").await.unwrap_err().kind(),
            ErrorKind::SessionNotFound
        );
        assert_eq!(
            streams.stop("").await.unwrap_err().kind(),
            ErrorKind::InvalidArguments
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_stream_stops_on_poll() {
        let streams = manager();
        let id = streams.start("camera", 10.0, 2.0).await.unwrap().stream_id;
        tokio::time::advance(Duration::from_secs(3)).await;

        let err = streams.ensure_live(&id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionStopped);
        assert_eq!(streams.live_count(), 0);
        assert_eq!(streams.get(&id).await.unwrap().status, StreamStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expires_then_reclaims() {
        let streams = manager();
        let short = streams.start("camera", 10.0, 1.0).await.unwrap().stream_id;
        let long = streams.start("camera", 10.0, 600.0).await.unwrap().stream_id;

        tokio::time::advance(Duration::from_secs(2)).await;
        let stats = streams.sweep().await;
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.removed, 0);
        assert_eq!(streams.len().await, 2);

        tokio::time::advance(Duration::from_secs(11)).await;
        let stats = streams.sweep().await;
        assert_eq!(stats.removed, 1);
        assert_eq!(
            streams.get(&short).await.unwrap_err().kind(),
            ErrorKind::SessionNotFound
        );
        assert_eq!(streams.get(&long).await.unwrap().status, StreamStatus::Started);
    }

    #[tokio::test]
    async fn test_concurrent_polls_on_one_stream_stay_monotonic() {
        let streams = Arc::new(manager());
        let id = streams.start("camera", 1000.0, 60.0).await.unwrap().stream_id;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let streams = streams.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..10 {
                    seen.push(streams.next_frame(&id).await.unwrap().frame_number);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for task in tasks {
            let seen = task.await.unwrap();
            assert!(seen.windows(2).all(|w| w[0] < w[1]));
            all.extend(seen);
        }
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 80, "every poll gets a distinct frame number");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stop_is_terminal_under_concurrent_polls() {
        use std::sync::atomic::AtomicBool;

        let streams = Arc::new(manager());
        let id = streams.start("camera", 1000.0, 60.0).await.unwrap().stream_id;
        let stop_returned = Arc::new(AtomicBool::new(false));

        let mut pollers = Vec::new();
        for _ in 0..4 {
            let streams = streams.clone();
            let id = id.clone();
            let stop_returned = stop_returned.clone();
            pollers.push(tokio::spawn(async move {
                let mut issued = Vec::new();
                loop {
                    let started_after_stop = stop_returned.load(Ordering::SeqCst);
                    match streams.next_frame(&id).await {
                        Ok(ticket) => {
                            assert!(!started_after_stop, "frame issued after stop returned");
                            issued.push(ticket.frame_number);
                        }
                        Err(err) => {
                            assert_eq!(err.kind(), ErrorKind::SessionStopped);
                            return issued;
                        }
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
        let info = streams.stop(&id).await.unwrap();
        stop_returned.store(true, Ordering::SeqCst);

        let mut delivered = 0;
        for poller in pollers {
            let issued = poller.await.unwrap();
            assert!(issued.iter().all(|n| *n <= info.last_frame_number));
            delivered += issued.len() as u64;
        }
        assert_eq!(delivered, info.frames_delivered);
        assert_eq!(streams.get(&id).await.unwrap().frames_delivered, delivered);
    }
}
