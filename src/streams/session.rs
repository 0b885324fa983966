//! Stream session state machine.
//!
//! ```text
//! started ──stop / expiry──▶ stopped (terminal)
//! ```

use crate::envelope::enums::StreamStatus;
use crate::types::{Error, Result, StreamId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// A streaming acquisition owned by the session manager.
#[derive(Debug)]
pub struct StreamSession {
    id: StreamId,
    stream_type: String,
    frame_rate: f64,
    duration: f64,
    status: StreamStatus,
    created_at: DateTime<Utc>,
    stopped_at: Option<DateTime<Utc>>,
    started: Instant,
    stopped: Option<Instant>,
    last_frame: u64,
    frames_delivered: u64,
}

/// Client-visible view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub stream_id: String,
    pub stream_type: String,
    pub frame_rate: f64,
    pub duration: f64,
    pub status: StreamStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    /// Number of frames handed out so far.
    pub frames_delivered: u64,
    /// Highest frame number handed out (0 before the first poll).
    pub last_frame_number: u64,
}

/// Frame metadata assigned under the session lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameTicket {
    pub stream_id: String,
    pub frame_number: u64,
    /// Unix time in seconds.
    pub timestamp: f64,
}

impl StreamSession {
    pub fn new(stream_type: String, frame_rate: f64, duration: f64, now: Instant) -> Self {
        Self {
            id: StreamId::new(),
            stream_type,
            frame_rate,
            duration,
            status: StreamStatus::Started,
            created_at: Utc::now(),
            stopped_at: None,
            started: now,
            stopped: None,
            last_frame: 0,
            frames_delivered: 0,
        }
    }

    pub fn id(&self) -> &StreamId {
        &self.id
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    /// Whether the requested duration has fully elapsed.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started).as_secs_f64() >= self.duration
    }

    /// Transition to `stopped`. Returns `true` only on the actual transition.
    pub fn stop(&mut self, now: Instant) -> bool {
        if self.status == StreamStatus::Stopped {
            return false;
        }
        self.status = StreamStatus::Stopped;
        self.stopped_at = Some(Utc::now());
        self.stopped = Some(now);
        true
    }

    /// Time since the session stopped, if it has.
    pub fn stopped_for(&self, now: Instant) -> Option<std::time::Duration> {
        self.stopped.map(|t| now.saturating_duration_since(t))
    }

    /// Fail unless the session can still deliver frames. Expired sessions
    /// are stopped on the way; the returned flag reports that transition.
    pub fn check_live(&mut self, now: Instant) -> (bool, Result<()>) {
        if self.status == StreamStatus::Stopped {
            return (false, Err(Error::session_stopped(self.id.as_str())));
        }
        if self.is_expired(now) {
            let transitioned = self.stop(now);
            tracing::debug!(stream_id = %self.id, "stream_expired");
            return (transitioned, Err(Error::session_stopped(self.id.as_str())));
        }
        (false, Ok(()))
    }

    /// Assign the next frame number. Never regresses within a session;
    /// saturates at `u64::MAX` for absurd frame rates.
    pub fn next_frame(&mut self) -> FrameTicket {
        let elapsed = self.started.elapsed().as_secs_f64();
        // float-to-int `as` saturates, so only the additions can overflow
        let scheduled = ((elapsed * self.frame_rate).floor() as u64).saturating_add(1);
        self.last_frame = scheduled.max(self.last_frame.saturating_add(1));
        self.frames_delivered = self.frames_delivered.saturating_add(1);
        let now = Utc::now();
        FrameTicket {
            stream_id: self.id.to_string(),
            frame_number: self.last_frame,
            timestamp: now.timestamp_micros() as f64 / 1_000_000.0,
        }
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            stream_id: self.id.to_string(),
            stream_type: self.stream_type.clone(),
            frame_rate: self.frame_rate,
            duration: self.duration,
            status: self.status,
            created_at: self.created_at,
            stopped_at: self.stopped_at,
            frames_delivered: self.frames_delivered,
            last_frame_number: self.last_frame,
        }
    }
}
