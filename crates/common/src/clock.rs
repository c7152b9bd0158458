//! Clock and timing utilities for session synchronization.
//!
//! Every artifact of a recording session is anchored to a single
//! millisecond Unix timestamp (the session timestamp). This module provides:
//! - Generating the session timestamp
//! - A monotonic clock that reports time relative to that anchor
//! - Measuring the offset between two streams

use tokio::time::{Duration, Instant};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn unix_time_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// A session clock that reports monotonic time relative to the session
/// timestamp.
///
/// Wall-clock reads happen once, at construction. Everything after that is
/// derived from a monotonic instant, so timestamps never go backwards even
/// if the system clock is adjusted mid-recording.
#[derive(Debug, Clone)]
pub struct SessionClock {
    session_timestamp_ms: u64,
    anchor: Instant,
}

impl SessionClock {
    /// Start a new clock whose session timestamp is now.
    pub fn start() -> Self {
        Self {
            session_timestamp_ms: unix_time_ms(),
            anchor: Instant::now(),
        }
    }

    /// Build a clock for a session timestamp chosen elsewhere (for example
    /// by a parent process coordinating several recorders).
    ///
    /// A timestamp in the past moves the monotonic anchor back by the same
    /// amount; a timestamp in the future is treated as "now".
    pub fn anchored_at(session_timestamp_ms: u64) -> Self {
        let now_ms = unix_time_ms();
        let behind = Duration::from_millis(now_ms.saturating_sub(session_timestamp_ms));
        let now = Instant::now();
        Self {
            session_timestamp_ms,
            anchor: now.checked_sub(behind).unwrap_or(now),
        }
    }

    /// The session timestamp (ms since Unix epoch).
    pub fn session_timestamp_ms(&self) -> u64 {
        self.session_timestamp_ms
    }

    /// Milliseconds elapsed since the session timestamp.
    pub fn elapsed_ms(&self) -> u64 {
        self.anchor.elapsed().as_millis() as u64
    }

    /// Whole seconds elapsed since the session timestamp.
    pub fn elapsed_secs(&self) -> u64 {
        self.anchor.elapsed().as_secs()
    }

    /// Current time in ms since the Unix epoch, derived monotonically.
    pub fn now_ms(&self) -> u64 {
        self.session_timestamp_ms + self.elapsed_ms()
    }

    /// Wall-clock time at the session timestamp (RFC 3339).
    pub fn epoch_wall(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.session_timestamp_ms as i64)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default()
    }
}
