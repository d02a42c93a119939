//! # Stage: Stats Heartbeat
//!
//! ## Responsibility
//! Counts long-poll updates and relayed commands for the process lifetime and
//! writes them as a single human-readable status line to a well-known item.
//!
//! ## Guarantees
//! - Counters are monotonic and never reset
//! - At most one non-forced write per interval; forced writes always go out
//! - The send gate is advanced before the write, so concurrent callers inside
//!   the same window cannot both emit
//!
//! ## NOT Responsible For
//! - Retrying a failed heartbeat write (the next due call tries again)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;
use crate::rest::ItemServer;

/// Default minimum spacing between non-forced heartbeats.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Format the heartbeat line written to the stats item.
pub fn stats_line(timestamp: &str, updates: u64, commands: u64) -> String {
    format!("{timestamp} Updates:{updates} Commands:{commands}")
}

/// Cumulative counters plus the rate-limited heartbeat writer.
pub struct StatsReporter {
    server: Arc<dyn ItemServer>,
    stats_key: String,
    interval: Duration,
    update_count: AtomicU64,
    command_count: AtomicU64,
    next_send: Mutex<Gate>,
}

/// When the next non-forced heartbeat becomes due.
#[derive(Debug, Clone, Copy)]
enum Gate {
    /// No heartbeat yet, so the first call is always due.
    Open,
    Until(Instant),
    /// The interval runs past the clock's range. Only forced sends go out.
    Never,
}

impl StatsReporter {
    pub fn new(server: Arc<dyn ItemServer>, stats_key: impl Into<String>, interval: Duration) -> Self {
        Self {
            server,
            stats_key: stats_key.into(),
            interval,
            update_count: AtomicU64::new(0),
            command_count: AtomicU64::new(0),
            next_send: Mutex::new(Gate::Open),
        }
    }

    pub fn record_update(&self) {
        self.update_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command(&self) {
        self.command_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_count(&self) -> u64 {
        self.update_count.load(Ordering::Relaxed)
    }

    pub fn command_count(&self) -> u64 {
        self.command_count.load(Ordering::Relaxed)
    }

    pub fn stats_key(&self) -> &str {
        &self.stats_key
    }

    /// Claim the send slot if a heartbeat is due (or `force`d).
    fn claim_slot(&self, force: bool) -> bool {
        let now = Instant::now();
        let mut next = self.next_send.lock().unwrap_or_else(|p| p.into_inner());
        let due = force
            || match *next {
                Gate::Open => true,
                Gate::Until(t) => now > t,
                Gate::Never => false,
            };
        if due {
            *next = now.checked_add(self.interval).map_or(Gate::Never, Gate::Until);
        }
        due
    }

    /// Write the heartbeat if one is due.
    ///
    /// # Returns
    /// - `Ok(true)`: a status write was emitted.
    /// - `Ok(false)`: skipped, still inside the current interval.
    /// - `Err(_)`: the status write failed.
    pub async fn send_stats(&self, force: bool) -> Result<bool> {
        if !self.claim_slot(force) {
            return Ok(false);
        }

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let line = stats_line(&timestamp, self.update_count(), self.command_count());
        self.server.update_state(&self.stats_key, &line).await?;
        debug!(key = %self.stats_key, line = %line, force, "stats heartbeat sent");
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::mock::MockServer;

    fn reporter(server: &Arc<MockServer>) -> StatsReporter {
        StatsReporter::new(server.clone(), "ROS_STATS", DEFAULT_STATS_INTERVAL)
    }

    #[test]
    fn stats_line_format() {
        assert_eq!(
            stats_line("2024-01-02 03:04:05", 12, 3),
            "2024-01-02 03:04:05 Updates:12 Commands:3"
        );
    }

    #[test]
    fn counters_are_monotonic() {
        let server = Arc::new(MockServer::new());
        let r = reporter(&server);
        r.record_update();
        r.record_update();
        r.record_command();
        assert_eq!(r.update_count(), 2);
        assert_eq!(r.command_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn two_unforced_sends_in_one_window_emit_once() {
        let server = Arc::new(MockServer::new());
        let r = reporter(&server);
        assert!(r.send_stats(false).await.unwrap());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!r.send_stats(false).await.unwrap());
        assert_eq!(server.state_writes_to("ROS_STATS").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unforced_send_emits_again_after_interval() {
        let server = Arc::new(MockServer::new());
        let r = reporter(&server);
        r.send_stats(false).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(r.send_stats(false).await.unwrap());
        assert_eq!(server.state_writes_to("ROS_STATS").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exactly_at_deadline_is_not_due() {
        let server = Arc::new(MockServer::new());
        let r = reporter(&server);
        r.send_stats(false).await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!r.send_stats(false).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn forced_send_always_emits() {
        let server = Arc::new(MockServer::new());
        let r = reporter(&server);
        assert!(r.send_stats(true).await.unwrap());
        assert!(r.send_stats(true).await.unwrap());
        assert!(!r.send_stats(false).await.unwrap());
        assert_eq!(server.state_writes_to("ROS_STATS").len(), 2);
    }

    #[tokio::test]
    async fn line_carries_current_counters() {
        let server = Arc::new(MockServer::new());
        let r = reporter(&server);
        r.record_update();
        r.record_command();
        r.record_command();
        r.send_stats(true).await.unwrap();
        let lines = server.state_writes_to("ROS_STATS");
        assert!(lines[0].ends_with(" Updates:1 Commands:2"), "line: {}", lines[0]);
    }

    #[tokio::test]
    async fn unbounded_interval_emits_once_then_only_when_forced() {
        let server = Arc::new(MockServer::new());
        let r = StatsReporter::new(server.clone(), "ROS_STATS", Duration::MAX);
        assert!(r.send_stats(false).await.unwrap());
        assert!(!r.send_stats(false).await.unwrap());
        assert!(r.send_stats(true).await.unwrap());
        assert_eq!(server.state_writes_to("ROS_STATS").len(), 2);
    }

    #[tokio::test]
    async fn failed_write_is_reported() {
        let server = Arc::new(MockServer::new());
        server.fail_writes(500);
        let r = reporter(&server);
        assert!(r.send_stats(true).await.is_err());
    }
}
