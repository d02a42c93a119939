//! Long-poll client: one blocking "what changed" request per call.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::rest::{parse_group, Item, ItemServer};
use crate::state_tracker::StateTracker;
use crate::stats::StatsReporter;

/// Issues group long polls and republishes the members that changed.
pub struct LongPollClient {
    server: Arc<dyn ItemServer>,
    tracker: Arc<StateTracker>,
    stats: Arc<StatsReporter>,
    updates: mpsc::Sender<Item>,
}

impl LongPollClient {
    pub fn new(
        server: Arc<dyn ItemServer>,
        tracker: Arc<StateTracker>,
        stats: Arc<StatsReporter>,
        updates: mpsc::Sender<Item>,
    ) -> Self {
        Self {
            server,
            tracker,
            stats,
            updates,
        }
    }

    /// Poll `group` once.
    ///
    /// Returns `false` only when the server could not be reached or answered
    /// with a non-2xx status. A malformed body is logged and still counts as
    /// success so it does not push the loop into backoff.
    pub async fn poll_group(&self, group: &str) -> bool {
        let body = match self.server.fetch_group(group).await {
            Ok(body) => body,
            Err(e) => {
                debug!(group, error = %e, "long poll failed");
                return false;
            }
        };

        let members = match parse_group(&body) {
            Ok(members) => members,
            Err(e) => {
                warn!(group, error = %e, "ignoring malformed long-poll response");
                return true;
            }
        };

        let mut published = 0usize;
        for item in members {
            if !self.tracker.observe(&item.name, &item.state) {
                continue;
            }
            debug!(item = %item.name, state = %item.state, "item changed");
            if let Err(e) = self.updates.send(item).await {
                warn!(item = %e.0.name, "updates consumer gone, dropping change");
                continue;
            }
            published += 1;
        }
        debug!(group, published, "long poll complete");

        self.stats.record_update();
        if let Err(e) = self.stats.send_stats(false).await {
            warn!(error = %e, "stats heartbeat write failed");
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::mock::{MockServer, Reply};
    use std::time::Duration;

    struct Harness {
        server: Arc<MockServer>,
        tracker: Arc<StateTracker>,
        stats: Arc<StatsReporter>,
        poller: LongPollClient,
        rx: mpsc::Receiver<Item>,
    }

    fn harness() -> Harness {
        let server = Arc::new(MockServer::new());
        let tracker = Arc::new(StateTracker::new());
        let stats = Arc::new(StatsReporter::new(
            server.clone(),
            "ROS_STATS",
            Duration::from_secs(60),
        ));
        let (tx, rx) = mpsc::channel(40);
        let poller = LongPollClient::new(server.clone(), tracker.clone(), stats.clone(), tx);
        Harness { server, tracker, stats, poller, rx }
    }

    fn drain(rx: &mut mpsc::Receiver<Item>) -> Vec<Item> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    const LIGHT_ON: &str = r#"{"members":[{"name":"Light1","state":"ON"}]}"#;

    #[tokio::test]
    async fn first_poll_publishes_second_identical_poll_does_not() {
        let mut h = harness();
        h.server.push_body(LIGHT_ON);
        h.server.push_body(LIGHT_ON);

        assert!(h.poller.poll_group("All").await);
        assert_eq!(drain(&mut h.rx), vec![Item::new("Light1", "ON")]);

        assert!(h.poller.poll_group("All").await);
        assert!(drain(&mut h.rx).is_empty());
        assert_eq!(h.stats.update_count(), 2);
    }

    #[tokio::test]
    async fn only_changed_members_are_published() {
        let mut h = harness();
        h.server.push_body(r#"{"members":[{"name":"A","state":"1"},{"name":"B","state":"1"}]}"#);
        h.server.push_body(r#"{"members":[{"name":"A","state":"1"},{"name":"B","state":"2"}]}"#);
        h.poller.poll_group("All").await;
        drain(&mut h.rx);
        h.poller.poll_group("All").await;
        assert_eq!(drain(&mut h.rx), vec![Item::new("B", "2")]);
    }

    #[tokio::test]
    async fn http_error_is_failure() {
        let mut h = harness();
        h.server.push(Reply::Status(503));
        assert!(!h.poller.poll_group("All").await);
        assert!(drain(&mut h.rx).is_empty());
        assert_eq!(h.stats.update_count(), 0);
    }

    #[tokio::test]
    async fn connection_refused_is_failure() {
        let h = harness();
        h.server.push(Reply::Refused);
        assert!(!h.poller.poll_group("All").await);
    }

    #[tokio::test]
    async fn malformed_body_is_soft_success() {
        let mut h = harness();
        h.server.push_body("not json at all");
        assert!(h.poller.poll_group("All").await);
        assert!(drain(&mut h.rx).is_empty());
        assert_eq!(h.stats.update_count(), 0);
        assert!(h.tracker.is_empty());
    }

    #[tokio::test]
    async fn successful_poll_triggers_stats_heartbeat() {
        let h = harness();
        h.server.push_body(r#"{"members":[]}"#);
        assert!(h.poller.poll_group("All").await);
        let lines = h.server.state_writes_to("ROS_STATS");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Updates:1"));
    }

    #[tokio::test]
    async fn stats_write_failure_does_not_fail_poll() {
        let mut h = harness();
        h.server.fail_writes(500);
        h.server.push_body(LIGHT_ON);
        assert!(h.poller.poll_group("All").await);
        assert_eq!(drain(&mut h.rx).len(), 1);
    }

    #[tokio::test]
    async fn closed_consumer_does_not_fail_poll() {
        let h = harness();
        drop(h.rx);
        h.server.push_body(LIGHT_ON);
        assert!(h.poller.poll_group("All").await);
        assert_eq!(h.tracker.get("Light1").as_deref(), Some("ON"));
    }
}
