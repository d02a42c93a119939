//! # Bridge
//!
//! Top-level wiring and the long-poll driver.
//!
//! ## What It Does
//!
//! 1. **Poll loop**: [`BridgeLoop`] long-polls the configured group forever,
//!    backing off exponentially on connectivity failures.
//! 2. **Assembly**: [`BridgeBuilder`] creates the shared [`StateTracker`] and
//!    [`StatsReporter`] and hands them to both the poll loop and the
//!    [`CommandForwarder`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! let Bridge { poll_loop, forwarder, updates, .. } = Bridge::builder(config).build()?;
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! tokio::spawn(poll_loop.run(shutdown_rx));
//! tokio::spawn(forwarder.run(events_rx));
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::backoff::BackoffScheduler;
use crate::bus::updates_channel;
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::forwarder::CommandForwarder;
use crate::poller::LongPollClient;
use crate::rest::{Item, ItemServer, RestClient};
use crate::state_tracker::StateTracker;
use crate::stats::StatsReporter;

/// Consecutive poll failures after which logging escalates from warn to error.
const ESCALATE_AFTER: u32 = 5;

/// Where the poll loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Polling,
    BackoffWait(Duration),
}

/// Drives the long-poll/backoff cycle.
pub struct BridgeLoop {
    poller: LongPollClient,
    backoff: BackoffScheduler,
    stats: Arc<StatsReporter>,
    group: String,
    consecutive_failures: u32,
}

impl BridgeLoop {
    pub fn new(
        poller: LongPollClient,
        backoff: BackoffScheduler,
        stats: Arc<StatsReporter>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            poller,
            backoff,
            stats,
            group: group.into(),
            consecutive_failures: 0,
        }
    }

    pub fn backoff(&self) -> &BackoffScheduler {
        &self.backoff
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one poll and return the state the loop moves to.
    pub async fn step(&mut self) -> LoopState {
        if self.poller.poll_group(&self.group).await {
            if self.consecutive_failures > 0 {
                info!(
                    group = %self.group,
                    failures = self.consecutive_failures,
                    "long poll recovered"
                );
            }
            self.consecutive_failures = 0;
            self.backoff.on_success();
            return LoopState::Polling;
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let delay = self.backoff.on_failure();
        let delay_ms = delay.as_millis() as u64;
        if self.consecutive_failures >= ESCALATE_AFTER {
            error!(
                group = %self.group,
                consecutive_failures = self.consecutive_failures,
                delay_ms,
                "long poll failed repeatedly, backing off"
            );
        } else {
            warn!(group = %self.group, delay_ms, "long poll failed, backing off");
        }
        LoopState::BackoffWait(delay)
    }

    /// Run until `shutdown` turns `true` (or its sender is dropped).
    ///
    /// Sends a forced stats heartbeat first. An in-flight poll or backoff
    /// sleep is abandoned as soon as shutdown is signalled.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(group = %self.group, "starting long-poll loop");
        if let Err(e) = self.stats.send_stats(true).await {
            warn!(error = %e, "startup stats heartbeat failed");
        }

        loop {
            if *shutdown.borrow() {
                break;
            }

            let state = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                state = self.step() => state,
            };

            if let LoopState::BackoffWait(delay) = state {
                tokio::select! {
                    biased;
                    _ = wait_for_shutdown(&mut shutdown) => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
        info!(group = %self.group, "long-poll loop stopped");
    }
}

// A dropped sender counts as shutdown.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Everything the binary needs to run the bridge.
pub struct Bridge {
    pub poll_loop: BridgeLoop,
    pub forwarder: Arc<CommandForwarder>,
    /// Receiving end of `{basename}_updates`.
    pub updates: mpsc::Receiver<Item>,
    pub tracker: Arc<StateTracker>,
    pub stats: Arc<StatsReporter>,
}

impl Bridge {
    pub fn builder(config: BridgeConfig) -> BridgeBuilder {
        BridgeBuilder::new(config)
    }
}

/// Builder for [`Bridge`].
///
/// Without an explicit [`server`](Self::server) a [`RestClient`] is built
/// from the configuration.
pub struct BridgeBuilder {
    config: BridgeConfig,
    server: Option<Arc<dyn ItemServer>>,
}

impl BridgeBuilder {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            server: None,
        }
    }

    pub fn server(mut self, server: Arc<dyn ItemServer>) -> Self {
        self.server = Some(server);
        self
    }

    /// # Errors
    /// Returns [`crate::error::BridgeError::Config`] when the configuration
    /// fails validation.
    pub fn build(self) -> Result<Bridge> {
        let cfg = self.config;
        cfg.validate()?;

        let server = match self.server {
            Some(server) => server,
            None => Arc::new(RestClient::from_config(&cfg)) as Arc<dyn ItemServer>,
        };

        let tracker = Arc::new(StateTracker::new());
        let stats = Arc::new(StatsReporter::new(
            Arc::clone(&server),
            cfg.stats_key.clone(),
            cfg.stats_interval(),
        ));
        let (tx, updates) = updates_channel(cfg.updates_capacity);

        let poller = LongPollClient::new(
            Arc::clone(&server),
            Arc::clone(&tracker),
            Arc::clone(&stats),
            tx,
        );
        let poll_loop = BridgeLoop::new(
            poller,
            BackoffScheduler::new(cfg.initial_delay(), cfg.max_delay()),
            Arc::clone(&stats),
            cfg.group_name.clone(),
        );
        let forwarder = Arc::new(CommandForwarder::new(
            server,
            Arc::clone(&tracker),
            Arc::clone(&stats),
            cfg.control_key.clone(),
        ));

        Ok(Bridge {
            poll_loop,
            forwarder,
            updates,
            tracker,
            stats,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
