//! # Stage: Command Forwarder
//!
//! ## Responsibility
//! Turns inbound bus events into server writes: `{basename}_command` becomes a
//! command POST and `{basename}_set` becomes a state PUT. The reserved control
//! key is intercepted and never forwarded.
//!
//! ## Guarantees
//! - Every handled event bumps the command counter, even if the write fails
//! - Command and state write failures are returned to the caller and never
//!   retried
//! - A failed stats heartbeat is logged and does not fail an event whose
//!   write succeeded
//! - [`CommandForwarder::run`] handles each event on its own task, so writes
//!   are not serialized against each other
//!
//! ## NOT Responsible For
//! - Delivery of the bus events themselves

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::bus::BusEvent;
use crate::error::Result;
use crate::rest::ItemServer;
use crate::state_tracker::StateTracker;
use crate::stats::StatsReporter;

/// Control command that drops all tracked state and republishes everything.
pub const REFRESH: &str = "REFRESH";

/// Commands accepted on the control key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Refresh,
}

impl ControlCommand {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            REFRESH => Some(ControlCommand::Refresh),
            _ => None,
        }
    }
}

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Relayed to the server as a command.
    Commanded,
    /// Relayed to the server as a state update.
    StateSet,
    /// Control command executed.
    Control(ControlCommand),
    /// Unrecognized control command; nothing was written.
    Rejected(String),
}

pub struct CommandForwarder {
    server: Arc<dyn ItemServer>,
    tracker: Arc<StateTracker>,
    stats: Arc<StatsReporter>,
    control_key: String,
}

impl CommandForwarder {
    pub fn new(
        server: Arc<dyn ItemServer>,
        tracker: Arc<StateTracker>,
        stats: Arc<StatsReporter>,
        control_key: impl Into<String>,
    ) -> Self {
        Self {
            server,
            tracker,
            stats,
            control_key: control_key.into(),
        }
    }

    pub fn control_key(&self) -> &str {
        &self.control_key
    }

    /// Handle a `{basename}_command` message.
    pub async fn on_command(&self, key: &str, value: &str) -> Result<Outcome> {
        self.stats.record_command();

        let outcome = if key == self.control_key {
            self.on_control(value).await?
        } else {
            self.server.send_command(key, value).await?;
            Outcome::Commanded
        };

        self.heartbeat(false).await;
        Ok(outcome)
    }

    /// Handle a `{basename}_set` message.
    pub async fn on_set(&self, key: &str, value: &str) -> Result<Outcome> {
        self.stats.record_command();
        self.server.update_state(key, value).await?;
        self.heartbeat(false).await;
        Ok(Outcome::StateSet)
    }

    async fn heartbeat(&self, force: bool) {
        if let Err(e) = self.stats.send_stats(force).await {
            warn!(error = %e, force, "stats heartbeat write failed");
        }
    }

    async fn on_control(&self, value: &str) -> Result<Outcome> {
        match ControlCommand::parse(value) {
            Some(ControlCommand::Refresh) => {
                info!("refresh requested, clearing tracked state");
                self.tracker.clear();
                self.heartbeat(true).await;
                Ok(Outcome::Control(ControlCommand::Refresh))
            }
            None => {
                warn!(key = %self.control_key, command = value, "unrecognized bridge control command");
                Ok(Outcome::Rejected(value.to_string()))
            }
        }
    }

    /// Dispatch one event to the matching handler.
    pub async fn dispatch(&self, event: BusEvent) -> Result<Outcome> {
        match event {
            BusEvent::Command { key, value } => self.on_command(&key, &value).await,
            BusEvent::Set { key, value } => self.on_set(&key, &value).await,
        }
    }

    /// Consume `events` until the sender side closes.
    ///
    /// Each event is handled on its own task; handler errors are logged here.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<BusEvent>) {
        while let Some(event) = events.recv().await {
            let fwd = Arc::clone(&self);
            tokio::spawn(async move {
                let label = format!("{event:?}");
                if let Err(e) = fwd.dispatch(event).await {
                    error!(event = %label, error = %e, "failed to relay bus event");
                }
            });
        }
        info!("bus event channel closed, command forwarder stopping");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
