//! Message-bus side of the bridge.
//!
//! The transport itself is external; the core only sees typed events arriving
//! on an mpsc channel and [`Item`] updates leaving on a bounded one.

use tokio::sync::mpsc;

use crate::rest::Item;

/// An inbound `(key, value)` pair, tagged by the topic it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// `{basename}_command`: send a command to an item (or the control key).
    Command { key: String, value: String },
    /// `{basename}_set`: overwrite an item's state.
    Set { key: String, value: String },
}

/// Topic names derived from the configured basename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub command: String,
    pub set: String,
    pub updates: String,
}

impl Topics {
    pub fn new(basename: &str) -> Self {
        Self {
            command: format!("{basename}_command"),
            set: format!("{basename}_set"),
            updates: format!("{basename}_updates"),
        }
    }

    /// Map an inbound message to a [`BusEvent`]. `None` for topics the bridge
    /// does not consume.
    pub fn route(&self, topic: &str, key: String, value: String) -> Option<BusEvent> {
        if topic == self.command {
            Some(BusEvent::Command { key, value })
        } else if topic == self.set {
            Some(BusEvent::Set { key, value })
        } else {
            None
        }
    }
}

/// Bounded channel carrying `{basename}_updates`.
pub fn updates_channel(capacity: usize) -> (mpsc::Sender<Item>, mpsc::Receiver<Item>) {
    mpsc::channel(capacity)
}
