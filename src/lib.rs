//! Bridge between a message bus and an openHAB-style `/rest/items` API.
//!
//! Item changes are long-polled from the server and republished on the bus
//! only when they differ from what was last published; commands and state
//! writes arriving on the bus are relayed to the server.

pub mod backoff;
pub mod bridge;
pub mod bus;
pub mod cli;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod poller;
pub mod rest;
pub mod state_tracker;
pub mod stats;
pub mod stdio_bus;

pub use backoff::BackoffScheduler;
pub use bridge::{Bridge, BridgeBuilder, BridgeLoop, LoopState};
pub use bus::{BusEvent, Topics};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use forwarder::{CommandForwarder, ControlCommand, Outcome};
pub use poller::LongPollClient;
pub use rest::{Item, ItemServer, RestClient};
pub use state_tracker::StateTracker;
pub use stats::StatsReporter;
