//! # Rest
//!
//! The item server seam and its HTTP implementation.
//!
//! ## What It Does
//!
//! 1. **Long poll**: `GET /rest/items/{group}?type=json` with Atmosphere
//!    long-polling headers; the server holds the request open until a member
//!    of the group changes.
//! 2. **Command write**: `POST /rest/items/{item}` with the raw command body.
//! 3. **Status write**: `PUT /rest/items/{item}/state` with the raw state body.
//!
//! The core only sees [`ItemServer`]; [`RestClient`] is the reqwest-backed
//! implementation used by the binary.

use async_trait::async_trait;

use crate::error::Result;

pub mod client;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{RestClient, RestClientBuilder};
pub use types::{parse_group, GroupResponse, Item};

/// Operations the bridge needs from the home-automation server.
#[async_trait]
pub trait ItemServer: Send + Sync {
    /// Block until the server reports the group's members and return the raw
    /// response body. Non-2xx statuses and transport failures are errors.
    async fn fetch_group(&self, group: &str) -> Result<String>;

    /// Send `command` to `item`.
    async fn send_command(&self, item: &str, command: &str) -> Result<()>;

    /// Overwrite the state of `item` without issuing a command.
    async fn update_state(&self, item: &str, state: &str) -> Result<()>;
}
