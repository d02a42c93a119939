//! Scripted in-memory [`ItemServer`] for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::ItemServer;
use crate::error::{BridgeError, Result};

/// What the next long poll should return.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Body(String),
    Status(u16),
    Refused,
}

/// A write the bridge issued against the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Write {
    Command { item: String, value: String },
    State { item: String, value: String },
}

/// Replays scripted poll replies; once the script is exhausted the poll
/// hangs like a long poll with no changes.
#[derive(Default)]
pub(crate) struct MockServer {
    replies: Mutex<VecDeque<Reply>>,
    writes: Mutex<Vec<Write>>,
    write_status: Mutex<Option<u16>>,
    failing_items: Mutex<HashMap<String, u16>>,
    polls: Mutex<usize>,
}

impl MockServer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub(crate) fn push_body(&self, body: &str) {
        self.push(Reply::Body(body.to_string()));
    }

    /// Make every subsequent write fail with `status`.
    pub(crate) fn fail_writes(&self, status: u16) {
        *self.write_status.lock().unwrap() = Some(status);
    }

    /// Make writes to `item` alone fail with `status`.
    pub(crate) fn fail_item(&self, item: &str, status: u16) {
        self.failing_items.lock().unwrap().insert(item.to_string(), status);
    }

    pub(crate) fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub(crate) fn state_writes_to(&self, key: &str) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                Write::State { item, value } if item == key => Some(value),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn poll_count(&self) -> usize {
        *self.polls.lock().unwrap()
    }

    fn record(&self, write: Write, url: String) -> Result<()> {
        let item = match &write {
            Write::Command { item, .. } | Write::State { item, .. } => item,
        };
        let failing = self.failing_items.lock().unwrap().get(item).copied();
        if let Some(status) = failing.or(*self.write_status.lock().unwrap()) {
            return Err(BridgeError::Http { status, url });
        }
        self.writes.lock().unwrap().push(write);
        Ok(())
    }
}

#[async_trait]
impl ItemServer for MockServer {
    async fn fetch_group(&self, group: &str) -> Result<String> {
        *self.polls.lock().unwrap() += 1;
        let next = self.replies.lock().unwrap().pop_front();
        let url = format!("mock://rest/items/{group}");
        match next {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Status(status)) => Err(BridgeError::Http { status, url }),
            Some(Reply::Refused) => Err(BridgeError::Connect {
                url,
                detail: "connection refused".into(),
            }),
            None => std::future::pending().await,
        }
    }

    async fn send_command(&self, item: &str, command: &str) -> Result<()> {
        self.record(
            Write::Command {
                item: item.to_string(),
                value: command.to_string(),
            },
            format!("mock://rest/items/{item}"),
        )
    }

    async fn update_state(&self, item: &str, state: &str) -> Result<()> {
        self.record(
            Write::State {
                item: item.to_string(),
                value: state.to_string(),
            },
            format!("mock://rest/items/{item}/state"),
        )
    }
}
