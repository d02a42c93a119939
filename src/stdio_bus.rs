//! JSON-lines bus shim used by the binary.
//!
//! Inbound, one object per line:
//! `{"topic":"openhab_command","key":"Light1","value":"ON"}`.
//! Outbound, one object per update:
//! `{"topic":"openhab_updates","name":"Light1","state":"ON"}`.
//!
//! Input is read on a plain OS thread. A read from a terminal or an idle pipe
//! cannot be cancelled, so it must not sit on the runtime's blocking pool
//! where runtime shutdown would wait for it.

use std::io::BufRead;
use std::thread;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bus::{BusEvent, Topics};
use crate::rest::Item;

#[derive(Debug, Deserialize)]
struct InboundLine {
    topic: String,
    key: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct OutboundLine<'a> {
    topic: &'a str,
    name: &'a str,
    state: &'a str,
}

/// Parse one inbound line into an event. Blank lines, malformed JSON and
/// foreign topics yield `None`.
pub fn parse_line(topics: &Topics, line: &str) -> Option<BusEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let msg: InboundLine = match serde_json::from_str(line) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, "skipping malformed bus line");
            return None;
        }
    };
    let topic = msg.topic.clone();
    let event = topics.route(&topic, msg.key, msg.value);
    if event.is_none() {
        debug!(topic = %topic, "ignoring message on unconsumed topic");
    }
    event
}

/// Render one update as an outbound JSON line (without the newline).
pub fn render_update(topics: &Topics, item: &Item) -> String {
    let line = OutboundLine {
        topic: &topics.updates,
        name: &item.name,
        state: &item.state,
    };
    // Serializing three borrowed strings cannot fail.
    serde_json::to_string(&line).unwrap_or_default()
}

/// Read events from `reader` until EOF or until the event consumer goes away.
///
/// Blocks the calling thread. Must not be called from inside the runtime.
pub fn read_events<R: BufRead>(
    reader: R,
    topics: &Topics,
    tx: &mpsc::Sender<BusEvent>,
) -> std::io::Result<()> {
    for line in reader.lines() {
        let Some(event) = parse_line(topics, &line?) else {
            continue;
        };
        if tx.blocking_send(event).is_err() {
            break;
        }
    }
    info!("bus input closed");
    Ok(())
}

/// Run [`read_events`] on a dedicated `bus-input` thread. Read errors are
/// logged there.
///
/// The thread is detached: the process may exit while it is still blocked
/// in a read.
pub fn spawn_event_reader<R>(
    reader: R,
    topics: Topics,
    tx: mpsc::Sender<BusEvent>,
) -> std::io::Result<thread::JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new().name("bus-input".into()).spawn(move || {
        if let Err(e) = read_events(reader, &topics, &tx) {
            error!(error = %e, "bus input failed");
        }
    })
}

/// Write every update from `rx` to `writer` until the channel closes.
pub async fn pump_updates<W>(mut writer: W, topics: Topics, mut rx: mpsc::Receiver<Item>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = rx.recv().await {
        let mut line = render_update(&topics, &item);
        line.push('\n');
        let written = match writer.write_all(line.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            error!(error = %e, item = %item.name, "bus output failed");
            return Err(e);
        }
    }
    info!("updates channel closed, bus output stopping");
    Ok(())
}
