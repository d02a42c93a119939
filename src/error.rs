//! Crate-level error type.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while talking to the item server or loading config.
///
/// Each variant carries enough context to diagnose the failure without
/// needing to inspect the originating error directly.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A TCP-level connection could not be established, or the transport
    /// failed mid-request.
    #[error("connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },

    /// The server replied with a non-2xx HTTP status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Response body could not be parsed as the expected JSON structure.
    #[error("JSON parse error on field '{field}': {detail}")]
    Json { field: String, detail: String },

    /// Configuration is present but unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BridgeError {
    /// `true` for failures that mean the server could not be reached or
    /// refused the request, as opposed to local parse/config problems.
    pub fn is_transport(&self) -> bool {
        matches!(self, BridgeError::Connect { .. } | BridgeError::Http { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
