//! reqwest-backed [`ItemServer`].

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use super::ItemServer;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

pub const HEADER_TRANSPORT: &str = "X-Atmosphere-Transport";
pub const HEADER_TRACKING_ID: &str = "X-Atmosphere-tracking-id";
pub const HEADER_FRAMEWORK: &str = "X-Atmosphere-Framework";

/// `Authorization` header value for HTTP basic auth.
pub fn basic_auth_header(username: &str, password: &str) -> String {
    let cred = general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {cred}")
}

/// HTTP client for the `/rest/items` API.
///
/// One tracking id is generated per client and sent with every long poll so
/// the server can correlate successive requests. Use [`RestClientBuilder`]
/// for construction.
pub struct RestClient {
    base_url: String,
    auth_header: Option<String>,
    tracking_id: String,
    request_timeout: Duration,
    poll_timeout: Option<Duration>,
    client: reqwest::Client,
}

impl RestClient {
    /// Start building a client aimed at `base_url` (e.g. `http://localhost:8080`).
    pub fn builder(base_url: impl Into<String>) -> RestClientBuilder {
        RestClientBuilder::new(base_url)
    }

    /// Build a client from the bridge configuration.
    pub fn from_config(cfg: &BridgeConfig) -> Self {
        Self::builder(cfg.base_url())
            .credentials(&cfg.username, &cfg.password)
            .connect_timeout(cfg.connect_timeout())
            .request_timeout(cfg.request_timeout())
            .poll_timeout(cfg.poll_timeout())
            .build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tracking_id(&self) -> &str {
        &self.tracking_id
    }

    /// The item name is percent-encoded as a single path segment.
    fn item_url(&self, item: &str) -> String {
        format!("{}/rest/items/{}", self.base_url, urlencoding::encode(item))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_header {
            Some(value) => req.header(AUTHORIZATION, value),
            None => req,
        }
    }

    async fn send_checked(&self, req: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response> {
        let resp = req.send().await.map_err(|e| BridgeError::Connect {
            url: url.to_string(),
            detail: e.to_string(),
        })?;

        if !resp.status().is_success() {
            return Err(BridgeError::Http {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp)
    }

    async fn write_text(&self, req: reqwest::RequestBuilder, url: &str, body: &str) -> Result<()> {
        let req = self
            .authorize(req)
            .header(CONTENT_TYPE, "text/plain")
            .timeout(self.request_timeout)
            .body(body.to_string());
        self.send_checked(req, url).await?;
        Ok(())
    }
}

#[async_trait]
impl ItemServer for RestClient {
    async fn fetch_group(&self, group: &str) -> Result<String> {
        let url = self.item_url(group);
        let mut req = self
            .client
            .get(&url)
            .query(&[("type", "json")])
            .header(HEADER_TRANSPORT, "long-polling")
            .header(HEADER_TRACKING_ID, &self.tracking_id)
            .header(HEADER_FRAMEWORK, "1.0")
            .header(ACCEPT, "application/json");
        req = self.authorize(req);
        if let Some(t) = self.poll_timeout {
            req = req.timeout(t);
        }

        let resp = self.send_checked(req, &url).await?;

        // A body cut off mid-stream is a transport failure, not a parse failure.
        resp.text().await.map_err(|e| BridgeError::Connect {
            url,
            detail: e.to_string(),
        })
    }

    async fn send_command(&self, item: &str, command: &str) -> Result<()> {
        let url = self.item_url(item);
        debug!(item, command, "posting command");
        self.write_text(self.client.post(&url), &url, command).await
    }

    async fn update_state(&self, item: &str, state: &str) -> Result<()> {
        let url = format!("{}/state", self.item_url(item));
        debug!(item, state, "putting state");
        self.write_text(self.client.put(&url), &url, state).await
    }
}

/// Builder for [`RestClient`].
///
/// # Example
/// ```rust,ignore
/// let client = RestClient::builder("http://localhost:8080")
///     .credentials("user", "secret")
///     .request_timeout(Duration::from_secs(10))
///     .build();
/// ```
pub struct RestClientBuilder {
    base_url: String,
    auth_header: Option<String>,
    connect_timeout: Duration,
    request_timeout: Duration,
    poll_timeout: Option<Duration>,
}

impl RestClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            poll_timeout: None,
        }
    }

    /// Basic-auth credentials. An empty `username` disables the header.
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.auth_header = if username.is_empty() {
            None
        } else {
            Some(basic_auth_header(username, password))
        };
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Timeout for command and status writes (default 30 s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Timeout for the long poll. `None` (the default) waits indefinitely.
    pub fn poll_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn build(self) -> RestClient {
        // reqwest::Client::builder() can fail in extreme environments, but
        // unwrap_or_default() falls back to a default client instead of panicking.
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .unwrap_or_default();

        RestClient {
            base_url: self.base_url,
            auth_header: self.auth_header,
            tracking_id: uuid::Uuid::new_v4().to_string(),
            request_timeout: self.request_timeout,
            poll_timeout: self.poll_timeout,
            client,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
