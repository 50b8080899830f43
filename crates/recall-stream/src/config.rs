use std::time::Duration;

use crate::delivery::DEFAULT_COALESCE_INTERVAL;
use crate::errors::ClientError;

const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_STREAM_PATH: &str = "/api/memories/probe";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the streaming client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the upstream service.
    pub base_url: String,
    /// Path of the streaming route, joined onto `base_url`.
    pub stream_path: String,
    /// Connect timeout. No whole-request timeout is applied; a hung stream
    /// stays open until the caller cancels.
    pub connect_timeout: Duration,
    /// Answer delivery coalescing window.
    pub coalesce_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            coalesce_interval: DEFAULT_COALESCE_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Creates a config for `base_url` with default settings.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Builds a config from `RECALL_*` environment variables.
    ///
    /// - `RECALL_BASE_URL`
    /// - `RECALL_STREAM_PATH`
    /// - `RECALL_CONNECT_TIMEOUT_SECS`
    /// - `RECALL_COALESCE_MS`
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ClientError> {
        let mut config = Self::default();
        if let Some(url) = non_empty(lookup("RECALL_BASE_URL")) {
            config.base_url = url;
        }
        if let Some(path) = non_empty(lookup("RECALL_STREAM_PATH")) {
            config.stream_path = path;
        }
        if let Some(secs) = non_empty(lookup("RECALL_CONNECT_TIMEOUT_SECS")) {
            config.connect_timeout = Duration::from_secs(parse_number(
                "RECALL_CONNECT_TIMEOUT_SECS",
                &secs,
            )?);
        }
        if let Some(ms) = non_empty(lookup("RECALL_COALESCE_MS")) {
            config.coalesce_interval =
                Duration::from_millis(parse_number("RECALL_COALESCE_MS", &ms)?);
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the streaming route path.
    pub fn stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = path.into();
        self
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Overrides the answer coalescing window.
    pub fn coalesce_interval(mut self, interval: Duration) -> Self {
        self.coalesce_interval = interval;
        self
    }

    /// Checks the config is usable.
    pub fn validate(&self) -> Result<(), ClientError> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(ClientError::Config("base_url must not be empty".into()));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base_url must start with http:// or https:// (got {base})"
            )));
        }
        Ok(())
    }

    pub(crate) fn stream_url(&self) -> String {
        let base = self.base_url.trim().trim_end_matches('/');
        let path = self.stream_path.trim();
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_number(key: &str, value: &str) -> Result<u64, ClientError> {
    value
        .parse::<u64>()
        .map_err(|e| ClientError::Config(format!("{key} must be a whole number ({value}): {e}")))
}
