//! Client configuration for the generation service.
//!
//! Values missing from a deserialized document use defaults. The
//! `WAYPOINT_GENERATION_URL` and `WAYPOINT_API_KEY` environment variables
//! override the defaults in [`ClientConfig::from_env`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable holding the service base URL.
pub const URL_ENV: &str = "WAYPOINT_GENERATION_URL";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "WAYPOINT_API_KEY";

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> Option<u64> {
    Some(300_000)
}

/// Where and how to reach the generation service.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Service root, without the `/v1/generate` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sent as a bearer token when present.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Ceiling for a whole streamed call. `None` disables it.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

impl ClientConfig {
    /// Create a config for `base_url` with default timeouts.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup(URL_ENV).filter(|v| !v.trim().is_empty()) {
            config.base_url = url;
        }
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            config.api_key = Some(key);
        }
        config
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Full URL of the generation endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/v1/generate", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert!(config.api_key.is_none());
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_environment_overrides() {
        let config = ClientConfig::from_lookup(|name| match name {
            URL_ENV => Some("https://gen.internal/".to_string()),
            API_KEY_ENV => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(config.endpoint(), "https://gen.internal/v1/generate");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_blank_environment_is_ignored() {
        let config = ClientConfig::from_lookup(|_| Some(String::new()));
        assert_eq!(config.base_url, "http://localhost:8080");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_partial_document() {
        let config: ClientConfig =
            serde_json::from_value(serde_json::json!({"base_url": "http://10.0.0.5"})).unwrap();
        assert_eq!(config.base_url, "http://10.0.0.5");
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ClientConfig::default().with_api_key("sk-live");
        assert!(!format!("{:?}", config).contains("sk-live"));
    }
}
