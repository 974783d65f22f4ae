//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client can run against a
//! local backend with zero configuration.

use patte_net::SessionConfig;
use patte_shared::constants::{
    DEFAULT_API_URL, DEFAULT_BROKER_URL, DEFAULT_KEEPALIVE_SECS, DEFAULT_RECONNECT_BASE_MS,
    DEFAULT_RECONNECT_MAX_MS,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the chat and notification REST API.
    /// Env: `PATTE_API_URL`
    /// Default: `http://127.0.0.1:8080`
    pub api_url: String,

    /// WebSocket endpoint of the messaging broker.
    /// Env: `PATTE_BROKER_URL`
    /// Default: `ws://127.0.0.1:8080/ws`
    pub broker_url: String,

    /// Seconds between keepalive pings (0 disables keepalive).
    /// Env: `PATTE_KEEPALIVE_SECS`
    /// Default: `30`
    pub keepalive_secs: u64,

    /// Initial reconnect backoff delay in milliseconds.
    /// Env: `PATTE_RECONNECT_BASE_MS`
    /// Default: `500`
    pub reconnect_base_ms: u64,

    /// Reconnect backoff ceiling in milliseconds.
    /// Env: `PATTE_RECONNECT_MAX_MS`
    /// Default: `30000`
    pub reconnect_max_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            broker_url: DEFAULT_BROKER_URL.to_string(),
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
            reconnect_base_ms: DEFAULT_RECONNECT_BASE_MS,
            reconnect_max_ms: DEFAULT_RECONNECT_MAX_MS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("PATTE_API_URL") {
            config.api_url = url;
        }

        if let Ok(url) = std::env::var("PATTE_BROKER_URL") {
            config.broker_url = url;
        }

        if let Ok(val) = std::env::var("PATTE_KEEPALIVE_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.keepalive_secs = n;
            } else {
                tracing::warn!(value = %val, "Invalid PATTE_KEEPALIVE_SECS, using default");
            }
        }

        if let Ok(val) = std::env::var("PATTE_RECONNECT_BASE_MS") {
            if let Ok(n) = val.parse::<u64>() {
                config.reconnect_base_ms = n;
            } else {
                tracing::warn!(value = %val, "Invalid PATTE_RECONNECT_BASE_MS, using default");
            }
        }

        if let Ok(val) = std::env::var("PATTE_RECONNECT_MAX_MS") {
            if let Ok(n) = val.parse::<u64>() {
                config.reconnect_max_ms = n;
            } else {
                tracing::warn!(value = %val, "Invalid PATTE_RECONNECT_MAX_MS, using default");
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// Session settings for this configuration. The bearer token comes
    /// from the login flow, not the environment.
    pub fn session_config(&self, token: &str) -> SessionConfig {
        SessionConfig {
            broker_url: self.broker_url.clone(),
            token: token.to_string(),
            keepalive_secs: self.keepalive_secs,
            reconnect_base_ms: self.reconnect_base_ms,
            reconnect_max_ms: self.reconnect_max_ms,
            ..SessionConfig::default()
        }
    }
}
