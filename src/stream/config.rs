use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for a [`StreamClient`](super::StreamClient)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Server endpoint, e.g. "ws://127.0.0.1:8080/ws"
    ///
    /// `wss://` endpoints use rustls with the webpki root store.
    #[serde(default = "default_url")]
    pub url: String,

    /// Fixed delay between connection attempts
    /// Default: 1000 ms
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Upper bound on a single connection attempt
    /// Default: 5000 ms
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_url() -> String {
    "ws://127.0.0.1:8080/ws".to_string()
}

fn default_reconnect_interval_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl StreamConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Lifecycle of the underlying connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
}

/// Counters describing a client's connection history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    /// Connection attempts made, successful or not
    pub attempts: u64,

    /// Connection generations that reached `Open`
    pub connections: u64,

    /// Payloads transmitted
    pub sent: u64,

    /// Complete messages handed to the inbound mailbox
    pub received: u64,
}
