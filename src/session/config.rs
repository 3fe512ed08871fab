use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "session-2f0c...")
    #[serde(default = "default_session_id")]
    pub session_id: String,

    /// How long to wait for a reply before listening again
    /// Default: 30000 ms; 0 waits forever
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,

    /// Attach a captured image to every outbound turn
    #[serde(default)]
    pub send_image: bool,

    /// Buffered session events per subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_session_id() -> String {
    format!("session-{}", uuid::Uuid::new_v4())
}

fn default_reply_timeout_ms() -> u64 {
    30_000
}

fn default_event_capacity() -> usize {
    64
}

impl SessionConfig {
    pub fn reply_timeout(&self) -> Option<Duration> {
        (self.reply_timeout_ms > 0).then(|| Duration::from_millis(self.reply_timeout_ms))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: default_session_id(),
            reply_timeout_ms: default_reply_timeout_ms(),
            send_image: false,
            event_capacity: default_event_capacity(),
        }
    }
}
