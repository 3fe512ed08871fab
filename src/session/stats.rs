use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::state::SessionState;
use crate::stream::ConnectionStats;

/// Statistics about a conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    /// Current phase of the turn
    pub state: SessionState,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Envelopes handed to the stream
    pub turns_sent: usize,

    /// `reply` messages that started playback
    pub replies_received: usize,

    /// Turns that carried an image
    pub images_attached: usize,

    /// Stale, malformed, error and unknown-type messages
    pub discarded_messages: usize,

    /// Turns abandoned because no reply arrived in time
    pub timeouts: usize,

    pub connection: ConnectionStats,
}

/// Counters updated by the session task, read from anywhere
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub turns_sent: AtomicUsize,
    pub replies_received: AtomicUsize,
    pub images_attached: AtomicUsize,
    pub discarded_messages: AtomicUsize,
    pub timeouts: AtomicUsize,
}

impl SessionCounters {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(
        &self,
        session_id: &str,
        state: SessionState,
        started_at: DateTime<Utc>,
        connection: ConnectionStats,
    ) -> SessionStats {
        SessionStats {
            session_id: session_id.to_string(),
            state,
            started_at,
            turns_sent: self.turns_sent.load(Ordering::SeqCst),
            replies_received: self.replies_received.load(Ordering::SeqCst),
            images_attached: self.images_attached.load(Ordering::SeqCst),
            discarded_messages: self.discarded_messages.load(Ordering::SeqCst),
            timeouts: self.timeouts.load(Ordering::SeqCst),
            connection,
        }
    }
}
