use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

use super::state::{SessionCommand, SessionEvent, SessionState};
use super::stats::{SessionCounters, SessionStats};
use crate::stream::StreamClient;

/// Cloneable remote control for a spawned session
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    started_at: DateTime<Utc>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    counters: Arc<SessionCounters>,
    stream: StreamClient,
}

impl SessionHandle {
    pub(crate) fn new(
        session_id: String,
        started_at: DateTime<Utc>,
        commands: mpsc::UnboundedSender<SessionCommand>,
        state: watch::Receiver<SessionState>,
        events: broadcast::Sender<SessionEvent>,
        counters: Arc<SessionCounters>,
        stream: StreamClient,
    ) -> Self {
        Self {
            session_id,
            started_at,
            commands,
            state,
            events,
            counters,
            stream,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Start listening (no-op unless idle)
    pub fn enable(&self) -> Result<()> {
        self.command(SessionCommand::Enable)
    }

    /// Cancel playback, stop capture and go idle
    pub fn disable(&self) -> Result<()> {
        self.command(SessionCommand::Disable)
    }

    /// Stop the session task and close the stream, waiting for both
    pub async fn shutdown(&self) {
        // The task may already be gone
        let _ = self.command(SessionCommand::Shutdown);

        let mut state = self.state.clone();
        while state.changed().await.is_ok() {}
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session reaches `target`
    pub async fn wait_for_state(&self, target: SessionState) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .with_context(|| format!("Session stopped before reaching {:?}", target))
    }

    /// Subscribe to session events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot(
            &self.session_id,
            self.state(),
            self.started_at,
            self.stream.stats(),
        )
    }

    pub fn stream(&self) -> &StreamClient {
        &self.stream
    }

    fn command(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("Session {} is not running", self.session_id))
    }
}
