use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::handle::SessionHandle;
use super::state::{SessionCommand, SessionEvent, SessionState};
use super::stats::SessionCounters;
use crate::capability::{
    FeatureFlags, ImageCapture, PlaybackDone, SpeechSink, TranscriptEvent, TranscriptionSource,
};
use crate::stream::{Inbound, MessageEnvelope, ServerMessage, StreamClient};

/// Drives listen → send → wait → speak → listen over a [`StreamClient`]
///
/// Every state transition and every collaborator call happens on the task
/// running [`SessionController::run`]. Network tasks only publish into the
/// inbound mailbox, so the state machine is never entered concurrently.
pub struct SessionController {
    config: SessionConfig,
    started_at: DateTime<Utc>,

    stream: StreamClient,
    inbound: Inbound,
    inbound_open: bool,

    transcriber: Box<dyn TranscriptionSource>,
    transcripts: mpsc::UnboundedReceiver<TranscriptEvent>,
    speech: Box<dyn SpeechSink>,
    camera: Option<Box<dyn ImageCapture>>,
    flags: Arc<dyn FeatureFlags>,

    state: SessionState,
    /// The single in-flight playback
    playback: Option<PlaybackDone>,
    reply_deadline: Option<Instant>,

    state_tx: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    counters: Arc<SessionCounters>,
}

/// Collects collaborators for a [`SessionController`]
pub struct SessionControllerBuilder {
    config: SessionConfig,
    stream: StreamClient,
    inbound: Inbound,
    transcriber: Option<Box<dyn TranscriptionSource>>,
    speech: Option<Box<dyn SpeechSink>>,
    camera: Option<Box<dyn ImageCapture>>,
    flags: Option<Arc<dyn FeatureFlags>>,
}

impl SessionControllerBuilder {
    pub fn transcriber(mut self, source: impl TranscriptionSource + 'static) -> Self {
        self.transcriber = Some(Box::new(source));
        self
    }

    pub fn speech(mut self, sink: impl SpeechSink + 'static) -> Self {
        self.speech = Some(Box::new(sink));
        self
    }

    pub fn camera(mut self, camera: impl ImageCapture + 'static) -> Self {
        self.camera = Some(Box::new(camera));
        self
    }

    /// Override `SessionConfig::send_image` with a live switch
    pub fn flags(mut self, flags: Arc<dyn FeatureFlags>) -> Self {
        self.flags = Some(flags);
        self
    }

    /// Validate collaborators and create the controller
    ///
    /// A missing transcription source or speech sink is fatal.
    pub fn build(self) -> Result<SessionController> {
        let Some(mut transcriber) = self.transcriber else {
            bail!("Session {} has no transcription source", self.config.session_id);
        };
        let Some(speech) = self.speech else {
            bail!("Session {} has no speech output", self.config.session_id);
        };

        let transcripts = transcriber.take_events().with_context(|| {
            format!(
                "Transcription source '{}' has no notification stream",
                transcriber.name()
            )
        })?;

        if self.camera.is_none() {
            info!("No image capture configured (image sending disabled)");
        }

        let send_image = self.config.send_image;
        let flags = self
            .flags
            .unwrap_or_else(|| Arc::new(send_image) as Arc<dyn FeatureFlags>);
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));

        info!(
            "Created session {} (transcription: {}, speech: {})",
            self.config.session_id,
            transcriber.name(),
            speech.name()
        );

        Ok(SessionController {
            config: self.config,
            started_at: Utc::now(),
            stream: self.stream,
            inbound: self.inbound,
            inbound_open: true,
            transcriber,
            transcripts,
            speech,
            camera: self.camera,
            flags,
            state: SessionState::Idle,
            playback: None,
            reply_deadline: None,
            state_tx,
            events,
            counters: Arc::new(SessionCounters::default()),
        })
    }
}

impl SessionController {
    /// Start building a controller around a stream client and its mailbox
    pub fn builder(
        config: SessionConfig,
        stream: StreamClient,
        inbound: Inbound,
    ) -> SessionControllerBuilder {
        SessionControllerBuilder {
            config,
            stream,
            inbound,
            transcriber: None,
            speech: None,
            camera: None,
            flags: None,
        }
    }

    /// Move the controller onto its own task and return a handle to it
    pub fn spawn(self) -> SessionHandle {
        let (commands, command_rx) = mpsc::unbounded_channel();

        let handle = SessionHandle::new(
            self.config.session_id.clone(),
            self.started_at,
            commands,
            self.state_tx.subscribe(),
            self.events.clone(),
            Arc::clone(&self.counters),
            self.stream.clone(),
        );

        tokio::spawn(self.run(command_rx));

        handle
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Consumer loop: the only place session state changes
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        info!("Session {} running", self.config.session_id);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Enable) => self.enable().await,
                    Some(SessionCommand::Disable) => self.disable().await,
                    Some(SessionCommand::Shutdown) | None => break,
                },
                event = self.transcripts.recv() => match event {
                    Some(event) => self.handle_transcript(event).await,
                    None => {
                        error!(
                            "Transcription source '{}' stopped; shutting session down",
                            self.transcriber.name()
                        );
                        break;
                    }
                },
                message = self.inbound.recv(), if self.inbound_open => match message {
                    Some(raw) => self.handle_server_message(&raw).await,
                    None => {
                        warn!("Stream mailbox closed; no further replies will arrive");
                        self.inbound_open = false;
                    }
                },
                finished = playback_finished(&mut self.playback) => {
                    self.playback = None;
                    if finished.is_err() {
                        warn!("Playback ended without a completion signal");
                    }
                    self.finish_speaking().await;
                },
                _ = reply_deadline(self.reply_deadline) => self.reply_timed_out().await,
            }
        }

        self.disable().await;
        self.stream.close().await;
        info!("Session {} stopped", self.config.session_id);
    }

    /// Idle → Listening
    pub async fn enable(&mut self) {
        if self.state != SessionState::Idle {
            debug!("Session already enabled ({:?})", self.state);
            return;
        }

        info!("Enabling session {}", self.config.session_id);
        self.stream.start();
        self.arm_listening().await;
    }

    /// Any state → Idle, cancelling playback and capture
    pub async fn disable(&mut self) {
        if self.playback.take().is_some() || self.state == SessionState::Speaking {
            if let Err(e) = self.speech.stop().await {
                warn!("Failed to stop playback: {:#}", e);
            }
        }

        self.reply_deadline = None;
        self.disarm_listening().await;

        if self.state != SessionState::Idle {
            info!("Session {} disabled", self.config.session_id);
        }
        self.set_state(SessionState::Idle);
    }

    pub async fn handle_transcript(&mut self, event: TranscriptEvent) {
        match event {
            TranscriptEvent::Partial(text) => {
                if self.state != SessionState::Listening {
                    return;
                }
                debug!("[Partial] {}", text);
                self.emit(SessionEvent::ListeningPartial(text));
            }
            TranscriptEvent::Final(text) => self.finish_utterance(text).await,
        }
    }

    /// Listening → WaitingServer for a non-empty final transcript
    async fn finish_utterance(&mut self, text: String) {
        if self.state != SessionState::Listening {
            debug!("Ignoring final transcript while {:?}", self.state);
            return;
        }

        if text.trim().is_empty() {
            info!("Empty transcription received; ignoring");
            self.arm_listening().await;
            return;
        }

        self.disarm_listening().await;

        self.emit(SessionEvent::ListeningFinal(text.clone()));
        self.emit(SessionEvent::ProcessingStart);

        let envelope = self.build_envelope(&text);
        let payload = match envelope.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Dropping turn: {:#}", e);
                self.arm_listening().await;
                return;
            }
        };

        self.stream.send(payload);
        SessionCounters::bump(&self.counters.turns_sent);

        self.reply_deadline = self
            .config
            .reply_timeout()
            .map(|timeout| Instant::now() + timeout);
        self.set_state(SessionState::WaitingServer);

        info!("→ Server: {}", text);
    }

    /// Text-only unless the image flag is set and a capture succeeds
    fn build_envelope(&mut self, text: &str) -> MessageEnvelope {
        let envelope = MessageEnvelope::stt_final(text);

        if !self.flags.attach_image() {
            return envelope;
        }

        let Some(camera) = self.camera.as_mut() else {
            warn!("Image sending requested but no image capture is configured; sending text only");
            return envelope;
        };

        match camera.try_capture() {
            Ok(image) if !image.jpeg.is_empty() => {
                SessionCounters::bump(&self.counters.images_attached);
                debug!(
                    "Attaching {}x{} image ({} bytes)",
                    image.width,
                    image.height,
                    image.jpeg.len()
                );
                envelope.with_image(&image)
            }
            Ok(_) => {
                warn!("Image capture returned empty bytes; sending text only");
                envelope
            }
            Err(e) => {
                warn!("Image capture failed: {:#}; sending text only", e);
                envelope
            }
        }
    }

    pub async fn handle_server_message(&mut self, raw: &str) {
        if !matches!(
            self.state,
            SessionState::WaitingServer | SessionState::Speaking
        ) {
            debug!("Discarding server message while {:?}", self.state);
            SessionCounters::bump(&self.counters.discarded_messages);
            return;
        }

        let message = match ServerMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Server message (raw): {} ({:#})", raw, e);
                SessionCounters::bump(&self.counters.discarded_messages);
                return;
            }
        };

        match message {
            ServerMessage::Reply(text) => self.start_speaking(text).await,
            ServerMessage::Error(message) => {
                warn!("Server reported an error: {}", message);
                SessionCounters::bump(&self.counters.discarded_messages);
            }
            ServerMessage::Other(kind) => {
                warn!("Unknown server message type: {}", kind);
                SessionCounters::bump(&self.counters.discarded_messages);
            }
        }
    }

    /// WaitingServer/Speaking → Speaking, replacing any in-flight playback
    async fn start_speaking(&mut self, text: String) {
        SessionCounters::bump(&self.counters.replies_received);
        self.reply_deadline = None;

        info!("← Server: {}", text);
        self.emit(SessionEvent::Reply(text.clone()));

        if self.playback.take().is_some() {
            debug!("Interrupting previous playback");
        }

        self.set_state(SessionState::Speaking);
        if self.transcriber.is_capturing() {
            self.disarm_listening().await;
        }

        self.emit(SessionEvent::SpeechStart(text.clone()));

        match self.speech.speak_now(&text).await {
            Ok(done) => self.playback = Some(done),
            Err(e) => {
                error!("Speech playback failed: {:#}", e);
                self.finish_speaking().await;
            }
        }
    }

    /// Speaking → Listening
    async fn finish_speaking(&mut self) {
        if self.state != SessionState::Speaking {
            return;
        }

        self.emit(SessionEvent::SpeechComplete);
        self.arm_listening().await;
    }

    async fn reply_timed_out(&mut self) {
        self.reply_deadline = None;
        if self.state != SessionState::WaitingServer {
            return;
        }

        warn!(
            "No reply within {} ms; listening again",
            self.config.reply_timeout_ms
        );
        SessionCounters::bump(&self.counters.timeouts);
        self.emit(SessionEvent::ReplyTimedOut);
        self.arm_listening().await;
    }

    async fn arm_listening(&mut self) {
        if let Err(e) = self.transcriber.start_capture().await {
            error!(
                "Failed to start capture on '{}': {:#}; session idle until re-enabled",
                self.transcriber.name(),
                e
            );
            self.set_state(SessionState::Idle);
            return;
        }

        self.set_state(SessionState::Listening);
        info!("Listening…");
    }

    async fn disarm_listening(&mut self) {
        if let Err(e) = self.transcriber.stop_capture().await {
            warn!(
                "Failed to stop capture on '{}': {:#}",
                self.transcriber.name(),
                e
            );
        }
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }

        debug!("Session state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.state_tx.send_replace(next);
        self.emit(SessionEvent::StateChanged(next));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

async fn playback_finished(
    playback: &mut Option<PlaybackDone>,
) -> Result<(), oneshot::error::RecvError> {
    match playback {
        Some(done) => done.await,
        None => std::future::pending().await,
    }
}

async fn reply_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
