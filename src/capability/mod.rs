//! Collaborators the session drives but does not implement
//!
//! Speech recognition, speech synthesis and image capture live outside this
//! crate. The session only sees the narrow traits below; `console` and
//! `image` provide simple implementations for the command-line binary.

pub mod console;
pub mod image;

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::stream::CapturedImage;

pub use console::{ConsoleSpeaker, StdinTranscriber};
pub use image::JpegFileCapture;

/// Notification from a transcription source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// In-progress hypothesis, fires many times per utterance
    Partial(String),
    /// Completed utterance; empty when no speech was detected
    Final(String),
}

/// Resolves exactly once when one `speak_now` playback finishes
///
/// A dropped sender means the playback was interrupted or the sink went away.
pub type PlaybackDone = oneshot::Receiver<()>;

/// Speech-to-text capture
#[async_trait::async_trait]
pub trait TranscriptionSource: Send {
    /// Begin capturing and transcribing
    async fn start_capture(&mut self) -> Result<()>;

    /// Stop capturing
    async fn stop_capture(&mut self) -> Result<()>;

    /// Check if the source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Take the transcript notification stream
    ///
    /// Returns `None` once the stream has already been handed out.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TranscriptEvent>>;

    /// Get source name for logging
    fn name(&self) -> &str;
}

/// Speech playback
#[async_trait::async_trait]
pub trait SpeechSink: Send {
    /// Interrupt any current playback and start speaking `text`
    async fn speak_now(&mut self, text: &str) -> Result<PlaybackDone>;

    /// Stop playback, if any
    async fn stop(&mut self) -> Result<()>;

    /// Get sink name for logging
    fn name(&self) -> &str;
}

/// Still image capture, synchronous and allowed to fail at any time
pub trait ImageCapture: Send {
    fn try_capture(&mut self) -> Result<CapturedImage>;
}

/// Per-turn feature switches
pub trait FeatureFlags: Send + Sync {
    /// Attach a captured image to outbound turns
    fn attach_image(&self) -> bool;
}

impl FeatureFlags for bool {
    fn attach_image(&self) -> bool {
        *self
    }
}

/// Runtime-togglable switch
impl FeatureFlags for AtomicBool {
    fn attach_image(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

impl<T: FeatureFlags + ?Sized> FeatureFlags for Arc<T> {
    fn attach_image(&self) -> bool {
        (**self).attach_image()
    }
}
