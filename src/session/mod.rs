//! Conversation session management
//!
//! This module provides the `SessionController` state machine that drives:
//! - Transcription capture (armed only while listening)
//! - Turn construction, optionally with a captured image
//! - Waiting for the server's reply over the stream client
//! - Speech playback and re-arming capture when it completes

mod config;
mod controller;
mod handle;
mod state;
mod stats;

pub use config::SessionConfig;
pub use controller::{SessionController, SessionControllerBuilder};
pub use handle::SessionHandle;
pub use state::{SessionCommand, SessionEvent, SessionState};
pub use stats::SessionStats;
