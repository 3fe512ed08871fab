use serde::{Deserialize, Serialize};

/// Phase of the conversational turn
///
/// Capture is armed if and only if the state is `Listening`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Listening,
    WaitingServer,
    Speaking,
}

/// Notifications published by a running session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    ListeningPartial(String),
    ListeningFinal(String),
    /// The turn was sent; a reply is pending
    ProcessingStart,
    Reply(String),
    SpeechStart(String),
    SpeechComplete,
    ReplyTimedOut,
}

/// Requests accepted by the session task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Enable,
    Disable,
    Shutdown,
}
