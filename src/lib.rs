pub mod capability;
pub mod config;
pub mod http;
pub mod session;
pub mod stream;

pub use capability::{
    ConsoleSpeaker, FeatureFlags, ImageCapture, JpegFileCapture, PlaybackDone, SpeechSink,
    StdinTranscriber, TranscriptEvent, TranscriptionSource,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use session::{
    SessionConfig, SessionController, SessionEvent, SessionHandle, SessionState, SessionStats,
};
pub use stream::{
    CapturedImage, ConnectionState, ConnectionStats, Inbound, MessageEnvelope, ServerMessage,
    StreamClient, StreamConfig,
};
