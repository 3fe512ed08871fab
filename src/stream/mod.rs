//! Conversation stream transport
//!
//! - `client`: resilient WebSocket client with a queued send path and an
//!   ordered inbound mailbox
//! - `config`: connection settings, state and counters
//! - `messages`: the JSON envelope exchanged with the server

pub mod client;
pub mod config;
pub mod messages;

pub use client::{Inbound, StreamClient};
pub use config::{ConnectionState, ConnectionStats, StreamConfig};
pub use messages::{CapturedImage, MessageEnvelope, ServerMessage};
