use anyhow::{bail, Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Envelope type sent when the user finishes an utterance
pub const STT_FINAL: &str = "stt_final";

/// Envelope type carrying the agent's answer
pub const REPLY: &str = "reply";

/// Envelope type the server uses to report a failed request
pub const ERROR: &str = "error";

/// A still image captured alongside a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    /// JPEG-encoded bytes
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Wire payload exchanged over the conversation stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub text: String,

    /// Base64-encoded JPEG
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_b64: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_w: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_h: Option<u32>,

    /// Error description, only present on `error` envelopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Classification of an inbound envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Reply(String),
    Error(String),
    /// Any other `type`; accepted on the wire, ignored by the session
    Other(String),
}

/// Lenient view of a server frame: only `type`, `text` and `message` are read
#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    #[serde(rename = "type")]
    kind: String,

    #[serde(default)]
    text: Option<String>,

    #[serde(default)]
    message: Option<serde_json::Value>,
}

impl ServerMessage {
    /// Parse a server frame
    ///
    /// A missing or null `text` becomes an empty string. Fields other than
    /// `type`, `text` and `message` are ignored whatever their JSON type.
    pub fn parse(raw: &str) -> Result<Self> {
        let inbound: InboundEnvelope =
            serde_json::from_str(raw).context("Malformed server message")?;
        if inbound.kind.is_empty() {
            bail!("Server message has an empty type");
        }

        let text = inbound.text.unwrap_or_default();
        Ok(match inbound.kind.as_str() {
            REPLY => Self::Reply(text),
            ERROR => Self::Error(match inbound.message {
                Some(serde_json::Value::String(message)) => message,
                Some(serde_json::Value::Null) | None => text,
                Some(other) => other.to_string(),
            }),
            _ => Self::Other(inbound.kind),
        })
    }
}

impl MessageEnvelope {
    /// Build a text-only `stt_final` envelope
    pub fn stt_final(text: impl Into<String>) -> Self {
        Self {
            kind: STT_FINAL.to_string(),
            text: text.into(),
            image_b64: None,
            image_w: None,
            image_h: None,
            message: None,
        }
    }

    /// Build a `reply` envelope (server side, used by tests and tooling)
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            kind: REPLY.to_string(),
            ..Self::stt_final(text)
        }
    }

    /// Attach a captured image, base64-encoding its bytes
    pub fn with_image(mut self, image: &CapturedImage) -> Self {
        self.image_b64 = Some(base64::engine::general_purpose::STANDARD.encode(&image.jpeg));
        self.image_w = Some(image.width);
        self.image_h = Some(image.height);
        self
    }

    pub fn has_image(&self) -> bool {
        self.image_b64.is_some()
    }

    /// Serialize to a single JSON text frame
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize envelope")
    }

    /// Strictly parse a full envelope, image fields included
    ///
    /// A missing `text` field becomes an empty string. Server frames go
    /// through [`ServerMessage::parse`] instead.
    pub fn parse(raw: &str) -> Result<Self> {
        let envelope: Self = serde_json::from_str(raw).context("Malformed envelope")?;
        if envelope.kind.is_empty() {
            bail!("Envelope has an empty type");
        }
        Ok(envelope)
    }

    /// Decode the attached image, if any
    pub fn image(&self) -> Result<Option<CapturedImage>> {
        let Some(b64) = &self.image_b64 else {
            return Ok(None);
        };

        let jpeg = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .context("Invalid image_b64")?;

        Ok(Some(CapturedImage {
            jpeg,
            width: self.image_w.unwrap_or(0),
            height: self.image_h.unwrap_or(0),
        }))
    }

    pub fn into_server_message(self) -> ServerMessage {
        match self.kind.as_str() {
            REPLY => ServerMessage::Reply(self.text),
            ERROR => ServerMessage::Error(self.message.unwrap_or(self.text)),
            _ => ServerMessage::Other(self.kind),
        }
    }
}
