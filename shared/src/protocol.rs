//! Application messages exchanged between chat clients and the server.

use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};

/// One logical message carried by exactly one envelope.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Message {
    /// Client declares its display name.
    Handshake { name: String },
    /// Server acknowledges with the host it observed for the client.
    HandshakeAck { host: String },
    /// A chat line, or a server-formatted notice.
    Chat { text: String },
    /// Peer is leaving. Travels as an empty payload.
    Disconnect,
}

impl Message {
    pub fn chat(text: impl Into<String>) -> Self {
        Message::Chat { text: text.into() }
    }

    /// Serializes the message into an opaque payload for framing.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        match self {
            Message::Disconnect => Ok(Vec::new()),
            other => bincode::serialize(other).map_err(ChatError::Encode),
        }
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Ok(Message::Disconnect);
        }
        bincode::deserialize(payload).map_err(ChatError::Decode)
    }

    /// True when the message signals that the sender is going away.
    /// An empty chat line counts as a goodbye.
    pub fn is_leave(&self) -> bool {
        match self {
            Message::Disconnect => true,
            Message::Chat { text } => text.is_empty(),
            _ => false,
        }
    }
}
