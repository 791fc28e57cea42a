//! WebSocket protocol definitions
//!
//! Inbound frames are chat requests; outbound frames are engine events
//! flattened into an envelope that carries the request's correlation id.

use canopy_core::chat::{ChatChunk, ChatRequest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message sent from client to server
///
/// `{"model":"m1","messages":[...],"language":"en","request_id":"r1"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest {
    /// Optional correlation id echoed on every reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub chat: ChatRequest,
}

impl ClientRequest {
    /// Parse one text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Split into a correlation id and the engine request
    ///
    /// A missing or blank `request_id` is replaced by a fresh UUID.
    pub fn into_parts(self) -> (String, ChatRequest) {
        let request_id = self
            .request_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        (request_id, self.chat)
    }
}

/// Event sent from server to client
///
/// `{"request_id":"r1","type":"content","text":"a"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Absent only on errors for frames that could not be parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub event: ChatChunk,
}

impl Envelope {
    pub fn new(request_id: impl Into<String>, event: ChatChunk) -> Self {
        Self {
            request_id: Some(request_id.into()),
            event,
        }
    }

    pub fn error(request_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            request_id,
            event: ChatChunk::error(message),
        }
    }

    /// Serialize to a text frame payload
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Protocol errors for inbound frames
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid request: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Binary frames are not supported")]
    Binary,
}
