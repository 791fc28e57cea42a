//! Canopy core types
//!
//! Conversation turns passed through to the generation engine, the request
//! shape a streaming session is opened with, and the events an engine
//! produces while it streams.

pub mod chat;
pub mod types;

pub use chat::{ChatChunk, ChatRequest, FinishReason};
pub use types::{Content, ContentPart, ImageUrl, Message, Role};
