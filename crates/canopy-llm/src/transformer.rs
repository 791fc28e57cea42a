//! OpenAI chat-completions wire format

use canopy_core::chat::{ChatChunk, ChatRequest, FinishReason};
use canopy_core::types::Message;
use serde_json::{json, Value};

use crate::error::{ConversionError, LLMError};

/// SSE payload that terminates an OpenAI stream
pub const DONE_MARKER: &str = "[DONE]";

/// OpenAI-compatible schema transformer
/// Works with OpenAI API, Azure OpenAI, and compatible servers
#[derive(Debug, Default, Clone)]
pub struct OpenAiTransformer;

impl OpenAiTransformer {
    pub fn new() -> Self {
        Self
    }

    /// Build a streaming request body
    ///
    /// A language hint becomes a leading system turn; the client's turns
    /// follow unchanged.
    pub fn transform_request(&self, request: &ChatRequest) -> Result<Value, ConversionError> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if let Some(language) = request.language_hint() {
            messages.push(serde_json::to_value(Message::system(language_instruction(language)))?);
        }

        for message in &request.messages {
            messages.push(serde_json::to_value(message)?);
        }

        Ok(json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
        }))
    }

    /// Parse one SSE `data:` payload into zero or more chunks
    pub fn parse_stream_chunk(&self, data: &str) -> Result<Vec<ChatChunk>, LLMError> {
        let chunk: Value = serde_json::from_str(data).map_err(ConversionError::from)?;

        if let Some(error) = chunk.get("error") {
            let message = error["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(LLMError::Stream(message));
        }

        if !chunk.is_object() {
            return Err(ConversionError::InvalidFormat(format!(
                "expected a JSON object, got: {}",
                data
            ))
            .into());
        }

        let mut chunks = Vec::new();
        let choice = chunk["choices"].get(0);

        if let Some(choice) = choice {
            if choice["delta"].get("role").is_some() {
                if let Some(model) = chunk["model"].as_str() {
                    chunks.push(ChatChunk::start(model));
                }
            }

            if let Some(content) = choice["delta"]["content"].as_str() {
                if !content.is_empty() {
                    chunks.push(ChatChunk::content(content));
                }
            }

            if let Some(reason) = choice["finish_reason"].as_str() {
                chunks.push(ChatChunk::finish(FinishReason::from_provider(reason)));
            }
        }

        if let Some(usage) = chunk.get("usage").filter(|u| u.is_object()) {
            chunks.push(ChatChunk::Usage {
                input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
            });
        }

        Ok(chunks)
    }
}

fn language_instruction(language: &str) -> String {
    format!("Respond in the language identified by '{}'.", language)
}
