use serde::{Deserialize, Serialize};

/// Chat stream chunk
///
/// One event produced by a generation engine while streaming. Serialized
/// with a `type` tag, e.g. `{"type":"content","text":"Hel"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatChunk {
    /// Stream start
    Start { model: String },
    /// Text content delta
    Content { text: String },
    /// Usage information
    Usage { input_tokens: u32, output_tokens: u32 },
    /// Stream finished
    Finish { reason: FinishReason },
    /// Error occurred
    Error { message: String },
}

impl ChatChunk {
    /// Create a content chunk
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    /// Create an error chunk
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// Create a finish chunk
    pub fn finish(reason: FinishReason) -> Self {
        Self::Finish { reason }
    }

    /// Create a start chunk
    pub fn start(model: impl Into<String>) -> Self {
        Self::Start { model: model.into() }
    }

    /// Check if this is an error chunk
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Check if this is a finish chunk
    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish { .. })
    }
}

/// Reason for finishing the generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Completed naturally
    Stop,
    /// Hit token limit
    Length,
    /// Tool calls were made
    ToolCalls,
    /// Content was filtered
    ContentFilter,
}

impl FinishReason {
    /// Parse a provider finish reason; unknown values count as `Stop`
    pub fn from_provider(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "length" => Self::Length,
            "tool_calls" | "function_call" => Self::ToolCalls,
            "content_filter" => Self::ContentFilter,
            _ => Self::Stop,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::ContentFilter => "content_filter",
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
