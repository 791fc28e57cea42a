use async_trait::async_trait;
use canopy_core::chat::{ChatChunk, ChatRequest};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{LLMError, Result};

/// Type alias for LLM stream
///
/// Finite and single-use: it ends when the engine signals completion, and a
/// new request is needed to stream again.
pub type LLMStream = Pin<Box<dyn Stream<Item = std::result::Result<ChatChunk, LLMError>> + Send>>;

/// A generation engine producing a stream of events for one request
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Short identifier used in logs
    fn provider_id(&self) -> &str;

    /// Open a response stream for `request`
    async fn chat_stream(&self, request: ChatRequest) -> Result<LLMStream>;
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider ID
    pub provider_id: String,
    /// Base URL for the API, without the `/chat/completions` suffix
    pub base_url: String,
    /// Bearer API key
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
    /// Additional headers to include
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

impl ProviderConfig {
    /// Create a new provider config
    pub fn new(provider_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            base_url: base_url.into(),
            api_key: None,
            timeout: default_timeout(),
            headers: HashMap::new(),
        }
    }

    /// Set API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set additional headers
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Full chat completions endpoint
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url_trims_slash() {
        let config = ProviderConfig::new("openai", "http://localhost:8000/v1/");
        assert_eq!(config.completions_url(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn test_builder() {
        let config = ProviderConfig::new("openai", "https://api.openai.com/v1")
            .with_api_key("sk-test")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
