use async_trait::async_trait;
use canopy_core::chat::ChatRequest;
use eventsource_stream::Eventsource;
use futures::{future, stream, TryStreamExt};
use reqwest::{header, Client, StatusCode};
use std::sync::Arc;
use tracing::debug;

use crate::error::{LLMError, Result};
use crate::provider::{LLMProvider, LLMStream, ProviderConfig};
use crate::transformer::{OpenAiTransformer, DONE_MARKER};

/// OpenAI Provider
/// Streams from the OpenAI API or any compatible `/chat/completions` endpoint.
///
/// Requests are sent once; failures surface to the caller without retry.
pub struct OpenAiProvider {
    config: ProviderConfig,
    http_client: Client,
    transformer: Arc<OpenAiTransformer>,
}

impl OpenAiProvider {
    /// Create with custom configuration
    pub fn with_config(config: ProviderConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LLMError::Config(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
            transformer: Arc::new(OpenAiTransformer::new()),
        })
    }

    /// Create a provider for the public OpenAI API
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(ProviderConfig::new("openai", "https://api.openai.com/v1").with_api_key(api_key))
    }

    /// Get the config
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Build request headers
    fn build_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("text/event-stream"));

        if let Some(key) = &self.config.api_key {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| LLMError::Config(format!("Invalid API key header: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        for (key, value) in &self.config.headers {
            let header_name = header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| LLMError::Config(format!("Invalid header name: {}", e)))?;
            let header_value = header::HeaderValue::from_str(value)
                .map_err(|e| LLMError::Config(format!("Invalid header value: {}", e)))?;
            headers.insert(header_name, header_value);
        }

        Ok(headers)
    }
}

async fn status_error(response: reqwest::Response) -> LLMError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    let error_text = response.text().await.unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LLMError::Auth(error_text),
        StatusCode::TOO_MANY_REQUESTS => LLMError::RateLimited {
            retry_after: retry_after.unwrap_or(60),
        },
        _ => LLMError::Api {
            status: status.as_u16(),
            message: error_text,
        },
    }
}

#[async_trait]
impl LLMProvider for OpenAiProvider {
    fn provider_id(&self) -> &str {
        &self.config.provider_id
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<LLMStream> {
        let body = self.transformer.transform_request(&request)?;
        let headers = self.build_headers()?;
        let url = self.config.completions_url();

        debug!(model = %request.model, turns = request.messages.len(), "opening completion stream");

        let response = self
            .http_client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let transformer = self.transformer.clone();
        let stream = response
            .bytes_stream()
            .eventsource()
            .map_err(|e| LLMError::Stream(e.to_string()))
            .try_take_while(|event| future::ready(Ok(event.data.trim() != DONE_MARKER)))
            .and_then(move |event| {
                let parsed = transformer
                    .parse_stream_chunk(event.data.trim())
                    .map(|chunks| stream::iter(chunks.into_iter().map(Ok::<_, LLMError>)));
                future::ready(parsed)
            })
            .try_flatten();

        Ok(Box::pin(stream))
    }
}
