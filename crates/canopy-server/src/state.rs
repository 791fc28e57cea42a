//! 应用状态 - shared by every handler

use std::sync::Arc;
use std::time::Duration;

use canopy_config::{ConfigManager, LlmConfig, ServerConfig};
use canopy_llm::{LLMProvider, OpenAiProvider, ProviderConfig};

use crate::staging::ImageStore;
use crate::websocket::ConnectionRegistry;

/// Per-connection resource limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Sessions allowed to talk to the engine at once; the rest queue
    pub max_sessions: usize,
    /// Outbound frames buffered before writers wait
    pub outbound_buffer: usize,
}

impl ConnectionLimits {
    pub fn from_config(server: &ServerConfig) -> Self {
        Self {
            max_sessions: server.max_sessions_per_connection,
            outbound_buffer: server.outbound_buffer,
        }
    }
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    /// Live configuration (hot-reloadable)
    pub config: ConfigManager,
    /// Generation engine
    pub provider: Arc<dyn LLMProvider>,
    /// Live WebSocket connections
    pub registry: Arc<ConnectionRegistry>,
    /// Staged images
    pub images: Arc<ImageStore>,
    /// Limits applied to each new connection
    pub limits: ConnectionLimits,
}

impl AppState {
    pub fn new(
        config: ConfigManager,
        provider: Arc<dyn LLMProvider>,
        images: Arc<ImageStore>,
        limits: ConnectionLimits,
    ) -> Self {
        Self {
            config,
            provider,
            registry: Arc::new(ConnectionRegistry::new()),
            images,
            limits,
        }
    }

    /// Build the engine and staging store from the loaded config
    pub async fn from_config(config: ConfigManager) -> anyhow::Result<Self> {
        let snapshot = config.snapshot().await;

        let provider = OpenAiProvider::with_config(provider_config(&snapshot.llm))?;
        let images = ImageStore::from_config(&snapshot.staging)?;
        tracing::info!(directory = %images.dir().display(), "image staging ready");

        Ok(Self::new(
            config,
            Arc::new(provider),
            Arc::new(images),
            ConnectionLimits::from_config(&snapshot.server),
        ))
    }
}

fn provider_config(llm: &LlmConfig) -> ProviderConfig {
    let mut provider = ProviderConfig::new("openai", llm.base_url.clone())
        .with_timeout(Duration::from_secs(llm.timeout_seconds))
        .with_headers(llm.headers.clone());
    if let Some(key) = llm.api_key.as_deref().filter(|k| !k.is_empty()) {
        provider = provider.with_api_key(key);
    }
    provider
}
