use std::path::PathBuf;

use anyhow::Context;
use canopy_config::ConfigManager;
use canopy_server::logging::{init_logging, resolve_directive};
use canopy_server::{run_server, AppState};
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "canopy-server")]
#[command(about = "Canopy streaming chat relay")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, env = "DEBUG", default_value = "false")]
    debug: bool,

    /// Listen address (overrides config)
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Server port (overrides config)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Engine API base URL (overrides config)
    #[arg(long, env = "LLM_BASE_URL")]
    llm_base_url: Option<String>,

    /// Engine API key (overrides config)
    #[arg(long, env = "LLM_API_KEY")]
    api_key: Option<String>,

    /// Log level or filter directive (overrides config)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Config file path [default: ~/.canopy/config.json]
    #[arg(long, env = "CANOPY_CONFIG")]
    config: Option<String>,

    /// Disable config hot-reload
    #[arg(long, default_value = "false")]
    no_watch: bool,
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match self.config.clone().or_else(|| std::env::var("CONFIG_FILE").ok()) {
            Some(path) => Ok(canopy_config::expand_tilde(&path).unwrap_or_else(|| PathBuf::from(&path))),
            None => Ok(ConfigManager::default_config_path()?),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config_path = cli.config_path()?;
    let config_manager = ConfigManager::load(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // CLI 参数覆盖配置文件
    let overrides = cli.clone();
    config_manager
        .update(move |config| {
            if let Some(host) = overrides.host {
                config.server.host = host;
            }
            if let Some(port) = overrides.port {
                config.server.port = port;
            }
            if let Some(base_url) = overrides.llm_base_url {
                config.llm.base_url = base_url;
            }
            if let Some(api_key) = overrides.api_key {
                config.llm.api_key = Some(api_key);
            }
            Ok(())
        })
        .await
        .context("Invalid command-line override")?;

    let config = config_manager.snapshot().await;

    // 初始化日志
    let directive = resolve_directive(cli.log_level.as_deref(), cli.debug, config.logging.level);
    init_logging(&directive, config.logging.json_format)?;

    tracing::info!("Config: {:?}", config_path);
    tracing::info!("Engine base URL: {}", config.llm.base_url);
    tracing::debug!(
        host = %config.server.host,
        port = config.server.port,
        cors = config.server.cors,
        max_sessions_per_connection = config.server.max_sessions_per_connection,
        staging_ttl_secs = ?config.staging.ttl_secs,
        "server configuration"
    );

    // 启动热重载（如果未禁用）
    #[cfg(feature = "hot-reload")]
    let config_manager = {
        let mut manager = config_manager;
        if !cli.no_watch && config_path.exists() {
            if let Err(e) = manager.watch(|| {
                tracing::info!("Config hot-reloaded");
            }) {
                tracing::warn!("Failed to start config watcher: {}", e);
            }
        }
        manager
    };

    let state = AppState::from_config(config_manager).await?;
    run_server(state).await
}
