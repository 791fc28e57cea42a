//! 结构化日志初始化

use canopy_config::LogLevel;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Pick the filter directive: explicit level, then `--debug`, then config
pub fn resolve_directive(explicit: Option<&str>, debug: bool, configured: LogLevel) -> String {
    match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(level) => level.to_string(),
        None if debug => LogLevel::Debug.to_string(),
        None => configured.to_string(),
    }
}

/// Install the global subscriber
///
/// `directive` accepts anything `EnvFilter` does, e.g. `info` or
/// `canopy_server=debug,tower_http=info`.
pub fn init_logging(directive: &str, json_format: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(directive)
        .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", directive, e))?;

    let registry = tracing_subscriber::registry().with(filter);
    if json_format {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()?;
    }

    tracing::info!("Log level set to: {}", directive);
    Ok(())
}
