use crate::config::{Config, ConfigError, ConfigResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// 配置管理器
#[derive(Clone)]
pub struct ConfigManager {
    path: PathBuf,
    config: Arc<RwLock<Config>>,
    #[cfg(feature = "hot-reload")]
    watcher: Option<Arc<std::sync::Mutex<notify::RecommendedWatcher>>>,
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("path", &self.path)
            .finish()
    }
}

impl ConfigManager {
    /// 加载配置文件
    ///
    /// A missing file is not an error: the defaults are used and a warning
    /// is logged.
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let config = if path.exists() {
            info!("Loading config from {:?}", path);
            Self::read_file(path).await?
        } else {
            warn!("Config file {:?} not found, using defaults", path);
            Config::default()
        };

        Self::validate(&config)?;

        Ok(Self::new(config, path.to_path_buf()))
    }

    /// 获取默认配置路径 (~/.canopy/config.json)
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        crate::default_config_path()
            .ok_or_else(|| ConfigError::InvalidPath("Could not find home directory".to_string()))
    }

    /// Wrap an in-memory config (tests, embedding)
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            path,
            config: Arc::new(RwLock::new(config)),
            #[cfg(feature = "hot-reload")]
            watcher: None,
        }
    }

    /// 获取配置的只读引用
    pub fn get(&self) -> Arc<RwLock<Config>> {
        Arc::clone(&self.config)
    }

    /// Clone of the current config
    pub async fn snapshot(&self) -> Config {
        self.config.read().await.clone()
    }

    /// 重新加载配置
    pub async fn reload(&self) -> ConfigResult<()> {
        if !self.path.exists() {
            return Err(ConfigError::InvalidPath(format!(
                "Config file not found: {:?}",
                self.path
            )));
        }

        let new_config = Self::read_file(&self.path).await?;
        Self::validate(&new_config)?;

        *self.config.write().await = new_config;

        info!("Config reloaded from {:?}", self.path);
        Ok(())
    }

    /// 更新配置（仅内存）
    pub async fn update<F>(&self, f: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config) -> ConfigResult<()>,
    {
        let mut config = self.config.write().await;
        let mut candidate = config.clone();
        f(&mut candidate)?;
        Self::validate(&candidate)?;
        *config = candidate;
        Ok(())
    }

    /// 验证配置
    pub fn validate(config: &Config) -> ConfigResult<()> {
        if config.server.port == 0 {
            return Err(ConfigError::Validation(
                "Server port cannot be 0".to_string(),
            ));
        }

        if config.server.max_sessions_per_connection == 0 {
            return Err(ConfigError::Validation(
                "server.max_sessions_per_connection must be greater than 0".to_string(),
            ));
        }

        if config.server.outbound_buffer == 0 {
            return Err(ConfigError::Validation(
                "server.outbound_buffer must be greater than 0".to_string(),
            ));
        }

        if config.server.max_upload_bytes == 0 {
            return Err(ConfigError::Validation(
                "server.max_upload_bytes must be greater than 0".to_string(),
            ));
        }

        if config.llm.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "llm.base_url cannot be empty".to_string(),
            ));
        }

        if config.llm.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "llm.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if config.staging.ttl_secs == Some(0) {
            return Err(ConfigError::Validation(
                "staging.ttl_secs must be greater than 0 (use null to disable expiry)".to_string(),
            ));
        }

        if config.staging.ttl_secs.is_some() && config.staging.sweep_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "staging.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    async fn read_file(path: &Path) -> ConfigResult<Config> {
        let content = tokio::fs::read_to_string(path).await?;
        let content = Self::expand_env_vars(&content)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// 展开环境变量 ${VAR} 或 ${VAR:-default}
    fn expand_env_vars(content: &str) -> ConfigResult<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let full_match = &cap[0];
            let var_expr = &cap[1];

            let (var_name, default_value) = match var_expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (var_expr, None),
            };

            let replacement = match std::env::var(var_name) {
                Ok(val) => val,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    None => return Err(ConfigError::EnvVarNotFound(var_name.to_string())),
                },
            };

            result = result.replace(full_match, &replacement);
        }

        Ok(result)
    }

    /// 获取配置文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(feature = "hot-reload")]
impl ConfigManager {
    /// 启动热重载监听
    ///
    /// Must be called from inside a tokio runtime. Invalid edits are logged
    /// and the previous config stays active.
    pub fn watch<F>(&mut self, callback: F) -> ConfigResult<()>
    where
        F: Fn() + Send + 'static,
    {
        use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    if event.kind.is_modify() {
                        let _ = tx.send(());
                    }
                }
            },
            NotifyConfig::default(),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        self.watcher = Some(Arc::new(std::sync::Mutex::new(watcher)));

        let manager = self.clone();
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                tracing::debug!("Config file changed, reloading...");
                match manager.reload().await {
                    Ok(()) => callback(),
                    Err(e) => warn!("Failed to hot-reload config: {}", e),
                }
            }
        });

        info!("Started watching config file: {:?}", self.path);
        Ok(())
    }
}
