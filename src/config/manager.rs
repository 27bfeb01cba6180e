//! Configuration Manager

use super::Config;
use crate::address::{normalize_bind_addr, replace_port};
use crate::Result;
use anyhow::{bail, Context};
use std::path::Path;
use std::time::Duration;

const MAX_RECORD_SIZE_LIMIT: usize = 16 * 1024 * 1024;
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(10);
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Loads configuration from files and the environment
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from a TOML file, falling back to defaults if it is missing
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config.validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from `LINESINK_*` environment variables over defaults
    pub fn load_from_env() -> Result<Config> {
        Self::load_from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`load_from_env`](Self::load_from_env) with an injectable lookup
    pub fn load_from_vars<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        apply_vars(&mut config, &lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the layered configuration: defaults, then `LINESINK_*`
    /// environment variables, then the TOML file at `path` if it exists.
    /// Keys set in the file win over the environment.
    pub fn load_layered(path: &Path) -> Result<Config> {
        Self::load_layered_with_vars(path, |key| std::env::var(key).ok())
    }

    /// Same as [`load_layered`](Self::load_layered) with an injectable lookup
    pub fn load_layered_with_vars<F>(path: &Path, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        apply_vars(&mut config, &lookup)?;

        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let overlay: toml::Value = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            let mut base = toml::Value::try_from(&config)
                .context("Failed to serialize configuration")?;
            merge_toml(&mut base, overlay);

            config = base
                .try_into()
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        } else {
            tracing::warn!(
                "Configuration file not found at {}, using environment and defaults",
                path.display()
            );
        }

        config.validate()
            .with_context(|| "Configuration validation failed")?;
        Ok(config)
    }
}

fn apply_vars<F>(config: &mut Config, lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(bind_addr) = lookup("LINESINK_BIND_ADDR") {
        config.server.bind_addr = bind_addr;
    }

    if let Some(size) = lookup("LINESINK_MAX_RECORD_SIZE") {
        config.server.max_record_size = size.parse::<usize>()
            .with_context(|| format!("Invalid LINESINK_MAX_RECORD_SIZE: {}", size))?;
    }

    if let Some(backoff) = lookup("LINESINK_ACCEPT_BACKOFF") {
        config.server.accept_error_backoff = humantime::parse_duration(&backoff)
            .with_context(|| format!("Invalid LINESINK_ACCEPT_BACKOFF: {}", backoff))?;
    }

    if let Some(level) = lookup("LINESINK_LOG_LEVEL") {
        config.logging.level = level;
    }

    Ok(())
}

/// Recursively overlay `overlay` onto `base`; tables merge key by key,
/// any other value replaces what was there.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_logging_config()
            .with_context(|| "Logging configuration validation failed")?;

        Ok(())
    }

    fn validate_server_config(&self) -> Result<()> {
        normalize_bind_addr(&self.server.bind_addr)?;

        if self.server.max_record_size == 0 {
            bail!("max_record_size must be greater than 0");
        }

        if self.server.max_record_size > MAX_RECORD_SIZE_LIMIT {
            bail!("max_record_size cannot exceed 16MB");
        }

        if self.server.accept_error_backoff > MAX_ACCEPT_BACKOFF {
            bail!("accept_error_backoff cannot exceed {:?}", MAX_ACCEPT_BACKOFF);
        }

        Ok(())
    }

    fn validate_logging_config(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            bail!("logging.level must be one of: {}", VALID_LOG_LEVELS.join(", "));
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        port: Option<u16>,
        log_level: Option<&str>,
        max_record_size: Option<usize>,
    ) {
        if let Some(bind) = bind {
            self.server.bind_addr = bind.to_string();
            tracing::info!("CLI override: bind address set to {}", bind);
        }

        if let Some(port) = port {
            self.server.bind_addr = replace_port(&self.server.bind_addr, port);
            tracing::info!("CLI override: port set to {}", port);
        }

        if let Some(level) = log_level {
            self.logging.level = level.to_string();
        }

        if let Some(size) = max_record_size {
            self.server.max_record_size = size;
            tracing::info!("CLI override: max record size set to {} bytes", size);
        }
    }
}
