//! Application configuration.
//!
//! Layered as defaults, then the TOML file, then `MSGBRIDGE__*` environment
//! variables (`__` separates sections, e.g. `MSGBRIDGE__HISTORY__PAGE_SIZE`).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::history::HistoryConfig;
use crate::recall::RecallConfig;
use crate::registry::RegistryConfig;

pub const APP_NAME: &str = "msgbridge";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub history: HistoryConfig,
    pub registry: RegistryConfig,
    pub recall: RecallConfig,
    pub fixture: FixtureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// Fixture used when a command does not name one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history.page_size == 0 {
            bail!("history.page_size must be at least 1");
        }
        if self.history.max_count == 0 {
            bail!("history.max_count must be at least 1");
        }
        if self.registry.start_id < 1 {
            bail!(
                "registry.start_id must be positive, got {}",
                self.registry.start_id
            );
        }
        Ok(())
    }
}

/// `$XDG_CONFIG_HOME/msgbridge/config.toml`, falling back to the platform
/// config directory.
pub fn default_config_path() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME).join("config.toml"));
    }
    let base = dirs::config_dir().context("unable to determine config directory")?;
    Ok(base.join(APP_NAME).join("config.toml"))
}

fn env_prefix() -> String {
    APP_NAME.to_ascii_uppercase()
}

/// Load the configuration at `path`, writing a default file first if none
/// exists (unless `dry_run`).
pub fn load_or_init_config(path: &Path, dry_run: bool) -> Result<AppConfig> {
    if !path.exists() {
        if dry_run {
            tracing::info!("dry-run: would create default config at {}", path.display());
        } else {
            write_default_config(path)?;
        }
    }
    load_config(path)
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let defaults = HistoryConfig::default();
    let built = Config::builder()
        .set_default("logging.level", "info")?
        .set_default("history.page_size", defaults.page_size as i64)?
        .set_default("history.max_count", defaults.max_count as i64)?
        .set_default("registry.start_id", i64::from(RegistryConfig::default().start_id))?
        .set_default("recall.capacity", RecallConfig::default().capacity as i64)?
        .add_source(File::from(path).format(FileFormat::Toml).required(false))
        .add_source(
            Environment::with_prefix(env_prefix().as_str())
                .prefix_separator("__")
                .separator("__"),
        )
        .build()
        .with_context(|| format!("reading config {}", path.display()))?;

    let mut config: AppConfig = built
        .try_deserialize()
        .with_context(|| format!("parsing config {}", path.display()))?;

    if let Some(ref file) = config.logging.file {
        config.logging.file = Some(expand_str_path(file)?.display().to_string());
    }
    if let Some(ref fixture) = config.fixture.path {
        config.fixture.path = Some(expand_str_path(fixture)?.display().to_string());
    }

    config.validate()?;
    Ok(config)
}

pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = String::new();
    body.push_str("# Configuration for ");
    body.push_str(APP_NAME);
    body.push('\n');
    body.push_str("# File: ");
    body.push_str(&path.display().to_string());
    body.push_str("\n\n");
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}
