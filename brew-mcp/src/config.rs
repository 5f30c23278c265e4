//! brew-mcp configuration loading and parsing

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::CommandSpec;

pub const CONFIG_ENV_VAR: &str = "BREW_MCP_CONFIG";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub brew: BrewConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    /// Replaces the built-in catalog when non-empty
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrewConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Appended to the inherited PATH if missing
    #[serde(default = "default_extra_path")]
    pub extra_path: Vec<String>,
    /// Overrides the inherited HOME
    #[serde(default)]
    pub home: Option<String>,
}

impl Default for BrewConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            timeout_seconds: default_timeout(),
            extra_path: default_extra_path(),
            home: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditConfig {
    /// Defaults to `homebrew_mcp.log` beside the executable
    #[serde(default)]
    pub log_file: Option<String>,
}

fn default_server_name() -> String {
    "Homebrew Package MCP".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_binary() -> String {
    "brew".into()
}
fn default_timeout() -> u64 {
    60
}
fn default_extra_path() -> Vec<String> {
    vec!["/opt/homebrew/bin".into(), "/usr/local/bin".into()]
}

/// `$BREW_MCP_CONFIG`, else `~/.config/brew-mcp/config.toml`
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config/brew-mcp/config.toml")
}

/// Load configuration from `path`. `Ok(None)` when the file does not exist.
pub fn load_config(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", path.display()))?;
    if config.brew.timeout_seconds == 0 {
        bail!(
            "Invalid config {}: brew.timeout_seconds must be at least 1",
            path.display()
        );
    }
    Ok(Some(config))
}
