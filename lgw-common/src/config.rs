//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// TOML configuration file contents
///
/// Everything is optional; compiled defaults apply when the file or a key is
/// absent. The upstream API key may also arrive via `LGW_API_KEY`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root data folder (database, backups)
    pub root_folder: Option<String>,

    /// Upstream API settings
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

/// Upstream Congress API settings
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the authoritative API
    pub base_url: Option<String>,
    /// API key (falls back to the LGW_API_KEY environment variable)
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: None,
        }
    }
}

/// Resolve the root data folder, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file `root_folder` key
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Ok(config) = load_toml_config() {
        if let Some(root_folder) = config.root_folder {
            return PathBuf::from(root_folder);
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Load the TOML config file from the platform config directory
///
/// Looks for `lgw/config.toml` under the user config directory, then (on
/// Linux) `/etc/lgw/config.toml`.
pub fn load_toml_config() -> Result<TomlConfig> {
    let path = config_file_path()?;
    parse_toml_config(&path)
}

fn parse_toml_config(path: &Path) -> Result<TomlConfig> {
    let text = std::fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

fn config_file_path() -> Result<PathBuf> {
    if let Some(path) = dirs::config_dir().map(|d| d.join("lgw").join("config.toml")) {
        if path.exists() {
            return Ok(path);
        }
    }
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/lgw/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }
    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("lgw"))
        .unwrap_or_else(|| PathBuf::from("./lgw_data"))
}

/// Ensure the root folder and its backups subdirectory exist
pub fn ensure_root_folder(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root.join("backups"))?;
    Ok(())
}

/// Path of the SQLite database inside the root folder
pub fn database_path(root: &Path) -> PathBuf {
    root.join("lgw.db")
}

/// Path of the backup snapshot directory inside the root folder
pub fn backup_dir(root: &Path) -> PathBuf {
    root.join("backups")
}
