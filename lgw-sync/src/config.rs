//! Service configuration assembly
//!
//! Root folder and port resolve CLI > environment > TOML > default;
//! upstream client settings come from the TOML file plus the LGW_API_KEY
//! environment variable, with rate limiting and retry tuning loaded from
//! the settings table once the database is open.

use crate::backoff::BackoffPolicy;
use crate::db::settings::SyncSettings;
use crate::fetch::client::ClientConfig;
use lgw_common::config::{self, TomlConfig};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5740;

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub port: u16,
    pub toml: TomlConfig,
}

impl ServiceConfig {
    /// Resolve configuration from CLI arguments, environment, and TOML
    pub fn resolve(cli_root: Option<&str>, cli_port: Option<u16>) -> Self {
        let root_folder = config::resolve_root_folder(cli_root, "LGW_ROOT_FOLDER");
        let toml = config::load_toml_config().unwrap_or_default();

        let port = cli_port
            .or_else(|| {
                std::env::var("LGW_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(DEFAULT_PORT);

        Self {
            root_folder,
            port,
            toml,
        }
    }

    /// Upstream client configuration, tuned by the settings table
    pub fn client_config(&self, settings: &SyncSettings) -> ClientConfig {
        let defaults = ClientConfig::default();
        let upstream = &self.toml.upstream;

        ClientConfig {
            base_url: upstream.base_url.clone().unwrap_or(defaults.base_url),
            api_key: upstream
                .api_key
                .clone()
                .or_else(|| std::env::var("LGW_API_KEY").ok()),
            timeout: upstream
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            min_request_interval: Duration::from_millis(settings.rate_limit_ms),
            backoff: BackoffPolicy::new(
                settings.max_fetch_attempts,
                Duration::from_millis(settings.fetch_base_delay_ms),
            ),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        config::database_path(&self.root_folder)
    }

    pub fn backup_dir(&self) -> PathBuf {
        config::backup_dir(&self.root_folder)
    }
}
