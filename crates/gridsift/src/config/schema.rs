use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::gateway::HttpGatewayConfig;
use crate::secrets::ApiKeySource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// SQLite file for jobs and credits. Defaults to `~/.gridsift/data/gridsift.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Root directory of the filesystem object store.
    #[serde(default)]
    pub storage_root: Option<PathBuf>,
    #[serde(default = "PassConfig::coarse")]
    pub coarse: PassConfig,
    #[serde(default = "PassConfig::fine")]
    pub fine: PassConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
    pub models: Vec<String>,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
    }

    pub fn storage_root(&self) -> Option<PathBuf> {
        self.storage_root
            .clone()
            .or_else(|| dirs::home_dir().map(|h| h.join(".gridsift").join("objects")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassConfig {
    pub grid_size: usize,
    pub thumbnail_size: u32,
}

impl PassConfig {
    fn coarse() -> Self {
        Self {
            grid_size: 20,
            thumbnail_size: 128,
        }
    }

    fn fine() -> Self {
        Self {
            grid_size: 4,
            thumbnail_size: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_coarse_multiplier")]
    pub coarse_multiplier: f64,
    #[serde(default = "default_coarse_cap_pct")]
    pub coarse_cap_pct: f64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_coarse_multiplier() -> f64 {
    2.5
}

fn default_coarse_cap_pct() -> f64 {
    50.0
}

fn default_jpeg_quality() -> u8 {
    85
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            coarse_multiplier: default_coarse_multiplier(),
            coarse_cap_pct: default_coarse_cap_pct(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Photos between memory reclamation checkpoints.
    #[serde(default = "default_reclaim_every")]
    pub reclaim_every: usize,
}

fn default_reclaim_every() -> usize {
    crate::thumbnail::DEFAULT_RECLAIM_EVERY
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            reclaim_every: default_reclaim_every(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// OpenAI-compatible API root, e.g. `https://openrouter.ai/api/v1`.
    pub base_url: String,
    #[serde(flatten)]
    pub key: ApiKeySource,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    1024
}

impl GatewayConfig {
    /// Resolves the API key and builds the HTTP client settings.
    pub fn to_http_config(&self) -> Result<HttpGatewayConfig, ConfigError> {
        Ok(HttpGatewayConfig {
            base_url: self.base_url.clone(),
            api_key: self.key.resolve()?,
            timeout: Duration::from_secs(self.timeout_secs),
            max_tokens: self.max_tokens,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
