//! Resolution of the vision provider API key.
//!
//! A key can be given in three ways, checked in this order:
//!
//! 1. **Inline** - `"api_key": "sk-..."`, handy for local runs
//! 2. **File** - `"api_key_file": "/run/secrets/vision_key"` (Docker secrets)
//! 3. **Environment** - `"api_key_env": "VISION_API_KEY"`
//!
//! Empty strings count as "not set" so a blank inline value falls through.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No API key configured (set api_key, api_key_file or api_key_env)")]
    NoSourceProvided,

    #[error("Failed to read API key from file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("API key file '{0}' is empty")]
    EmptyFile(String),

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

/// Where to find the API key. Mirrors the `gateway` section of the config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeySource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

impl ApiKeySource {
    pub fn inline(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn from_env_var(name: impl Into<String>) -> Self {
        Self {
            api_key_env: Some(name.into()),
            ..Self::default()
        }
    }

    /// True when at least one source is non-empty.
    pub fn is_configured(&self) -> bool {
        non_empty(&self.api_key).is_some()
            || non_empty(&self.api_key_file).is_some()
            || non_empty(&self.api_key_env).is_some()
    }

    /// Resolves the key from the first non-empty source. A configured source
    /// that fails is an error; it does not fall through to the next one.
    pub fn resolve(&self) -> Result<SecretString, SecretError> {
        if let Some(key) = non_empty(&self.api_key) {
            return Ok(SecretString::from(key.trim().to_string()));
        }

        if let Some(path) = non_empty(&self.api_key_file) {
            let expanded = expand_home(path);
            let content =
                std::fs::read_to_string(&expanded).map_err(|e| SecretError::FileRead {
                    path: expanded.clone(),
                    source: e,
                })?;
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Err(SecretError::EmptyFile(expanded));
            }
            return Ok(SecretString::from(trimmed.to_string()));
        }

        if let Some(name) = non_empty(&self.api_key_env) {
            return match std::env::var(name) {
                Ok(value) => Ok(SecretString::from(value.trim().to_string())),
                Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: name.to_string(),
                }),
            };
        }

        Err(SecretError::NoSourceProvided)
    }
}

/// Expands a leading `~` to the user's home directory.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy();
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}
