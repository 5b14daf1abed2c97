use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::{Config, PassConfig};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

const MAX_COARSE_GRID: usize = 20;
/// Fine grids put few, large thumbnails in front of the model.
const MAX_FINE_GRID: usize = 4;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    validate_pass("coarse", &config.coarse, MAX_COARSE_GRID)?;
    validate_pass("fine", &config.fine, MAX_FINE_GRID)?;

    let selection = &config.selection;
    if selection.coarse_multiplier < 1.0 {
        return Err(ConfigError::Validation {
            message: format!(
                "selection.coarse_multiplier must be at least 1, got {}",
                selection.coarse_multiplier
            ),
        });
    }
    if selection.coarse_cap_pct <= 0.0 || selection.coarse_cap_pct > 100.0 {
        return Err(ConfigError::Validation {
            message: format!(
                "selection.coarse_cap_pct must be in (0, 100], got {}",
                selection.coarse_cap_pct
            ),
        });
    }

    if config.models.is_empty() {
        return Err(ConfigError::InvalidModels {
            reason: "At least one model is required".to_string(),
        });
    }
    let mut seen = HashSet::new();
    for model in &config.models {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModels {
                reason: "Model names must not be empty".to_string(),
            });
        }
        if !seen.insert(model.as_str()) {
            return Err(ConfigError::InvalidModels {
                reason: format!("Duplicate model '{}'", model),
            });
        }
    }

    if !config.gateway.key.is_configured() {
        return Err(ConfigError::Validation {
            message: "gateway needs one of api_key, api_key_file or api_key_env".to_string(),
        });
    }

    Ok(())
}

fn validate_pass(name: &str, pass: &PassConfig, max_grid: usize) -> Result<(), ConfigError> {
    if !(1..=max_grid).contains(&pass.grid_size) {
        return Err(ConfigError::Validation {
            message: format!(
                "{}.grid_size must be 1-{}, got {}",
                name, max_grid, pass.grid_size
            ),
        });
    }
    if !(16..=1024).contains(&pass.thumbnail_size) {
        return Err(ConfigError::Validation {
            message: format!(
                "{}.thumbnail_size must be 16-1024, got {}",
                name, pass.thumbnail_size
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
    {
        "version": "1.0",
        "models": ["vision-a", "vision-b"],
        "gateway": {
            "base_url": "https://vision.example.com/v1",
            "api_key_env": "GRIDSIFT_TEST_KEY"
        }
    }
    "#;

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let config = load_config_from_str(MINIMAL).unwrap();

        assert_eq!(config.models, vec!["vision-a", "vision-b"]);
        assert_eq!(config.coarse.grid_size, 20);
        assert_eq!(config.coarse.thumbnail_size, 128);
        assert_eq!(config.fine.grid_size, 4);
        assert_eq!(config.fine.thumbnail_size, 384);
        assert_eq!(config.selection.coarse_multiplier, 2.5);
        assert_eq!(config.selection.coarse_cap_pct, 50.0);
        assert_eq!(config.selection.jpeg_quality, 85);
        assert_eq!(config.thumbnails.reclaim_every, 10);
        assert_eq!(config.gateway.timeout_secs, 120);
        assert_eq!(config.gateway.max_tokens, 1024);
        assert_eq!(
            config.gateway.key.api_key_env.as_deref(),
            Some("GRIDSIFT_TEST_KEY")
        );
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "database_path": "/var/lib/gridsift/jobs.db",
            "storage_root": "/srv/photos",
            "coarse": { "grid_size": 10, "thumbnail_size": 96 },
            "fine": { "grid_size": 3, "thumbnail_size": 512 },
            "selection": { "coarse_multiplier": 3.0, "coarse_cap_pct": 40, "jpeg_quality": 90 },
            "thumbnails": { "reclaim_every": 25 },
            "models": ["m1"],
            "gateway": {
                "base_url": "http://localhost:8080/v1",
                "api_key": "sk-local",
                "timeout_secs": 30,
                "max_tokens": 256
            },
            "logging": { "level": "gridsift=debug", "json": true }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(
            config.database_path().unwrap().to_string_lossy(),
            "/var/lib/gridsift/jobs.db"
        );
        assert_eq!(config.coarse.grid_size, 10);
        assert_eq!(config.fine.thumbnail_size, 512);
        assert_eq!(config.selection.coarse_cap_pct, 40.0);
        assert_eq!(config.thumbnails.reclaim_every, 25);
        assert_eq!(config.gateway.timeout_secs, 30);
        assert!(config.logging.json);
    }

    #[test]
    fn test_invalid_version() {
        let config_json = MINIMAL.replace("\"1.0\"", "\"2.0\"");
        assert!(load_config_from_str(&config_json).is_err());
    }

    #[test]
    fn test_schema_rejects_missing_gateway() {
        let config_json = r#"{ "version": "1.0", "models": ["m"] }"#;
        assert!(matches!(
            load_config_from_str(config_json),
            Err(ConfigError::SchemaValidation { .. })
        ));
    }

    #[test]
    fn test_grid_size_out_of_range() {
        let config_json = MINIMAL.replace(
            "\"models\"",
            "\"coarse\": { \"grid_size\": 21, \"thumbnail_size\": 128 }, \"models\"",
        );
        assert!(load_config_from_str(&config_json).is_err());
    }

    #[test]
    fn test_fine_grid_capped_at_four() {
        let config_json = MINIMAL.replace(
            "\"models\"",
            "\"fine\": { \"grid_size\": 5, \"thumbnail_size\": 256 }, \"models\"",
        );
        assert!(matches!(
            load_config_from_str(&config_json),
            Err(ConfigError::SchemaValidation { .. })
        ));

        let mut config = load_config_from_str(MINIMAL).unwrap();
        config.fine.grid_size = 5;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation { .. })
        ));
        config.fine.grid_size = 4;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_duplicate_models_rejected() {
        let config_json = MINIMAL.replace("\"vision-b\"", "\"vision-a\"");
        assert!(matches!(
            load_config_from_str(&config_json),
            Err(ConfigError::InvalidModels { .. })
        ));
    }

    #[test]
    fn test_empty_model_list_rejected() {
        let config_json = MINIMAL.replace("[\"vision-a\", \"vision-b\"]", "[]");
        assert!(load_config_from_str(&config_json).is_err());
    }

    #[test]
    fn test_gateway_without_key_source_rejected() {
        let config_json =
            MINIMAL.replace("\"api_key_env\": \"GRIDSIFT_TEST_KEY\"", "\"max_tokens\": 10");
        assert!(matches!(
            load_config_from_str(&config_json),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_cap_out_of_range_rejected() {
        let config_json = MINIMAL.replace(
            "\"models\"",
            "\"selection\": { \"coarse_cap_pct\": 0 }, \"models\"",
        );
        assert!(load_config_from_str(&config_json).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.models.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_config("/nonexistent/gridsift.json"),
            Err(ConfigError::ReadFile { .. })
        ));
    }
}
