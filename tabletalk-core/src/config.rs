use crate::rules::{default_rules, WriteRules};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Immutable application configuration.
///
/// Constructed once at startup and passed by reference into the core; the
/// validation and execution functions never read ambient environment state
/// themselves.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub planner: PlannerConfig,
    pub limits: LimitsConfig,
    /// When on, validated writes are proposed back to the caller and only
    /// executed after an explicit confirmation round-trip
    pub require_write_confirmation: bool,
    /// Table whitelist; the core can only ever touch what is listed here
    pub tables: WriteRules,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlannerConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LimitsConfig {
    /// Default LIMIT appended to unbounded SELECTs
    pub max_rows: u32,
    /// Default page size for result slicing
    pub page_size: usize,
    pub rate_limit_window_sec: u64,
    /// 0 disables rate limiting
    pub rate_limit_max_requests: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                path: get_default_db_path(),
            },
            planner: PlannerConfig {
                model: "gpt-4o-mini".to_string(),
                api_key: None,
                base_url: None,
            },
            limits: LimitsConfig {
                max_rows: 100,
                page_size: 50,
                rate_limit_window_sec: 60,
                rate_limit_max_requests: 20,
            },
            require_write_confirmation: true,
            tables: default_rules(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, creating a default
    /// config file on first run. Environment variables prefixed `TABLETALK_`
    /// override file values (`TABLETALK_LIMITS__MAX_ROWS=200`).
    pub fn load() -> Result<(Self, PathBuf), ConfigError> {
        let config_path = get_config_path();
        let config = Self::load_from(&config_path)?;
        Ok((config, config_path))
    }

    pub fn load_from(config_path: &PathBuf) -> Result<Self, ConfigError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Message(format!("Failed to create config directory: {e}"))
            })?;
        }

        if !config_path.exists() {
            let default_db_path = get_default_db_path();
            let default_config = format!(
                r#"
require_write_confirmation = true

[server]
host = "127.0.0.1"
port = 8080

[database]
path = "{}"

[planner]
model = "gpt-4o-mini"
# api_key = "your-openai-key"   # falls back to OPENAI_API_KEY
# base_url = "https://api.openai.com"

[limits]
max_rows = 100
page_size = 50
rate_limit_window_sec = 60
rate_limit_max_requests = 20

[tables.products]
read = true
insert = ["name", "sku", "price", "description", "category", "stock"]
update = ["price", "description", "category", "stock", "name", "sku"]
delete = false

[tables.sales]
read = true
insert = ["item_name", "quantity", "sold_at"]
update = ["quantity", "sold_at"]
delete = false
"#,
                default_db_path.display()
            );
            std::fs::write(config_path, default_config).map_err(|e| {
                ConfigError::Message(format!("Failed to write default config: {e}"))
            })?;
        }

        let builder = Config::builder()
            .add_source(File::from(config_path.clone()))
            .add_source(
                Environment::with_prefix("TABLETALK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: AppConfig = builder.try_deserialize()?;

        // Expand tilde in database path
        if config.database.path.starts_with("~") {
            if let Some(home) = dirs::home_dir() {
                let path_str = config.database.path.to_string_lossy();
                let expanded = path_str.replacen('~', &home.to_string_lossy(), 1);
                config.database.path = PathBuf::from(expanded);
            }
        }

        if config.planner.api_key.is_none() {
            config.planner.api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        }

        // Whitelist override: a full JSON rules map replaces the defaults;
        // invalid JSON keeps whatever the file/defaults provided
        if let Ok(json) = std::env::var("TABLETALK_EXPOSED_TABLES") {
            if !json.is_empty() {
                match serde_json::from_str::<WriteRules>(&json) {
                    Ok(tables) if !tables.is_empty() => config.tables = tables,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Ignoring invalid TABLETALK_EXPOSED_TABLES override");
                    }
                }
            }
        }

        Ok(config)
    }
}

fn get_config_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        config_dir.join("tabletalk/tabletalk.toml")
    } else {
        PathBuf::from("tabletalk.toml")
    }
}

fn get_default_db_path() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        data_dir.join("tabletalk/tabletalk.db")
    } else {
        PathBuf::from("tabletalk.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.limits.max_rows, 100);
        assert_eq!(config.limits.page_size, 50);
        assert!(config.require_write_confirmation);
        assert!(config.tables.contains_key("products"));
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tabletalk.toml");
        let config = AppConfig::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.tables["sales"].insert.len(), 3);
    }
}
