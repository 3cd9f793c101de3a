use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "PANELFETCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/panelfetch.toml";
const ENV_PREFIX: &str = "PANELFETCH";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_sources(config_path)
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // PANELFETCH__WORKER__TICK_MS -> worker.tick_ms
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.worker.tick_ms, 500);
        assert_eq!(config.buffer.growth_block.as_u64(), 128 * 1024);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[worker]
tick_ms = 250
startup_delay_secs = 0

[buffer]
initial_capacity = "32KB"
max_capacity = "1MB"

[tls]
cert_dir = "/etc/panelfetch/certs"
allow_insecure = false
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.worker.tick_ms, 250);
        assert_eq!(config.worker.startup_delay_secs, 0);
        assert_eq!(config.buffer.initial_capacity.as_u64(), 32 * 1024);
        assert_eq!(config.buffer.max_capacity.as_u64(), 1024 * 1024);
        assert_eq!(config.tls.cert_dir, PathBuf::from("/etc/panelfetch/certs"));
        assert!(!config.tls.allow_insecure);
    }

    #[test]
    fn test_resources_list() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[[resources]]
url = "https://api.open-meteo.com/v1/forecast?latitude=52.52&longitude=13.41"
interval_minutes = 30

[[resources]]
url = "https://creativecommons.tankerkoenig.de/json/prices.php?ids=abc"
interval_minutes = 10
fallback_anchor = "certs/fallback.pem"

[resources.headers]
Accept = "application/json"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.resources.len(), 2);
        assert_eq!(config.resources[0].interval_minutes, 30);
        assert!(config.resources[0].headers.is_empty());
        assert_eq!(config.resources[1].headers["Accept"], "application/json");
        assert_eq!(
            config.resources[1].fallback_anchor,
            Some(PathBuf::from("certs/fallback.pem"))
        );
    }
}
