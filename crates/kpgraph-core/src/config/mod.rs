//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::domain::knowledge::EdgeListFormat;
use crate::storage::database::default_database_path;

/// kpgraph configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: StorageSettings,
    pub cache: CacheConfig,
    pub llm: LlmConfig,
    pub graph: GraphConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub path: PathBuf,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

/// Graph maintenance behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Accept historical comma-separated edge cells when reading
    pub legacy_csv_edges: bool,
    /// Serialize every edge-list mutation through a single write gate
    pub serialize_edge_writes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: StorageSettings::default(),
            cache: CacheConfig::default(),
            llm: LlmConfig::default(),
            graph: GraphConfig::default(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: 5,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 600,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            default_model: "anthropic/claude-sonnet-4-20250514".to_string(),
            temperature: 0.3,
            max_tokens: 8192,
            timeout_secs: 120,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            legacy_csv_edges: false,
            serialize_edge_writes: true,
        }
    }
}

impl GraphConfig {
    /// Edge-list format implied by this configuration
    pub fn edge_list_format(&self) -> EdgeListFormat {
        if self.legacy_csv_edges {
            EdgeListFormat::JsonWithLegacyCsv
        } else {
            EdgeListFormat::Json
        }
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("KPGRAPH_API_KEY")
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| {
            opt.map(|key| {
                if key.len() <= 4 {
                    "***".to_string()
                } else {
                    let suffix = &key[key.len() - 4..];
                    format!("***{}", suffix)
                }
            })
        })
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

/// Keys accepted by `get`, `set` and `list`
const KEYS: &[&str] = &[
    "database.path",
    "database.max_connections",
    "cache.enabled",
    "cache.ttl_secs",
    "llm.base_url",
    "llm.default_model",
    "llm.temperature",
    "llm.max_tokens",
    "llm.timeout_secs",
    "llm.api_key",
    "graph.legacy_csv_edges",
    "graph.serialize_edge_writes",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("KPGRAPH_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("kpgraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or return defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;
        if self.database.max_connections == 0 {
            return Err(anyhow!("database.max_connections must be at least 1"));
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(anyhow!("cache.ttl_secs must be positive when the cache is enabled"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "database.path" => Ok(self.database.path.display().to_string()),
            "database.max_connections" => Ok(self.database.max_connections.to_string()),

            "cache.enabled" => Ok(self.cache.enabled.to_string()),
            "cache.ttl_secs" => Ok(self.cache.ttl_secs.to_string()),

            "llm.base_url" => Ok(self.llm.base_url.clone()),
            "llm.default_model" => Ok(self.llm.default_model.clone()),
            "llm.temperature" => Ok(self.llm.temperature.to_string()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),

            "graph.legacy_csv_edges" => Ok(self.graph.legacy_csv_edges.to_string()),
            "graph.serialize_edge_writes" => Ok(self.graph.serialize_edge_writes.to_string()),

            // API key (special handling - show redacted)
            "llm.api_key" | "api_key" => match self.llm.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok("(not set - use KPGRAPH_API_KEY or OPENROUTER_API_KEY env var)".to_string()),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `kpgraph config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "database.path" => {
                self.database.path = PathBuf::from(value);
            }
            "database.max_connections" => {
                let max: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid max_connections value: {}", value))?;
                if max == 0 {
                    return Err(anyhow!("max_connections must be at least 1"));
                }
                self.database.max_connections = max;
            }

            "cache.enabled" => {
                self.cache.enabled = parse_bool(value)?;
            }
            "cache.ttl_secs" => {
                self.cache.ttl_secs = value
                    .parse()
                    .with_context(|| format!("Invalid ttl_secs value: {}", value))?;
            }

            "llm.base_url" => {
                self.llm.base_url = value.trim_end_matches('/').to_string();
            }
            "llm.default_model" => {
                self.llm.default_model = value.to_string();
            }
            "llm.temperature" => {
                let temp: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid temperature value: {}", value))?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
                }
                self.llm.temperature = temp;
            }
            "llm.max_tokens" => {
                self.llm.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid max_tokens value: {}", value))?;
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            "graph.legacy_csv_edges" => {
                self.graph.legacy_csv_edges = parse_bool(value)?;
            }
            "graph.serialize_edge_writes" => {
                self.graph.serialize_edge_writes = parse_bool(value)?;
            }

            // API key cannot be set via config
            "llm.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the KPGRAPH_API_KEY or OPENROUTER_API_KEY environment variable instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `kpgraph config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(anyhow!("Invalid boolean value: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert!(config.graph.serialize_edge_writes);
        assert!(!config.graph.legacy_csv_edges);
        assert_eq!(config.graph.edge_list_format(), EdgeListFormat::Json);
    }

    #[test]
    fn test_set_and_get_roundtrip() {
        let mut config = Config::default();
        config.set("cache.ttl_secs", "30").unwrap();
        config.set("graph.legacy_csv_edges", "yes").unwrap();
        config.set("llm.temperature", "0.5").unwrap();

        assert_eq!(config.get("cache.ttl_secs").unwrap(), "30");
        assert_eq!(config.get("graph.legacy_csv_edges").unwrap(), "true");
        assert_eq!(config.graph.edge_list_format(), EdgeListFormat::JsonWithLegacyCsv);
        assert_eq!(config.get("llm.temperature").unwrap(), "0.5");
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.set("llm.temperature", "3.5").is_err());
        assert!(config.set("database.max_connections", "0").is_err());
        assert!(config.set("cache.enabled", "maybe").is_err());
        assert!(config.set("llm.api_key", "sk-secret").is_err());
        assert!(config.set("no.such.key", "1").is_err());
    }

    #[test]
    fn test_api_key_in_file_is_rejected() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-inline".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_with_partial_file() {
        let parsed: Config = toml::from_str(
            r#"
            [graph]
            legacy_csv_edges = true
            serialize_edge_writes = false
            "#,
        )
        .unwrap();

        assert!(parsed.graph.legacy_csv_edges);
        assert!(!parsed.graph.serialize_edge_writes);
        assert_eq!(parsed.cache.ttl_secs, CacheConfig::default().ttl_secs);

        let text = toml::to_string_pretty(&parsed).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.database.max_connections, parsed.database.max_connections);
    }

    #[test]
    fn test_list_covers_every_key() {
        let config = Config::default();
        let items = config.list().unwrap();
        assert_eq!(items.len(), KEYS.len());
        assert!(items.iter().any(|(k, _)| k == "graph.serialize_edge_writes"));
    }
}
