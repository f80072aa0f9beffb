use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, UnsubError};

/// Execution mode for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Report what would be done without any network or mail action
    #[default]
    DryRun,
    /// Actually execute unsubscribe actions
    Live,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::DryRun => "dry-run",
            ExecutionMode::Live => "live",
        }
    }
}

/// What happens to a group's messages after a successful unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DispositionPolicy {
    /// Leave messages untouched
    #[default]
    Keep,
    /// Move messages to trash (recoverable)
    Trash,
    /// Permanently delete messages (irreversible, never the default)
    Delete,
}

impl DispositionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispositionPolicy::Keep => "keep",
            DispositionPolicy::Trash => "trash",
            DispositionPolicy::Delete => "delete",
        }
    }
}

/// How messages are aggregated before execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingMode {
    /// Deduplicate by sender, one action per sender
    #[default]
    Grouped,
    /// One action per message, no cross-message merging
    Individual,
}

impl ProcessingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::Grouped => "grouped",
            ProcessingMode::Individual => "individual",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Run-level switches, read-only for the duration of a run
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunConfig {
    #[serde(default)]
    pub execution: ExecutionMode,
    #[serde(default)]
    pub disposition: DispositionPolicy,
    #[serde(default)]
    pub processing: ProcessingMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query: default_query(),
            max_messages: default_max_messages(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_query() -> String {
    "unsubscribe".to_string()
}

fn default_max_messages() -> usize {
    100
}

fn default_max_concurrent_fetches() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_redirects() -> usize {
    5
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| UnsubError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| UnsubError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                UnsubError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| UnsubError::Config(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| UnsubError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.search.query.trim().is_empty() {
            return Err(UnsubError::Config(
                "search.query cannot be empty".to_string(),
            ));
        }

        if self.search.max_messages == 0 {
            return Err(UnsubError::Config(
                "search.max_messages must be at least 1".to_string(),
            ));
        }
        if self.search.max_messages > 2000 {
            return Err(UnsubError::Config(
                "search.max_messages cannot exceed 2000 per run".to_string(),
            ));
        }

        // Fetch concurrency must stay under Gmail API rate limits
        if self.search.max_concurrent_fetches == 0 {
            return Err(UnsubError::Config(
                "search.max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.search.max_concurrent_fetches > 50 {
            return Err(UnsubError::Config(
                "search.max_concurrent_fetches cannot exceed 50 (to stay under Gmail API rate limits)".to_string(),
            ));
        }

        if self.http.timeout_secs == 0 {
            return Err(UnsubError::Config(
                "http.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.http.timeout_secs > 120 {
            return Err(UnsubError::Config(
                "http.timeout_secs cannot exceed 120".to_string(),
            ));
        }

        if self.http.max_redirects > 10 {
            return Err(UnsubError::Config(
                "http.max_redirects cannot exceed 10".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.run.execution, ExecutionMode::DryRun);
        assert_eq!(config.run.disposition, DispositionPolicy::Keep);
        assert_eq!(config.run.processing, ProcessingMode::Grouped);

        assert_eq!(config.search.query, "unsubscribe");
        assert_eq!(config.search.max_messages, 100);
        assert_eq!(config.search.max_concurrent_fetches, 10);

        assert_eq!(config.http.timeout_secs, 10);
        assert_eq!(config.http.max_redirects, 5);
    }

    #[test]
    fn test_safe_by_default() {
        // A fresh config must never execute or destroy anything
        let config = Config::default();
        assert_eq!(config.run.execution, ExecutionMode::DryRun);
        assert_ne!(config.run.disposition, DispositionPolicy::Delete);
    }

    #[test]
    fn test_config_validation_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_query() {
        let mut config = Config::default();
        config.search.query = "  ".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("query"));
    }

    #[test]
    fn test_config_validation_max_messages_bounds() {
        let mut config = Config::default();

        config.search.max_messages = 0;
        assert!(config.validate().is_err());

        config.search.max_messages = 1;
        assert!(config.validate().is_ok());

        config.search.max_messages = 2000;
        assert!(config.validate().is_ok());

        config.search.max_messages = 2001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_concurrency_bounds() {
        let mut config = Config::default();

        config.search.max_concurrent_fetches = 0;
        assert!(config.validate().is_err());

        config.search.max_concurrent_fetches = 50;
        assert!(config.validate().is_ok());

        config.search.max_concurrent_fetches = 51;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cannot exceed 50"));
    }

    #[test]
    fn test_config_validation_timeout_bounds() {
        let mut config = Config::default();

        config.http.timeout_secs = 0;
        assert!(config.validate().is_err());

        config.http.timeout_secs = 120;
        assert!(config.validate().is_ok());

        config.http.timeout_secs = 121;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_redirect_bound() {
        let mut config = Config::default();

        config.http.max_redirects = 0;
        assert!(config.validate().is_ok());

        config.http.max_redirects = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mode_strings() {
        assert_eq!(ExecutionMode::DryRun.as_str(), "dry-run");
        assert_eq!(ExecutionMode::Live.as_str(), "live");
        assert_eq!(DispositionPolicy::Trash.as_str(), "trash");
        assert_eq!(ProcessingMode::Individual.as_str(), "individual");
    }

    #[tokio::test]
    async fn test_config_serialization_roundtrip() {
        let mut config = Config::default();
        config.run.execution = ExecutionMode::Live;
        config.run.disposition = DispositionPolicy::Trash;

        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(config.run.execution, deserialized.run.execution);
        assert_eq!(config.run.disposition, deserialized.run.disposition);
        assert_eq!(config.search.query, deserialized.search.query);
        assert_eq!(config.http.timeout_secs, deserialized.http.timeout_secs);
    }

    #[tokio::test]
    async fn test_config_load_save_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let config = Config::default();
        config.save(path).await.unwrap();

        let loaded = Config::load(path).await.unwrap();

        assert_eq!(config.search.query, loaded.search.query);
        assert_eq!(config.run.processing, loaded.run.processing);
    }

    #[tokio::test]
    async fn test_config_load_nonexistent_returns_default() {
        let path = Path::new("/tmp/nonexistent-unsubscriber-config-12345.toml");

        let config = Config::load(path).await.unwrap();

        assert_eq!(config.run.execution, ExecutionMode::DryRun);
        assert_eq!(config.search.max_messages, 100);
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        tokio::fs::write(path, "this is not valid toml {[}]")
            .await
            .unwrap();

        let result = Config::load(path).await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[tokio::test]
    async fn test_config_partial_with_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let partial_config = r#"
[run]
execution = "live"
disposition = "trash"

[search]
query = "newsletter"
"#;
        tokio::fs::write(path, partial_config).await.unwrap();

        let config = Config::load(path).await.unwrap();

        // Check overridden values
        assert_eq!(config.run.execution, ExecutionMode::Live);
        assert_eq!(config.run.disposition, DispositionPolicy::Trash);
        assert_eq!(config.search.query, "newsletter");

        // Check default values are still present
        assert_eq!(config.run.processing, ProcessingMode::Grouped);
        assert_eq!(config.search.max_messages, 100);
        assert_eq!(config.http.timeout_secs, 10);
    }

    #[tokio::test]
    async fn test_config_create_example() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        Config::create_example(path).await.unwrap();

        assert!(path.exists());
        let config = Config::load(path).await.unwrap();
        assert_eq!(config.search.query, "unsubscribe");
    }
}
