//! Configuration for mailrag

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable holding the Gmail OAuth access token
pub const ENV_GMAIL_TOKEN: &str = "MAILRAG_GMAIL_TOKEN";
/// Environment variable overriding the OpenSearch URL
pub const ENV_OPENSEARCH_URL: &str = "MAILRAG_OPENSEARCH_URL";
/// Environment variable holding the embedding endpoint API key
pub const ENV_EMBEDDING_API_KEY: &str = "MAILRAG_EMBEDDING_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// OpenSearch configuration
    #[serde(default)]
    pub opensearch: OpenSearchConfig,

    /// Gmail API configuration
    #[serde(default)]
    pub gmail: GmailConfig,

    /// Embedding endpoint configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// OpenSearch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSearchConfig {
    /// OpenSearch base URL
    #[serde(default = "default_opensearch_url")]
    pub url: String,

    /// Basic auth user name
    pub username: Option<String>,

    /// Basic auth password
    pub password: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_opensearch_timeout")]
    pub timeout_secs: u64,

    /// Index holding one document per message
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Dimension of both vector fields
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Documents per `_bulk` request
    #[serde(default = "default_bulk_batch_size")]
    pub bulk_batch_size: usize,
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        Self {
            url: default_opensearch_url(),
            username: None,
            password: None,
            timeout_secs: default_opensearch_timeout(),
            index_name: default_index_name(),
            embedding_dim: default_embedding_dim(),
            bulk_batch_size: default_bulk_batch_size(),
        }
    }
}

fn default_opensearch_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_opensearch_timeout() -> u64 {
    30
}

fn default_index_name() -> String {
    "gmail-threads".to_string()
}

fn default_embedding_dim() -> usize {
    1536
}

fn default_bulk_batch_size() -> usize {
    500
}

/// Gmail API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    /// Base URL of the `users/me` resource
    #[serde(default = "default_gmail_api_base")]
    pub api_base: String,

    /// OAuth access token (obtained out of band)
    pub access_token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_gmail_timeout")]
    pub timeout_secs: u64,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_base: default_gmail_api_base(),
            access_token: None,
            timeout_secs: default_gmail_timeout(),
        }
    }
}

fn default_gmail_api_base() -> String {
    "https://gmail.googleapis.com/gmail/v1/users/me".to_string()
}

fn default_gmail_timeout() -> u64 {
    30
}

/// Embedding endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible embeddings API
    #[serde(default = "default_embedding_url")]
    pub url: String,

    /// Model name sent with every request
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Bearer key for the endpoint
    pub api_key: Option<String>,

    /// Texts per request
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Body text is truncated to this many characters before embedding
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            model: default_embedding_model(),
            api_key: None,
            batch_size: default_embedding_batch_size(),
            max_input_chars: default_max_input_chars(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_batch_size() -> usize {
    16
}

fn default_max_input_chars() -> usize {
    32_000
}

fn default_embedding_timeout() -> u64 {
    120
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default locations, falling back to defaults
    pub fn load() -> crate::Result<Self> {
        let paths = [
            PathBuf::from("./mailrag.toml"),
            PathBuf::from("/etc/mailrag/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                debug!("Loading configuration from {}", path.display());
                return Self::from_file(&path);
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Apply `MAILRAG_*` environment overrides on top of the loaded values
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(ENV_GMAIL_TOKEN).filter(|v| !v.is_empty()) {
            self.gmail.access_token = Some(token);
        }
        if let Some(url) = lookup(ENV_OPENSEARCH_URL).filter(|v| !v.is_empty()) {
            self.opensearch.url = url;
        }
        if let Some(key) = lookup(ENV_EMBEDDING_API_KEY).filter(|v| !v.is_empty()) {
            self.embedding.api_key = Some(key);
        }
    }

    /// Reject values that would produce invalid requests downstream
    pub fn validate(&self) -> crate::Result<()> {
        if self.opensearch.embedding_dim == 0 {
            return Err(crate::Error::Config(
                "opensearch.embedding_dim must be positive".to_string(),
            ));
        }
        if self.opensearch.bulk_batch_size == 0 {
            return Err(crate::Error::Config(
                "opensearch.bulk_batch_size must be positive".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(crate::Error::Config(
                "embedding.batch_size must be positive".to_string(),
            ));
        }
        if self.opensearch.index_name.is_empty() {
            return Err(crate::Error::Config(
                "opensearch.index_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.opensearch.url, "http://localhost:9200");
        assert_eq!(config.opensearch.index_name, "gmail-threads");
        assert_eq!(config.opensearch.embedding_dim, 1536);
        assert!(config.gmail.access_token.is_none());
        assert_eq!(config.embedding.max_input_chars, 32_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[opensearch]
url = "https://search.internal:9200"
embedding_dim = 2560

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.opensearch.url, "https://search.internal:9200");
        assert_eq!(config.opensearch.embedding_dim, 2560);
        assert_eq!(config.opensearch.index_name, "gmail-threads");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_file_rejects_zero_dimension() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[opensearch]\nembedding_dim = 0").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file(Path::new("/nonexistent/mailrag.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_GMAIL_TOKEN, "ya29.token"),
            (ENV_OPENSEARCH_URL, "http://os:9200"),
            (ENV_EMBEDDING_API_KEY, ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.gmail.access_token.as_deref(), Some("ya29.token"));
        assert_eq!(config.opensearch.url, "http://os:9200");
        assert!(config.embedding.api_key.is_none());
    }
}
