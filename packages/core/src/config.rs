//! Editor configuration
//!
//! Loaded from JSON (file or string) or built from `Default`, then checked
//! with [`EditorConfig::validate`] before an editor is constructed.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Ids fetched from the generator per refill
pub const DEFAULT_ID_BLOCK_SIZE: usize = 10_000;

/// How long a caller waits for the ownership broker before giving up
pub const DEFAULT_OWNERSHIP_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the domain event broadcast channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Tags that always exist, whether or not any neuron carries them
pub const DEFAULT_PREDEFINED_TAGS: &[&str] = &["auto", "traced", "review", "complete"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Logging settings consumed by [`init_tracing`](crate::telemetry::init_tracing)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration for [`TreeEditor`](crate::services::TreeEditor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Ids fetched from the external generator per refill
    pub id_block_size: usize,

    /// Upper bound on waiting for an ownership answer
    #[serde(rename = "ownership_timeout_ms", with = "duration_millis")]
    pub ownership_timeout: Duration,

    pub event_channel_capacity: usize,

    /// Reserved tag names, never dropped from the tag vocabulary
    pub predefined_tags: Vec<String>,

    /// Subject key of the local user, recorded as owner when ownership is granted
    pub user_key: Option<String>,

    /// Identifies this editing session in logs
    pub client_id: String,

    pub logging: LoggingConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            id_block_size: DEFAULT_ID_BLOCK_SIZE,
            ownership_timeout: DEFAULT_OWNERSHIP_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            predefined_tags: DEFAULT_PREDEFINED_TAGS
                .iter()
                .map(|t| t.to_string())
                .collect(),
            user_key: None,
            client_id: uuid::Uuid::new_v4().to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EditorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn with_user_key(mut self, user_key: impl Into<String>) -> Self {
        self.user_key = Some(user_key.into());
        self
    }

    pub fn with_ownership_timeout(mut self, timeout: Duration) -> Self {
        self.ownership_timeout = timeout;
        self
    }

    pub fn with_id_block_size(mut self, block_size: usize) -> Self {
        self.id_block_size = block_size;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id_block_size == 0 {
            return Err(ConfigError::Invalid(
                "id_block_size must be greater than 0".to_string(),
            ));
        }

        if self.ownership_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "ownership_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_channel_capacity must be greater than 0".to_string(),
            ));
        }

        if self.predefined_tags.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "predefined_tags cannot contain empty names".to_string(),
            ));
        }

        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
