//! Queue client configuration
//!
//! Options arrive loosely (JSON file, environment, CLI flags) as
//! `QueueOptions` and are validated once into a `QueueConfig`. A missing
//! `stream` or `server` fails construction immediately.

mod server;

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, QueueResult};

pub use server::ServerAddress;

/// Environment variable names read by `QueueOptions::from_env`
pub const ENV_STREAM: &str = "STREAM_QUEUE_STREAM";
pub const ENV_SERVER: &str = "STREAM_QUEUE_SERVER";
pub const ENV_MAX_LENGTH: &str = "STREAM_QUEUE_MAX_LENGTH";
pub const ENV_GROUP: &str = "STREAM_QUEUE_GROUP";
pub const ENV_CONSUMER: &str = "STREAM_QUEUE_CONSUMER";

/// Unvalidated client options
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueOptions {
    pub stream: Option<String>,
    /// `host:port[:auth]`
    pub server: Option<String>,
    /// 0 or absent means unlimited
    pub max_length: Option<u64>,
    pub group: Option<String>,
    pub consumer: Option<String>,
}

impl QueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn max_length(mut self, max_length: u64) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = Some(consumer.into());
        self
    }

    /// Parse options from a JSON object
    pub fn from_json_str(json: &str) -> QueueResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load options from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> QueueResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Read options from `STREAM_QUEUE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_length = match env::var(ENV_MAX_LENGTH) {
            Ok(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue {
                    key: ENV_MAX_LENGTH.to_string(),
                    value: raw.clone(),
                }
            })?),
            Err(_) => None,
        };

        Ok(Self {
            stream: env::var(ENV_STREAM).ok(),
            server: env::var(ENV_SERVER).ok(),
            max_length,
            group: env::var(ENV_GROUP).ok(),
            consumer: env::var(ENV_CONSUMER).ok(),
        })
    }

    /// Overlay `other` on top of `self`; values set in `other` win
    pub fn merge(self, other: QueueOptions) -> Self {
        Self {
            stream: other.stream.or(self.stream),
            server: other.server.or(self.server),
            max_length: other.max_length.or(self.max_length),
            group: other.group.or(self.group),
            consumer: other.consumer.or(self.consumer),
        }
    }

    /// Validate into a `QueueConfig`
    pub fn build(self) -> Result<QueueConfig, ConfigError> {
        let stream = self
            .stream
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingStream)?;
        let server = self
            .server
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingServer)?
            .parse::<ServerAddress>()?;

        let group = self
            .group
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| stream.clone());
        let consumer = self
            .consumer
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| stream.clone());

        Ok(QueueConfig {
            stream,
            server,
            max_length: self.max_length.filter(|n| *n > 0),
            group,
            consumer,
        })
    }
}

/// Validated configuration for a `QueueClient`
///
/// `stream` + `group` identify one logical queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub stream: String,
    pub server: ServerAddress,
    /// Append trims the oldest entries beyond this length
    pub max_length: Option<u64>,
    pub group: String,
    pub consumer: String,
}

impl QueueConfig {
    /// Shortcut for `QueueOptions` with only the required fields
    pub fn new(stream: impl Into<String>, server: impl Into<String>) -> Result<Self, ConfigError> {
        QueueOptions::new().stream(stream).server(server).build()
    }

    /// Same queue, different consumer identity
    pub fn with_consumer(&self, consumer: impl Into<String>) -> Self {
        Self {
            consumer: consumer.into(),
            ..self.clone()
        }
    }

    pub fn with_group(&self, group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_stream_name() {
        let config = QueueConfig::new("balltube", "127.0.0.1:6379").unwrap();
        assert_eq!(config.group, "balltube");
        assert_eq!(config.consumer, "balltube");
        assert_eq!(config.max_length, None);
    }

    #[test]
    fn test_missing_required_fields() {
        let err = QueueOptions::new().server("127.0.0.1:6379").build().unwrap_err();
        assert_eq!(err, ConfigError::MissingStream);

        let err = QueueOptions::new().stream("s").build().unwrap_err();
        assert_eq!(err, ConfigError::MissingServer);

        let err = QueueOptions::new().stream("s").server("nope").build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServer(_)));
    }

    #[test]
    fn test_zero_max_length_is_unlimited() {
        let config = QueueOptions::new()
            .stream("s")
            .server("h:1")
            .max_length(0)
            .build()
            .unwrap();
        assert_eq!(config.max_length, None);
    }

    #[test]
    fn test_from_json_camel_case() {
        let options = QueueOptions::from_json_str(
            r#"{"stream":"balltube","server":"10.0.0.1:6379:pw",
                "maxLength":1000,"consumer":"normal"}"#,
        )
        .unwrap();
        let config = options.build().unwrap();

        assert_eq!(config.max_length, Some(1000));
        assert_eq!(config.consumer, "normal");
        assert_eq!(config.group, "balltube");
        assert_eq!(config.server.auth.as_deref(), Some("pw"));
    }

    #[test]
    fn test_merge_prefers_overlay() {
        let base = QueueOptions::new().stream("a").server("h:1").consumer("c1");
        let merged = base.merge(QueueOptions::new().consumer("c2"));

        assert_eq!(merged.stream.as_deref(), Some("a"));
        assert_eq!(merged.consumer.as_deref(), Some("c2"));
    }

    #[test]
    fn test_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"stream":"jobs","server":"localhost:6379"}}"#).unwrap();

        let config = QueueOptions::from_file(file.path()).unwrap().build().unwrap();
        assert_eq!(config.stream, "jobs");
        assert_eq!(config.server.port, 6379);
    }
}
