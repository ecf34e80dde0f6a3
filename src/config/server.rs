//! Log store server address

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Parsed `host:port[:auth]` server address
#[derive(Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
    /// Optional password sent on connect
    pub auth: Option<String>,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            auth: None,
        }
    }

    pub fn with_auth(mut self, auth: impl Into<String>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    /// Connection URL for the Redis client
    pub fn redis_url(&self) -> String {
        match &self.auth {
            Some(auth) => format!(
                "redis://:{}@{}:{}/",
                urlencoding::encode(auth),
                self.host,
                self.port
            ),
            None => format!("redis://{}:{}/", self.host, self.port),
        }
    }
}

impl FromStr for ServerAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidServer(s.to_string());

        // The auth token may itself contain ':'
        let mut parts = s.splitn(3, ':');
        let host = parts.next().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
        let port = parts
            .next()
            .and_then(|p| p.parse::<u16>().ok())
            .filter(|p| *p != 0)
            .ok_or_else(invalid)?;
        let auth = parts.next().filter(|a| !a.is_empty()).map(str::to_string);

        Ok(Self {
            host: host.to_string(),
            port,
            auth,
        })
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// Never print the auth token
impl fmt::Debug for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerAddress")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth", &self.auth.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port() {
        let addr: ServerAddress = "10.160.75.237:6379".parse().unwrap();
        assert_eq!(addr.host, "10.160.75.237");
        assert_eq!(addr.port, 6379);
        assert!(addr.auth.is_none());
        assert_eq!(addr.redis_url(), "redis://10.160.75.237:6379/");
    }

    #[test]
    fn test_parse_with_auth() {
        let addr: ServerAddress = "localhost:6380:s3cr:t/x".parse().unwrap();
        assert_eq!(addr.port, 6380);
        assert_eq!(addr.auth.as_deref(), Some("s3cr:t/x"));
        assert_eq!(addr.redis_url(), "redis://:s3cr%3At%2Fx@localhost:6380/");
    }

    #[test]
    fn test_reject_malformed() {
        assert!("localhost".parse::<ServerAddress>().is_err());
        assert!(":6379".parse::<ServerAddress>().is_err());
        assert!("localhost:port".parse::<ServerAddress>().is_err());
        assert!("localhost:0".parse::<ServerAddress>().is_err());
    }

    #[test]
    fn test_debug_hides_auth() {
        let addr = ServerAddress::new("h", 1).with_auth("topsecret");
        let shown = format!("{:?}", addr);
        assert!(!shown.contains("topsecret"));
    }
}
