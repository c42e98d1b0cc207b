//! Fetch configuration.
//!
//! Every knob has a default, so an empty TOML file (or no file at all) gives
//! the standard Uniswap V3 run: 15 concurrent windows, 250k-row cap per day,
//! output under `data/uniswap_v3/`.
//!
//! ```toml
//! protocol = "uniswap_v3"
//! output_dir = "data"
//! concurrency = 15
//! query_size = 250000
//!
//! [subgraph]
//! deployment_id = "QmQJovmQLigEwkMWGjMT8GbeS2gjDytqWCGL58BEhLu9Ag"
//! ```

use crate::data::query::DEFAULT_QUERY_SIZE;
use crate::data::subgraph::{
    ClientOptions, SubgraphEndpoint, DEFAULT_DEPLOYMENT_ID, DEFAULT_PAGE_SIZE,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Label written into the first column of every row and used as the output subdirectory.
    pub protocol: String,

    /// Root directory for artifacts.
    pub output_dir: PathBuf,

    /// Maximum number of windows fetched at once.
    pub concurrency: usize,

    /// Row cap per window.
    pub query_size: usize,

    /// Rows requested per GraphQL page.
    pub page_size: usize,

    /// Wall-clock limit for one window's fetch and write.
    pub timeout_secs: u64,

    /// Limit for a single HTTP request.
    pub request_timeout_secs: u64,

    pub max_retries: u32,

    /// Re-fetch windows whose artifact already exists.
    pub force: bool,

    pub subgraph: SubgraphConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SubgraphConfig {
    pub deployment_id: String,

    /// Full endpoint URL; overrides `deployment_id` when set.
    pub url: Option<String>,

    pub api_key: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            protocol: "uniswap_v3".into(),
            output_dir: PathBuf::from("data"),
            concurrency: 15,
            query_size: DEFAULT_QUERY_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: 600,
            request_timeout_secs: 60,
            max_retries: 3,
            force: false,
            subgraph: SubgraphConfig::default(),
        }
    }
}

impl Default for SubgraphConfig {
    fn default() -> Self {
        Self {
            deployment_id: DEFAULT_DEPLOYMENT_ID.into(),
            url: None,
            api_key: None,
        }
    }
}

impl SubgraphConfig {
    pub fn endpoint(&self) -> SubgraphEndpoint {
        match &self.url {
            Some(url) => SubgraphEndpoint {
                url: url.clone(),
                api_key: self.api_key.clone(),
            },
            None => SubgraphEndpoint::playgrounds(&self.deployment_id, self.api_key.clone()),
        }
    }
}

impl FetchConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol.trim().is_empty() {
            return Err(ConfigError::Invalid("protocol must not be empty".into()));
        }
        if self.protocol.contains(['/', '\\']) || self.protocol == ".." {
            return Err(ConfigError::Invalid(format!(
                "protocol '{}' cannot be used as a directory name",
                self.protocol
            )));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.concurrency > Semaphore::MAX_PERMITS {
            return Err(ConfigError::Invalid(format!(
                "concurrency must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.query_size == 0 || self.page_size == 0 {
            return Err(ConfigError::Invalid(
                "query_size and page_size must be at least 1".into(),
            ));
        }
        if self.timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least 1s".into()));
        }
        if self.subgraph.url.is_none() && self.subgraph.deployment_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "subgraph needs either a deployment_id or a url".into(),
            ));
        }
        Ok(())
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn client_options(&self) -> ClientOptions {
        let defaults = ClientOptions::default();
        ClientOptions {
            page_size: self.page_size,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            max_retry_after: defaults.max_retry_after.min(self.operation_timeout()),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = FetchConfig::from_toml("").unwrap();
        assert_eq!(config, FetchConfig::default());
        assert_eq!(config.concurrency, 15);
        assert_eq!(config.query_size, 250_000);
        assert_eq!(config.protocol, "uniswap_v3");
    }

    #[test]
    fn partial_override() {
        let config = FetchConfig::from_toml(
            r#"
concurrency = 4
output_dir = "/tmp/swaps"

[subgraph]
api_key = "k"
"#,
        )
        .unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/swaps"));
        assert_eq!(config.subgraph.deployment_id, DEFAULT_DEPLOYMENT_ID);
        assert_eq!(config.subgraph.endpoint().api_key.as_deref(), Some("k"));
    }

    #[test]
    fn url_overrides_deployment() {
        let sub = SubgraphConfig {
            url: Some("http://localhost:8000/subgraphs/name/uni".into()),
            ..SubgraphConfig::default()
        };
        assert_eq!(sub.endpoint().url, "http://localhost:8000/subgraphs/name/uni");
    }

    #[test]
    fn rejects_zero_concurrency_and_unknown_keys() {
        assert!(matches!(
            FetchConfig::from_toml("concurrency = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            FetchConfig::from_toml("concurency = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_concurrency_beyond_semaphore_limit() {
        let mut config = FetchConfig {
            concurrency: usize::MAX,
            ..FetchConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.concurrency = Semaphore::MAX_PERMITS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn retry_after_is_capped_by_operation_timeout() {
        let config = FetchConfig {
            timeout_secs: 5,
            ..FetchConfig::default()
        };
        assert_eq!(config.client_options().max_retry_after, Duration::from_secs(5));
        assert_eq!(
            FetchConfig::default().client_options().max_retry_after,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn rejects_path_like_protocol() {
        assert!(FetchConfig::from_toml(r#"protocol = "../up""#).is_err());
    }
}
