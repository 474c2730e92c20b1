//! Crawl configuration
//!
//! Every field has a default, so a TOML file only needs the values it changes:
//!
//! ```toml
//! max_depth = 3
//! guess = true
//!
//! [weights]
//! min_confidence = 0.5
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use footprint_core::GuessWeights;

/// Errors loading or validating a [`CrawlConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {0}: {1}")]
    Io(String, std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Limits and policy for one crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Links deeper than this are recorded as skipped, never fetched
    pub max_depth: usize,
    /// Maximum fetches dispatched per crawl
    pub max_visited: usize,
    /// Concurrent fetches
    pub workers: usize,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
    /// Minimum delay between requests to one host
    pub min_host_delay_ms: u64,
    /// Response cache lifetime
    pub cache_ttl_secs: u64,
    /// Overall crawl deadline; none by default
    pub crawl_timeout_secs: Option<u64>,
    /// Pause before the single retry of a retryable failure
    pub retry_backoff_ms: u64,
    /// Synthesize username-based guess candidates
    pub guess: bool,
    /// Guess scoring weights
    pub weights: GuessWeights,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_visited: 25,
            workers: 4,
            request_timeout_secs: 5,
            min_host_delay_ms: 600,
            cache_ttl_secs: 86_400,
            crawl_timeout_secs: None,
            retry_backoff_ms: 1_000,
            guess: false,
            weights: GuessWeights::default(),
        }
    }
}

impl CrawlConfig {
    /// Load from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
        Self::from_toml_str(&content)
    }

    /// Parse from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_visited(mut self, max_visited: usize) -> Self {
        self.max_visited = max_visited;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_guess(mut self, guess: bool) -> Self {
        self.guess = guess;
        self
    }

    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    pub fn with_crawl_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.crawl_timeout_secs = secs;
        self
    }

    /// Reject settings no crawl can run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_visited == 0 {
            return Err(ConfigError::Invalid("max_visited must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be at least 1".into()));
        }
        if self.crawl_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("crawl_timeout_secs must be at least 1".into()));
        }
        if !self.weights.is_valid() {
            return Err(ConfigError::Invalid("guess weights must lie in [0, 1]".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn min_host_delay(&self) -> Duration {
        Duration::from_millis(self.min_host_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn crawl_timeout(&self) -> Option<Duration> {
        self.crawl_timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
