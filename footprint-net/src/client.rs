//! HTTP client construction
//!
//! Builds the reqwest client shared by every adapter: short per-request
//! timeout, desktop user agent, optional proxy (e.g. `socks5h://` for Tor).

use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Optional proxy URL (http://, https://, socks5h://)
    pub proxy: Option<String>,
    /// Fixed user agent; a random desktop UA is picked when unset
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            proxy: None,
            user_agent: None,
        }
    }
}

/// Errors from building the network layer
#[derive(Debug, Error)]
pub enum NetError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Invalid proxy URL: {0}")]
    InvalidProxy(String),
}

/// User agents for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:137.0) Gecko/20100101 Firefox/137.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.7; rv:137.0) Gecko/20100101 Firefox/137.0",
];

/// Get a random user agent
pub fn random_user_agent() -> &'static str {
    use rand::Rng;
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

/// Create the shared HTTP client
pub fn create_client(config: &HttpConfig) -> Result<Client, NetError> {
    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| random_user_agent().to_string());

    let mut builder = Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(config.request_timeout)
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(5));

    if let Some(proxy_url) = &config.proxy {
        let proxy =
            Proxy::all(proxy_url).map_err(|e| NetError::InvalidProxy(e.to_string()))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| NetError::ClientBuild(e.to_string()))
}
