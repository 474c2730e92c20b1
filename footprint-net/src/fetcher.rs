//! Cached, rate-limited fetch path
//!
//! Adapters never talk to reqwest directly. `Fetcher::get` runs:
//! cache lookup → per-host wait → request → status classification → cache write.
//! Cache hits skip the rate limiter entirely.

use reqwest::header::{HeaderMap, ETAG};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use footprint_core::FetchError;

use crate::{create_client, CachedResponse, DomainRateLimiter, HttpConfig, NetError, SharedCache};

/// Response headers worth keeping in the cache
const KEPT_HEADERS: &[&str] = &["content-type", "last-modified", "location"];

/// Shared fetch path handed to every adapter
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    cache: SharedCache,
    limiter: Arc<DomainRateLimiter>,
}

impl Fetcher {
    pub fn new(
        config: &HttpConfig,
        cache: SharedCache,
        limiter: Arc<DomainRateLimiter>,
    ) -> Result<Self, NetError> {
        Ok(Self {
            client: create_client(config)?,
            cache,
            limiter,
        })
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<DomainRateLimiter> {
        &self.limiter
    }

    /// GET a URL with extra request headers.
    ///
    /// Requests carrying a `Cookie` header are private: they are neither served
    /// from nor written to the cache.
    pub async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<CachedResponse, FetchError> {
        let private = headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("cookie"));

        if !private {
            if let Some(hit) = self.cache.get(url).await {
                return Ok(hit);
            }
        }

        self.limiter.wait(url).await;
        debug!("GET {}", url);

        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| classify_reqwest_error(&e, url))?;

        if let Some(err) = FetchError::from_status(response.status().as_u16(), url) {
            debug!("{} -> {}", url, response.status());
            return Err(err);
        }

        let kept = collect_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(&e, url))?;

        let mut cached = CachedResponse::new(body.to_vec()).with_etag(&kept.0);
        cached.headers = kept.1;

        if !private {
            self.cache.set_async(url, cached.clone());
        }
        Ok(cached)
    }

    /// GET and decode the body as UTF-8 (lossy)
    pub async fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, FetchError> {
        let response = self.get(url, headers).await?;
        Ok(String::from_utf8_lossy(&response.body).into_owned())
    }

    /// GET and deserialize a JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let response = self.get(url, headers).await?;
        serde_json::from_slice(&response.body)
            .map_err(|e| FetchError::Invalid(format!("{}: bad JSON: {}", url, e)))
    }
}

fn collect_headers(headers: &HeaderMap) -> (String, BTreeMap<String, String>) {
    let etag = headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let kept = KEPT_HEADERS
        .iter()
        .filter_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect();

    (etag, kept)
}

/// Map a transport error onto the fetch taxonomy
pub fn classify_reqwest_error(err: &reqwest::Error, url: &str) -> FetchError {
    if err.is_builder() {
        return FetchError::Invalid(format!("{}: {}", url, err));
    }
    if err.is_decode() || (err.is_body() && !err.is_timeout()) {
        return FetchError::Invalid(format!("{}: {}", url, err));
    }
    if let Some(status) = err.status() {
        if let Some(mapped) = FetchError::from_status(status.as_u16(), url) {
            return mapped;
        }
    }
    FetchError::TransientNetwork(format!("{}: {}", url, err))
}
