//! Platform registry
//!
//! An ordered list of adapters with a mandatory fallback. Dedicated platforms
//! are tried first in insertion order; the fallback is held separately and is
//! returned when nothing else matches, so resolution cannot fail.

use std::sync::Arc;

use footprint_net::Fetcher;

use crate::{
    Adapter, CodebergAdapter, GenericAdapter, GitHubAdapter, LinkedInAdapter, MastodonAdapter,
    RedditAdapter, VkontakteAdapter,
};

/// Shared adapter handle
pub type AdapterHandle = Arc<dyn Adapter>;

/// Ordered URL → adapter routing
#[derive(Clone)]
pub struct Registry {
    adapters: Vec<AdapterHandle>,
    fallback: AdapterHandle,
}

impl Registry {
    /// Empty registry routing everything to `fallback`
    pub fn new(fallback: AdapterHandle) -> Self {
        Self {
            adapters: Vec::new(),
            fallback,
        }
    }

    /// Append a dedicated adapter after those already registered
    pub fn with(mut self, adapter: AdapterHandle) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// All built-in adapters, most specific first.
    ///
    /// Credentials come from the environment: `GITHUB_TOKEN` for the GitHub
    /// API and `LINKEDIN_COOKIE` for LinkedIn.
    pub fn standard(fetcher: Fetcher) -> Self {
        let github_token = std::env::var("GITHUB_TOKEN").ok();
        let linkedin_cookie = std::env::var("LINKEDIN_COOKIE").ok();

        Self::new(Arc::new(GenericAdapter::new(fetcher.clone())))
            .with(Arc::new(GitHubAdapter::new(fetcher.clone()).with_token(github_token)))
            .with(Arc::new(CodebergAdapter::new(fetcher.clone())))
            .with(Arc::new(LinkedInAdapter::new(fetcher.clone()).with_cookie(linkedin_cookie)))
            .with(Arc::new(RedditAdapter::new(fetcher.clone())))
            .with(Arc::new(VkontakteAdapter::new(fetcher.clone())))
            .with(Arc::new(MastodonAdapter::new(fetcher)))
    }

    /// The first adapter whose matcher accepts `url`, else the fallback
    pub fn resolve(&self, url: &str) -> &AdapterHandle {
        self.adapters
            .iter()
            .find(|a| a.matches(url))
            .unwrap_or(&self.fallback)
    }

    /// Platform tag `url` routes to
    pub fn platform_of(&self, url: &str) -> &'static str {
        self.resolve(url).platform()
    }

    /// Platform tags in resolution order, fallback last
    pub fn platforms(&self) -> Vec<&'static str> {
        self.adapters
            .iter()
            .chain(std::iter::once(&self.fallback))
            .map(|a| a.platform())
            .collect()
    }

    /// Adapters in resolution order, fallback last
    pub fn adapters(&self) -> impl Iterator<Item = &AdapterHandle> {
        self.adapters.iter().chain(std::iter::once(&self.fallback))
    }

    /// Candidate profile URLs for `username` on every username-addressable
    /// platform except `exclude`
    pub fn candidate_urls(&self, username: &str, exclude: &str) -> Vec<String> {
        if username.trim().is_empty() {
            return Vec::new();
        }
        self.adapters()
            .filter(|a| a.platform() != exclude)
            .filter_map(|a| a.profile_url(username.trim()))
            .collect()
    }
}
