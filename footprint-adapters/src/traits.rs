//! Common adapter interface

use async_trait::async_trait;
use url::Url;

use footprint_core::{ensure_scheme, FetchError, Profile};

/// A platform-specific extraction strategy
///
/// Matching is a pure predicate over the URL string. `fetch` must be safe to
/// call concurrently for different URLs and routes all I/O through the
/// injected [`Fetcher`](footprint_net::Fetcher).
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Platform tag written to every profile this adapter produces
    fn platform(&self) -> &'static str;

    /// Whether this adapter handles `url`. Never performs I/O.
    fn matches(&self, url: &str) -> bool;

    /// Whether fetching needs login credentials
    fn requires_auth(&self) -> bool {
        false
    }

    /// Whether the query string is part of this platform's profile identity
    fn keeps_query(&self) -> bool {
        false
    }

    /// Profile URL for `username` on platforms addressable by username alone.
    /// Used to synthesize guess candidates.
    fn profile_url(&self, _username: &str) -> Option<String> {
        None
    }

    /// Fetch and normalize the profile at `url`
    async fn fetch(&self, url: &str) -> Result<Profile, FetchError>;
}

/// Lowercased host without a leading `www.`, plus non-empty path segments
pub(crate) fn host_and_segments(raw: &str) -> Option<(String, Vec<String>)> {
    let url = Url::parse(&ensure_scheme(raw)).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
    let segments = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    Some((host, segments))
}

/// Whether `host` is `domain` or one of its subdomains
pub(crate) fn host_is(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Whether a link lives on `domain` (or a subdomain)
pub(crate) fn link_on(link: &str, domain: &str) -> bool {
    host_and_segments(link).is_some_and(|(host, _)| host_is(&host, domain))
}

/// Drop links pointing back at the adapter's own platform from both link lists
pub(crate) fn drop_own_links<F>(profile: &mut Profile, own: F)
where
    F: Fn(&str) -> bool,
{
    profile.social_links.retain(|l| !own(l));
    profile.verified_links.retain(|l| !own(l));
}
