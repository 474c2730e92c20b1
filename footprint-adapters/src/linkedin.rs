//! LinkedIn adapter
//!
//! Public profiles sit behind a login wall, so fetching needs a session
//! cookie (`LINKEDIN_COOKIE`). Only OpenGraph metadata is read.

use async_trait::async_trait;
use tracing::{info, warn};

use footprint_core::{FetchError, Profile};
use footprint_net::{Fetcher, Page};

use crate::{drop_own_links, host_and_segments, host_is, link_on, Adapter};

const PLATFORM: &str = "linkedin";

/// Member id from a `linkedin.com/in/<id>` URL
pub fn linkedin_id(url: &str) -> Option<String> {
    let (host, segments) = host_and_segments(url)?;
    if !host_is(&host, "linkedin.com") || segments.len() < 2 {
        return None;
    }
    if !segments[0].eq_ignore_ascii_case("in") {
        return None;
    }
    Some(segments[1].clone())
}

/// Build a profile from an authenticated profile page
pub fn parse_linkedin_page(html: &str, url: &str, id: &str) -> Result<Profile, FetchError> {
    if html.contains("authwall") || html.contains("/uas/login") {
        return Err(FetchError::AuthRequired(format!(
            "{}: session cookie rejected",
            url
        )));
    }

    let page = Page::parse(html, url);
    let title = page
        .meta("og:title")
        .or_else(|| page.title())
        .unwrap_or_default();
    let name = title
        .split(" | ")
        .next()
        .unwrap_or_default()
        .split(" - ")
        .next()
        .unwrap_or_default();

    let mut profile = Profile::new(PLATFORM, url)
        .with_username(id)
        .with_name(name)
        .authenticated(true);
    profile.bio = page.description().unwrap_or_default();

    // "Jane Doe - Staff Engineer - Acme | LinkedIn"
    if let Some(headline) = title.split(" | ").next().and_then(|t| t.split_once(" - ")) {
        profile.set_field("headline", headline.1);
    }

    for link in page.rel_me_links() {
        profile.add_verified_link(&link);
    }
    Ok(profile)
}

/// LinkedIn member profiles
pub struct LinkedInAdapter {
    fetcher: Fetcher,
    cookie: Option<String>,
}

impl LinkedInAdapter {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            cookie: None,
        }
    }

    /// Session cookie header value (e.g. `li_at=...`)
    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie.filter(|c| !c.trim().is_empty());
        self
    }
}

#[async_trait]
impl Adapter for LinkedInAdapter {
    fn platform(&self) -> &'static str {
        PLATFORM
    }

    fn matches(&self, url: &str) -> bool {
        linkedin_id(url).is_some()
    }

    fn requires_auth(&self) -> bool {
        true
    }

    async fn fetch(&self, url: &str) -> Result<Profile, FetchError> {
        let id = linkedin_id(url)
            .ok_or_else(|| FetchError::Invalid(format!("not a LinkedIn profile: {}", url)))?;

        let Some(cookie) = &self.cookie else {
            warn!("Skipping {}: LinkedIn needs LINKEDIN_COOKIE", url);
            return Err(FetchError::AuthRequired(format!(
                "{}: no LinkedIn session cookie",
                url
            )));
        };

        info!("Fetching LinkedIn profile {}", id);
        let html = self.fetcher.get_text(url, &[("Cookie", cookie.as_str())]).await?;

        let mut profile = parse_linkedin_page(&html, url, &id)?;
        drop_own_links(&mut profile, |l| link_on(l, "linkedin.com"));
        Ok(profile)
    }
}
