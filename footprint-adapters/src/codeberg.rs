//! Codeberg adapter (Gitea users API)

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use footprint_core::{FetchError, Profile};
use footprint_net::Fetcher;

use crate::{drop_own_links, host_and_segments, link_on, Adapter};

const PLATFORM: &str = "codeberg";

const RESERVED_PATHS: &[&str] = &[
    "explore", "user", "repo", "org", "admin", "api", "swagger", "assets", "codeberg",
    "codeberg-infrastructure",
];

/// Username from a `codeberg.org/<user>` profile URL
pub fn codeberg_username(url: &str) -> Option<String> {
    let (host, segments) = host_and_segments(url)?;
    if host != "codeberg.org" || segments.len() != 1 {
        return None;
    }
    let user = &segments[0];
    if RESERVED_PATHS.contains(&user.to_lowercase().as_str()) {
        return None;
    }
    Some(user.clone())
}

#[derive(Debug, Deserialize)]
struct GiteaUser {
    login: String,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    website: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    followers_count: u64,
    #[serde(default)]
    following_count: u64,
    #[serde(default)]
    created: String,
    #[serde(default)]
    pronouns: String,
}

/// Build a profile from a Gitea users API JSON body
pub fn parse_codeberg_user(json: &str, url: &str) -> Result<Profile, FetchError> {
    let user: GiteaUser = serde_json::from_str(json)
        .map_err(|e| FetchError::Invalid(format!("{}: bad Codeberg API response: {}", url, e)))?;

    let mut profile = Profile::new(PLATFORM, url)
        .with_username(&user.login)
        .with_name(&user.full_name);
    profile.bio = user.description.trim().to_string();
    profile.location = user.location.trim().to_string();

    let website = user.website.trim();
    if website.starts_with("http") {
        profile.website = website.to_string();
        profile.add_verified_link(website);
    }

    // Gitea hides addresses as "<user>@noreply.codeberg.org"
    if !user.email.contains("noreply") {
        profile.set_field("email", user.email);
    }
    if user.followers_count > 0 {
        profile.set_field("followers", user.followers_count.to_string());
    }
    if user.following_count > 0 {
        profile.set_field("following", user.following_count.to_string());
    }
    if let Some(date) = user.created.get(..10) {
        profile.set_field("joined", date);
    }
    profile.set_field("pronouns", user.pronouns);

    Ok(profile)
}

/// Codeberg profiles
pub struct CodebergAdapter {
    fetcher: Fetcher,
}

impl CodebergAdapter {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Adapter for CodebergAdapter {
    fn platform(&self) -> &'static str {
        PLATFORM
    }

    fn matches(&self, url: &str) -> bool {
        codeberg_username(url).is_some()
    }

    fn profile_url(&self, username: &str) -> Option<String> {
        let url = format!("https://codeberg.org/{}", urlencoding::encode(username));
        self.matches(&url).then_some(url)
    }

    async fn fetch(&self, url: &str) -> Result<Profile, FetchError> {
        let username = codeberg_username(url)
            .ok_or_else(|| FetchError::Invalid(format!("not a Codeberg profile: {}", url)))?;
        info!("Fetching Codeberg profile {}", username);

        let api_url = format!("https://codeberg.org/api/v1/users/{}", username);
        let body = self
            .fetcher
            .get_text(&api_url, &[("Accept", "application/json")])
            .await?;

        let mut profile = parse_codeberg_user(&body, url)?;
        drop_own_links(&mut profile, |l| link_on(l, "codeberg.org"));
        Ok(profile)
    }
}
