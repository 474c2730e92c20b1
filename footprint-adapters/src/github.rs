//! GitHub adapter
//!
//! Profile data comes from the users API. The HTML profile page adds the
//! `rel="me"` links GitHub renders for verified socials, the organization
//! list and the profile README. The page is best-effort: if it fails the API
//! profile is still returned.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::{debug, info};

use footprint_core::{FetchError, Profile};
use footprint_net::{is_email_link, strip_html, Fetcher, Page};

use crate::{drop_own_links, host_and_segments, link_on, Adapter};

const PLATFORM: &str = "github";

/// First path segments that are GitHub product pages, not accounts
const RESERVED_PATHS: &[&str] = &[
    "features", "security", "enterprise", "team", "marketplace", "sponsors", "topics",
    "trending", "collections", "orgs", "solutions", "resources", "customer-stories",
    "partners", "accelerator", "trust-center", "why-github", "mcp", "fluidicon", "login",
    "join", "pricing", "about", "premium-support", "newsletter", "edu", "mobile", "readme",
    "explore", "new", "settings", "notifications", "issues", "pulls", "codespaces", "copilot",
    "actions", "projects", "packages", "discussions", "wiki", "stars", "watching", "search",
    "site", "apps",
];

static ORG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"aria-label="([^"]+)"[^>]*>\s*<img[^>]+alt="@([^"]+)""#).unwrap()
});

static README_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<article[^>]*class="[^"]*markdown-body[^"]*"[^>]*>(.*?)</article>"#)
        .unwrap()
});

/// Username from a `github.com/<user>` profile URL
pub fn github_username(url: &str) -> Option<String> {
    let (host, segments) = host_and_segments(url)?;
    if host != "github.com" || segments.len() != 1 {
        return None;
    }
    let user = &segments[0];
    if RESERVED_PATHS.contains(&user.to_lowercase().as_str()) {
        return None;
    }
    Some(user.clone())
}

/// Users API response
#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    blog: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    twitter_username: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    public_repos: u64,
    #[serde(default)]
    followers: u64,
    #[serde(default)]
    following: u64,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default, rename = "type")]
    account_type: Option<String>,
}

/// Build a profile from a users API JSON body
pub fn parse_github_user(json: &str, url: &str) -> Result<Profile, FetchError> {
    let user: GitHubUser = serde_json::from_str(json)
        .map_err(|e| FetchError::Invalid(format!("{}: bad GitHub API response: {}", url, e)))?;

    let mut profile = Profile::new(PLATFORM, url)
        .with_username(&user.login)
        .with_name(user.name.as_deref().unwrap_or_default());
    profile.bio = user.bio.unwrap_or_default().trim().to_string();
    profile.location = user.location.unwrap_or_default().trim().to_string();

    if let Some(blog) = user.blog.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
        if let Some(email) = blog.strip_prefix("mailto:") {
            profile.set_field("email", email);
        } else {
            let website = if blog.starts_with("http") {
                blog.to_string()
            } else {
                format!("https://{}", blog)
            };
            if is_email_link(&website) {
                let email = website
                    .trim_start_matches("https://")
                    .trim_start_matches("http://");
                profile.set_field("email", email);
            } else {
                profile.set_field("website", website.as_str());
                profile.add_verified_link(&website);
                profile.website = website;
            }
        }
    }

    if let Some(email) = user.email {
        profile.set_field("email", email);
    }
    if let Some(company) = user.company {
        profile.set_field("company", company.trim().trim_start_matches('@'));
    }
    if let Some(twitter) = user.twitter_username.filter(|t| !t.trim().is_empty()) {
        let twitter_url = format!("https://twitter.com/{}", twitter.trim());
        profile.set_field("twitter", twitter_url.as_str());
        profile.add_verified_link(&twitter_url);
    }

    for (key, count) in [
        ("public_repos", user.public_repos),
        ("followers", user.followers),
        ("following", user.following),
    ] {
        if count > 0 {
            profile.set_field(key, count.to_string());
        }
    }
    if let Some(avatar) = user.avatar_url {
        profile.set_field("avatar_url", avatar);
    }
    if let Some(kind) = user.account_type {
        profile.set_field("type", kind);
    }

    Ok(profile)
}

/// Fold profile-page data (verified links, organizations, README) into `profile`
pub fn apply_github_page(profile: &mut Profile, html: &str) {
    let page = Page::parse(html, &profile.url);
    for link in page.rel_me_links() {
        if !is_email_link(&link) {
            profile.add_verified_link(&link);
        }
    }

    let mut orgs: Vec<String> = Vec::new();
    for caps in ORG_REGEX.captures_iter(html) {
        let org = caps[1].trim().to_string();
        if !org.is_empty() && !orgs.contains(&org) {
            orgs.push(org);
        }
    }
    if !orgs.is_empty() {
        profile.set_field("organizations", orgs.join(", "));
    }

    if let Some(readme) = README_REGEX.captures(html).map(|c| c[1].to_string()) {
        let readme_page = Page::parse(&readme, &profile.url);
        for link in readme_page.social_links() {
            profile.add_link(&link);
        }
        profile.unstructured = strip_html(&readme);
    }
}

/// GitHub profiles via the public API
pub struct GitHubAdapter {
    fetcher: Fetcher,
    token: Option<String>,
}

impl GitHubAdapter {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            token: None,
        }
    }

    /// Personal access token for the API (raises the rate limit)
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }
}

#[async_trait]
impl Adapter for GitHubAdapter {
    fn platform(&self) -> &'static str {
        PLATFORM
    }

    fn matches(&self, url: &str) -> bool {
        github_username(url).is_some()
    }

    fn profile_url(&self, username: &str) -> Option<String> {
        let url = format!("https://github.com/{}", urlencoding::encode(username));
        self.matches(&url).then_some(url)
    }

    async fn fetch(&self, url: &str) -> Result<Profile, FetchError> {
        let username = github_username(url)
            .ok_or_else(|| FetchError::Invalid(format!("not a GitHub profile: {}", url)))?;
        info!("Fetching GitHub profile {}", username);

        let api_url = format!("https://api.github.com/users/{}", username);
        let auth = self.token.as_ref().map(|t| format!("token {}", t));
        let mut headers = vec![("Accept", "application/vnd.github.v3+json")];
        if let Some(auth) = &auth {
            headers.push(("Authorization", auth.as_str()));
        }

        let body = self.fetcher.get_text(&api_url, &headers).await?;
        let mut profile = parse_github_user(&body, url)?;

        match self.fetcher.get_text(url, &[]).await {
            Ok(html) => apply_github_page(&mut profile, &html),
            Err(e) => debug!("GitHub page for {} unavailable: {}", username, e),
        }

        drop_own_links(&mut profile, |l| link_on(l, "github.com"));
        Ok(profile)
    }
}
