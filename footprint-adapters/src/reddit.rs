//! Reddit adapter
//!
//! Reads `/user/<name>/about.json`, which carries the display name, the
//! profile description and karma counts without any HTML scraping.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::info;

use footprint_core::{FetchError, Profile};
use footprint_net::{urls_in_text, Fetcher};

use crate::{drop_own_links, host_and_segments, host_is, link_on, Adapter};

const PLATFORM: &str = "reddit";

/// Username from `reddit.com/user/<name>` or `reddit.com/u/<name>` (any subdomain)
pub fn reddit_username(url: &str) -> Option<String> {
    let (host, segments) = host_and_segments(url)?;
    if !host_is(&host, "reddit.com") || segments.len() < 2 {
        return None;
    }
    match segments[0].to_lowercase().as_str() {
        "user" | "u" => Some(segments[1].clone()),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct AboutResponse {
    data: AboutData,
}

#[derive(Debug, Deserialize)]
struct AboutData {
    name: String,
    #[serde(default)]
    link_karma: i64,
    #[serde(default)]
    comment_karma: i64,
    #[serde(default)]
    created_utc: Option<f64>,
    #[serde(default)]
    subreddit: Option<UserSubreddit>,
}

/// Reddit stores profile text on the user's personal subreddit
#[derive(Debug, Deserialize)]
struct UserSubreddit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    public_description: String,
}

/// Build a profile from an `about.json` body
pub fn parse_reddit_about(json: &str, url: &str) -> Result<Profile, FetchError> {
    let about: AboutResponse = serde_json::from_str(json)
        .map_err(|e| FetchError::Invalid(format!("{}: bad Reddit response: {}", url, e)))?;
    let data = about.data;

    let mut profile = Profile::new(PLATFORM, url).with_username(&data.name);

    if let Some(sub) = data.subreddit {
        profile = profile.with_name(&sub.title);
        profile.bio = sub.public_description.trim().to_string();
        for link in urls_in_text(&sub.public_description) {
            profile.add_link(&link);
        }
    }

    profile.set_field("post_karma", data.link_karma.to_string());
    profile.set_field("comment_karma", data.comment_karma.to_string());
    if let Some(created) = data
        .created_utc
        .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
    {
        profile.set_field("joined", created.format("%Y-%m-%d").to_string());
    }

    Ok(profile)
}

/// Reddit user profiles
pub struct RedditAdapter {
    fetcher: Fetcher,
}

impl RedditAdapter {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Adapter for RedditAdapter {
    fn platform(&self) -> &'static str {
        PLATFORM
    }

    fn matches(&self, url: &str) -> bool {
        reddit_username(url).is_some()
    }

    fn profile_url(&self, username: &str) -> Option<String> {
        let url = format!("https://www.reddit.com/user/{}", urlencoding::encode(username));
        self.matches(&url).then_some(url)
    }

    async fn fetch(&self, url: &str) -> Result<Profile, FetchError> {
        let username = reddit_username(url)
            .ok_or_else(|| FetchError::Invalid(format!("not a Reddit profile: {}", url)))?;
        info!("Fetching Reddit profile {}", username);

        let about_url = format!(
            "https://www.reddit.com/user/{}/about.json",
            urlencoding::encode(&username)
        );
        let body = self.fetcher.get_text(&about_url, &[]).await?;

        let mut profile = parse_reddit_about(&body, url)?;
        drop_own_links(&mut profile, |l| link_on(l, "reddit.com"));
        Ok(profile)
    }
}
