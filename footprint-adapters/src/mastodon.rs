//! Mastodon adapter
//!
//! Works against any instance: `/@user` and `/users/user` paths are treated as
//! fediverse accounts unless the host is a known non-Mastodon site that uses
//! the same path shape. Profile metadata rows that the instance verified
//! (`verified_at` set) become verified links.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use footprint_core::{FetchError, Profile};
use footprint_net::{strip_html, urls_in_text, Fetcher, Page};

use crate::{drop_own_links, host_and_segments, host_is, link_on, Adapter};

const PLATFORM: &str = "mastodon";

/// Sites with `/@name` paths that are not fediverse instances
const NON_MASTODON_HOSTS: &[&str] = &[
    "medium.com",
    "youtube.com",
    "tiktok.com",
    "threads.net",
    "threads.com",
    "substack.com",
    "github.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
];

/// Metadata labels that hold a personal website
const WEBSITE_LABELS: &[&str] = &["website", "web", "blog", "homepage", "home", "site"];

/// Instance host and account name from an account URL
pub fn mastodon_account(url: &str) -> Option<(String, String)> {
    let (host, segments) = host_and_segments(url)?;
    if NON_MASTODON_HOSTS.iter().any(|h| host_is(&host, h)) {
        return None;
    }

    let user = match segments.as_slice() {
        [at_user] => at_user.strip_prefix('@')?.to_string(),
        [users, user] if users == "users" => user.clone(),
        _ => return None,
    };
    if user.is_empty() || user.contains('@') {
        return None;
    }
    Some((host, user))
}

#[derive(Debug, Deserialize)]
struct Account {
    username: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    note: String,
    #[serde(default)]
    followers_count: u64,
    #[serde(default)]
    following_count: u64,
    #[serde(default)]
    statuses_count: u64,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    bot: bool,
    #[serde(default)]
    fields: Vec<AccountField>,
}

#[derive(Debug, Deserialize)]
struct AccountField {
    name: String,
    value: String,
    #[serde(default)]
    verified_at: Option<String>,
}

/// Build a profile from an account lookup JSON body
pub fn parse_mastodon_account(json: &str, url: &str, instance: &str) -> Result<Profile, FetchError> {
    let account: Account = serde_json::from_str(json)
        .map_err(|e| FetchError::Invalid(format!("{}: bad Mastodon response: {}", url, e)))?;

    let mut profile = Profile::new(PLATFORM, url)
        .with_username(&account.username)
        .with_name(&account.display_name);
    profile.bio = strip_html(&account.note);
    profile.set_field("instance", instance);

    for link in Page::parse(&account.note, url).links() {
        profile.add_link(&link);
    }

    for field in &account.fields {
        let text = strip_html(&field.value);
        let label = field.name.trim().to_lowercase();
        profile.set_field(&label, text.as_str());

        let mut links = Page::parse(&field.value, url).links();
        if links.is_empty() {
            links = urls_in_text(&text);
        }
        for link in links {
            if field.verified_at.is_some() {
                profile.add_verified_link(&link);
            } else {
                profile.add_link(&link);
            }
            if profile.website.is_empty() && WEBSITE_LABELS.contains(&label.as_str()) {
                profile.website = link;
            }
        }
    }

    for (key, count) in [
        ("followers", account.followers_count),
        ("following", account.following_count),
        ("posts", account.statuses_count),
    ] {
        if count > 0 {
            profile.set_field(key, count.to_string());
        }
    }
    if let Some(date) = account.created_at.get(..10) {
        profile.set_field("joined", date);
    }
    if account.bot {
        profile.set_field("bot", "true");
    }

    Ok(profile)
}

/// Mastodon-compatible accounts on any instance
pub struct MastodonAdapter {
    fetcher: Fetcher,
}

impl MastodonAdapter {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Adapter for MastodonAdapter {
    fn platform(&self) -> &'static str {
        PLATFORM
    }

    fn matches(&self, url: &str) -> bool {
        mastodon_account(url).is_some()
    }

    async fn fetch(&self, url: &str) -> Result<Profile, FetchError> {
        let (instance, user) = mastodon_account(url)
            .ok_or_else(|| FetchError::Invalid(format!("not a Mastodon account: {}", url)))?;
        info!("Fetching Mastodon account {}@{}", user, instance);

        let lookup_url = format!(
            "https://{}/api/v1/accounts/lookup?acct={}",
            instance,
            urlencoding::encode(&user)
        );
        let body = self.fetcher.get_text(&lookup_url, &[]).await?;

        let mut profile = parse_mastodon_account(&body, url, &instance)?;
        drop_own_links(&mut profile, |l| {
            mastodon_account(l).is_some() || link_on(l, &instance)
        });
        Ok(profile)
    }
}
