//! VKontakte adapter (OpenGraph metadata of the public page)

use async_trait::async_trait;
use tracing::info;

use footprint_core::{FetchError, Profile};
use footprint_net::{urls_in_text, Fetcher, Page};

use crate::{drop_own_links, host_and_segments, host_is, link_on, Adapter};

const PLATFORM: &str = "vkontakte";

const RESERVED_PATHS: &[&str] = &[
    "feed", "search", "login", "join", "im", "friends", "groups", "music", "video", "apps",
    "settings", "about", "support", "terms", "privacy", "dev", "blog", "jobs", "wall",
];

/// Screen name or `id<number>` from a `vk.com/<name>` URL
pub fn vkontakte_username(url: &str) -> Option<String> {
    let (host, segments) = host_and_segments(url)?;
    if !host_is(&host, "vk.com") || segments.len() != 1 {
        return None;
    }
    let name = &segments[0];
    if name.contains('.') || RESERVED_PATHS.contains(&name.to_lowercase().as_str()) {
        return None;
    }
    Some(name.clone())
}

/// Build a profile from the public page
pub fn parse_vkontakte_page(html: &str, url: &str, username: &str) -> Profile {
    let page = Page::parse(html, url);

    let title = page.meta("og:title").or_else(|| page.title()).unwrap_or_default();
    let name = title.split(" | ").next().unwrap_or_default();

    let mut profile = Profile::new(PLATFORM, url)
        .with_username(username)
        .with_name(name);
    profile.bio = page.description().unwrap_or_default();

    if let Some(id) = username
        .strip_prefix("id")
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
    {
        profile.set_field("user_id", id);
    }

    for link in urls_in_text(&profile.bio) {
        profile.add_link(&link);
    }
    profile
}

/// VKontakte user pages
pub struct VkontakteAdapter {
    fetcher: Fetcher,
}

impl VkontakteAdapter {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Adapter for VkontakteAdapter {
    fn platform(&self) -> &'static str {
        PLATFORM
    }

    fn matches(&self, url: &str) -> bool {
        vkontakte_username(url).is_some()
    }

    async fn fetch(&self, url: &str) -> Result<Profile, FetchError> {
        let username = vkontakte_username(url)
            .ok_or_else(|| FetchError::Invalid(format!("not a VKontakte page: {}", url)))?;
        info!("Fetching VKontakte page {}", username);

        let html = self
            .fetcher
            .get_text(url, &[("Accept-Language", "en-US,en;q=0.5")])
            .await?;

        let mut profile = parse_vkontakte_page(&html, url, &username);
        drop_own_links(&mut profile, |l| link_on(l, "vk.com"));
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches() {
        assert!(vkontakte_username("https://vk.com/johndoe").is_some());
        assert!(vkontakte_username("https://vk.com/id12345").is_some());
        assert!(vkontakte_username("https://VK.COM/johndoe").is_some());
        assert!(vkontakte_username("https://vk.com/feed").is_none());
        assert!(vkontakte_username("https://twitter.com/johndoe").is_none());
        assert!(vkontakte_username("https://example.com").is_none());
    }

    #[test]
    fn test_username() {
        assert_eq!(vkontakte_username("https://vk.com/xrock").as_deref(), Some("xrock"));
        assert_eq!(vkontakte_username("https://www.vk.com/username").as_deref(), Some("username"));
    }

    #[test]
    fn test_parse_page() {
        let html = r#"<html><head>
            <title>Ivan Petrov | VK</title>
            <meta property="og:description" content="Photographer. https://ivan.photo">
        </head><body></body></html>"#;
        let profile = parse_vkontakte_page(html, "https://vk.com/id12345", "id12345");
        assert_eq!(profile.name, "Ivan Petrov");
        assert_eq!(profile.field("user_id"), Some("12345"));
        assert_eq!(profile.social_links, vec!["https://ivan.photo".to_string()]);
    }
}
