//! HTML helpers shared by adapters
//!
//! Title/description/OpenGraph metadata, visible text, outbound link
//! collection, `rel="me"` links and email addresses.

use regex::Regex;
use scraper::{node::Node, ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

/// Maximum characters of visible text kept per page
pub const MAX_TEXT_LENGTH: usize = 4000;

/// Hosts whose profile links are worth following
const SOCIAL_HOSTS: &[&str] = &[
    "github.com",
    "gitlab.com",
    "codeberg.org",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "reddit.com",
    "old.reddit.com",
    "vk.com",
    "bsky.app",
    "instagram.com",
    "facebook.com",
    "youtube.com",
    "medium.com",
    "dev.to",
    "keybase.io",
    "stackoverflow.com",
    "news.ycombinator.com",
    "mastodon.social",
    "fosstodon.org",
    "hachyderm.io",
    "infosec.exchange",
];

/// Path fragments of share/intent widgets rather than profiles
const SHARE_MARKERS: &[&str] = &["/share", "/intent/", "/sharer", "/sharing/", "/home?status="];

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").unwrap()
});

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'()\[\]]+"#).unwrap());

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static META: LazyLock<Selector> = LazyLock::new(|| Selector::parse("meta").unwrap());
static ANCHOR_OR_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href], link[href]").unwrap());

/// A parsed page with convenience accessors
pub struct Page {
    document: Html,
    base: Option<Url>,
}

impl Page {
    pub fn parse(html: &str, base_url: &str) -> Self {
        Self {
            document: Html::parse_document(html),
            base: Url::parse(base_url).ok(),
        }
    }

    /// Contents of `<title>`
    pub fn title(&self) -> Option<String> {
        self.document
            .select(&TITLE)
            .next()
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    }

    /// `content` of the first `<meta>` whose `name` or `property` equals `key`
    pub fn meta(&self, key: &str) -> Option<String> {
        self.document
            .select(&META)
            .find(|el| {
                let v = el.value();
                v.attr("name").is_some_and(|n| n.eq_ignore_ascii_case(key))
                    || v.attr("property").is_some_and(|p| p.eq_ignore_ascii_case(key))
            })
            .and_then(|el| el.value().attr("content"))
            .map(normalize_whitespace)
            .filter(|c| !c.is_empty())
    }

    /// Meta description, falling back to og:description
    pub fn description(&self) -> Option<String> {
        self.meta("description").or_else(|| self.meta("og:description"))
    }

    /// Visible body text with script/style/noscript removed, truncated to
    /// [`MAX_TEXT_LENGTH`] characters
    pub fn text(&self) -> String {
        let Some(body) = self.document.select(&BODY).next() else {
            return String::new();
        };

        let mut parts = Vec::new();
        for node_ref in body.descendants() {
            if let Node::Text(text_node) = node_ref.value() {
                let in_excluded = node_ref.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .map(|el| matches!(el.name(), "script" | "style" | "noscript"))
                        .unwrap_or(false)
                });

                if !in_excluded {
                    let trimmed = text_node.trim();
                    if !trimmed.is_empty() {
                        parts.push(trimmed.to_string());
                    }
                }
            }
        }

        truncate_chars(&normalize_whitespace(&parts.join(" ")), MAX_TEXT_LENGTH)
    }

    /// Every absolute http(s) link on the page, in document order, deduplicated
    pub fn links(&self) -> Vec<String> {
        self.collect_links(|_| true)
    }

    /// Links carrying `rel="me"` (a page's claim that the target is the same person)
    pub fn rel_me_links(&self) -> Vec<String> {
        self.collect_links(|el| {
            el.value()
                .attr("rel")
                .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("me")))
        })
    }

    /// Links that point at known social platforms or fediverse-style profiles
    pub fn social_links(&self) -> Vec<String> {
        self.links().into_iter().filter(|l| is_social_url(l)).collect()
    }

    fn collect_links<F>(&self, keep: F) -> Vec<String>
    where
        F: Fn(&ElementRef) -> bool,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for el in self.document.select(&ANCHOR_OR_LINK) {
            if !keep(&el) {
                continue;
            }
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let Some(resolved) = self.resolve(href) else {
                continue;
            };
            if seen.insert(resolved.trim_end_matches('/').to_lowercase()) {
                out.push(resolved);
            }
        }

        out
    }

    fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }
        let url = match &self.base {
            Some(base) => base.join(href).ok()?,
            None => Url::parse(href).ok()?,
        };
        matches!(url.scheme(), "http" | "https").then(|| url.to_string())
    }
}

/// Whether a URL looks like a profile on a social platform
pub fn is_social_url(link: &str) -> bool {
    let Ok(url) = Url::parse(link) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let path = url.path();

    if path.len() <= 1 {
        return false;
    }

    let lower_path = path.to_lowercase();
    if SHARE_MARKERS.iter().any(|m| lower_path.contains(m)) {
        return false;
    }

    SOCIAL_HOSTS.contains(&host) || path.starts_with("/@")
}

/// Email addresses found in text, deduplicated case-insensitively
pub fn email_addresses(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    EMAIL_REGEX
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|e| !e.ends_with(".png") && !e.ends_with(".jpg") && !e.ends_with(".svg"))
        .filter(|e| seen.insert(e.to_lowercase()))
        .collect()
}

/// Bare http(s) URLs in free text, trailing punctuation trimmed
pub fn urls_in_text(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    URL_REGEX
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']).to_string())
        .filter(|u| seen.insert(u.trim_end_matches('/').to_lowercase()))
        .collect()
}

/// Whether a link is a mailto: or an email address posing as a URL
pub fn is_email_link(link: &str) -> bool {
    let lower = link.trim().to_lowercase();
    if lower.starts_with("mailto:") {
        return true;
    }
    let without_scheme = lower
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    !without_scheme.contains('/') && EMAIL_REGEX.is_match(without_scheme)
}

/// Strip tags from an HTML fragment, keeping paragraph/line breaks as newlines
pub fn strip_html(fragment: &str) -> String {
    let spaced = fragment
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p><p>", "\n");
    let document = Html::parse_fragment(&spaced);
    let text: String = document.root_element().text().collect();
    text.lines()
        .map(normalize_whitespace)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse runs of whitespace to single spaces
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...(truncated)", &text[..idx]),
        None => text.to_string(),
    }
}
