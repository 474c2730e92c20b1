//! Normalized profile record
//!
//! A `Profile` is the unit of extracted knowledge about one account on one
//! platform. Adapters produce them; the crawl engine folds them into an
//! [`Identity`](crate::Identity).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::AUTHORITATIVE_CONFIDENCE;

/// Public data extracted from one platform account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Platform tag ("github", "mastodon", "generic", ...)
    pub platform: String,
    /// Exact URL that produced this record
    pub url: String,
    /// Whether login credentials were used to fetch it
    #[serde(default, skip_serializing_if = "is_false")]
    pub authenticated: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bio: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub website: String,

    /// Platform-specific key/value data. Never holds an empty value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<String, String>,

    /// Links that may lead to other profiles of the same person
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub social_links: Vec<String>,
    /// Subset of `social_links` the platform declares as "this is me"
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verified_links: Vec<String>,

    /// Free-text fallback when structured extraction came up short
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unstructured: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub is_guess: bool,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guess_match: Vec<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn default_confidence() -> f64 {
    AUTHORITATIVE_CONFIDENCE
}

impl Profile {
    /// Create an empty profile for a platform/URL pair.
    ///
    /// An empty platform tag falls back to `generic` so the record is always routable.
    pub fn new(platform: &str, url: &str) -> Self {
        let platform = if platform.trim().is_empty() {
            crate::GENERIC_PLATFORM
        } else {
            platform
        };

        Self {
            platform: platform.to_string(),
            url: url.to_string(),
            authenticated: false,
            username: String::new(),
            name: String::new(),
            bio: String::new(),
            location: String::new(),
            website: String::new(),
            fields: BTreeMap::new(),
            social_links: Vec::new(),
            verified_links: Vec::new(),
            unstructured: String::new(),
            is_guess: false,
            confidence: AUTHORITATIVE_CONFIDENCE,
            guess_match: Vec::new(),
        }
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = username.trim().trim_start_matches('@').to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.trim().to_string();
        self
    }

    pub fn authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }

    /// Set a platform-specific field. Empty values are ignored and remove
    /// any previous value under that key.
    pub fn set_field(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            self.fields.remove(key);
            return;
        }
        self.fields.insert(key.to_string(), value.to_string());
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Add a candidate link, skipping duplicates (compared case-insensitively,
    /// ignoring a trailing slash).
    pub fn add_link(&mut self, link: &str) {
        let link = link.trim();
        if link.is_empty() || contains_link(&self.social_links, link) {
            return;
        }
        self.social_links.push(link.to_string());
    }

    /// Add a link the platform itself vouches for
    pub fn add_verified_link(&mut self, link: &str) {
        let link = link.trim();
        if link.is_empty() {
            return;
        }
        self.add_link(link);
        if !contains_link(&self.verified_links, link) {
            self.verified_links.push(link.to_string());
        }
    }

    pub fn is_verified_link(&self, link: &str) -> bool {
        contains_link(&self.verified_links, link)
    }

    /// Mark as a heuristic match with the given score and reasons
    pub fn mark_guess(&mut self, confidence: f64, reasons: Vec<String>) {
        self.is_guess = true;
        self.confidence = confidence.clamp(0.0, 1.0);
        self.guess_match = reasons;
    }

    /// Mark as authoritative (seed or verified link)
    pub fn mark_authoritative(&mut self) {
        self.is_guess = false;
        self.confidence = AUTHORITATIVE_CONFIDENCE;
        self.guess_match.clear();
    }
}

fn link_key(link: &str) -> String {
    link.trim_end_matches('/').to_lowercase()
}

fn contains_link(links: &[String], link: &str) -> bool {
    let key = link_key(link);
    links.iter().any(|l| link_key(l) == key)
}
