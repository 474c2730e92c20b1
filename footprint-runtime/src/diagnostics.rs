//! Crawl diagnostics
//!
//! Everything about a crawl that is not the identity itself: what was
//! fetched, what failed and why, what was skipped, and why the crawl stopped
//! early if it did.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use footprint_core::{ErrorKind, FetchError};

/// Why a link was not fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Normalizes to a key already in the frontier
    Duplicate,
    /// Deeper than `max_depth`
    Depth,
    /// Visit budget spent before it was reached
    Budget,
    /// Same platform as the profile that linked to it
    SamePlatform,
    /// Crawl cancelled or timed out first
    Cancelled,
}

/// Why the crawl ended before exhausting the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    Depth,
    Budget,
    Timeout,
    Cancelled,
}

/// A link that was fetched and failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub url: String,
    pub kind: ErrorKind,
    pub detail: String,
    pub attempts: u32,
}

/// A link that was never fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub url: String,
    pub reason: SkipReason,
}

/// A fetch dispatched by the engine, with its place in the crawl tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub url: String,
    pub platform: String,
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_from: Option<String>,
}

/// Crawl report returned alongside the identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub crawl_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Fetches dispatched
    pub visited: usize,
    /// Fetches that produced a profile
    pub resolved: usize,
    pub visits: Vec<VisitRecord>,
    pub failures: Vec<FailureRecord>,
    pub skipped: Vec<SkipRecord>,
    /// Profiles dropped because their platform slot was already filled
    pub discarded: Vec<String>,
    /// Guesses scored below the confidence threshold
    pub rejected_guesses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation: Option<Truncation>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            crawl_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            visited: 0,
            resolved: 0,
            visits: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            discarded: Vec::new(),
            rejected_guesses: Vec::new(),
            truncation: None,
        }
    }

    pub fn record_visit(&mut self, visit: VisitRecord) {
        self.visited += 1;
        self.visits.push(visit);
    }

    pub fn record_failure(&mut self, url: &str, error: &FetchError, attempts: u32) {
        self.failures.push(FailureRecord {
            url: url.to_string(),
            kind: error.kind(),
            detail: error.to_string(),
            attempts,
        });
    }

    pub fn record_skip(&mut self, url: &str, reason: SkipReason) {
        self.skipped.push(SkipRecord {
            url: url.to_string(),
            reason,
        });
    }

    /// Note a truncation cause. The most severe cause seen wins
    /// (cancelled > timeout > budget > depth).
    pub fn truncate(&mut self, reason: Truncation) {
        if self.truncation.map_or(true, |current| reason > current) {
            self.truncation = Some(reason);
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Failures of one kind
    pub fn failures_of(&self, kind: ErrorKind) -> impl Iterator<Item = &FailureRecord> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }

    /// Skips with one reason
    pub fn skipped_for(&self, reason: SkipReason) -> impl Iterator<Item = &SkipRecord> {
        self.skipped.iter().filter(move |s| s.reason == reason)
    }
}
