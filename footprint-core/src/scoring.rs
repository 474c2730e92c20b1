//! Heuristic scoring for guessed profiles
//!
//! A username guess synthesized in guess mode is compared against the
//! authoritative profiles of the same crawl. Each matching signal adds its
//! configured weight.

use serde::{Deserialize, Serialize};

use crate::Profile;

/// Per-signal weights. Values are configuration, not contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuessWeights {
    /// Exact (case-insensitive) username match
    pub username: f64,
    /// Display name match after whitespace/case folding
    pub name: f64,
    /// Location match after whitespace/case folding
    pub location: f64,
    /// Guesses scoring below this are dropped from the identity
    pub min_confidence: f64,
}

impl Default for GuessWeights {
    fn default() -> Self {
        Self {
            username: 0.5,
            name: 0.3,
            location: 0.2,
            min_confidence: 0.3,
        }
    }
}

impl GuessWeights {
    /// All weights and the threshold must lie in [0, 1]
    pub fn is_valid(&self) -> bool {
        [self.username, self.name, self.location, self.min_confidence]
            .iter()
            .all(|w| (0.0..=1.0).contains(w))
    }
}

/// Outcome of scoring one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct GuessScore {
    pub confidence: f64,
    pub reasons: Vec<String>,
}

fn fold(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Score `candidate` against `anchors` (the authoritative profiles).
///
/// Signals fire at most once each, in the fixed order username, name, location.
pub fn score_guess<'a, I>(candidate: &Profile, anchors: I, weights: &GuessWeights) -> GuessScore
where
    I: IntoIterator<Item = &'a Profile>,
{
    let anchors: Vec<&Profile> = anchors.into_iter().collect();
    let mut confidence = 0.0;
    let mut reasons = Vec::new();

    let username = candidate.username.trim();
    if !username.is_empty()
        && anchors
            .iter()
            .any(|a| a.username.trim().eq_ignore_ascii_case(username))
    {
        confidence += weights.username;
        reasons.push("username".to_string());
    }

    let name = fold(&candidate.name);
    if !name.is_empty() && anchors.iter().any(|a| fold(&a.name) == name) {
        confidence += weights.name;
        reasons.push("name".to_string());
    }

    let location = fold(&candidate.location);
    if !location.is_empty() && anchors.iter().any(|a| fold(&a.location) == location) {
        confidence += weights.location;
        reasons.push("location".to_string());
    }

    GuessScore {
        confidence: confidence.clamp(0.0, 1.0),
        reasons,
    }
}
