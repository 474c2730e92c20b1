//! Identity aggregate
//!
//! One canonical profile per platform. The first successful fetch for a
//! platform owns the slot; later profiles for that platform are discarded
//! rather than merged, so anonymous data never overwrites auth-backed data.
//!
//! Username guesses are held aside and only compete for platforms that no
//! followed link filled. `IdentityBuilder` grows during a crawl; `finalize`
//! turns it into the read-only [`Identity`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{score_guess, GuessWeights, Profile};

/// How the crawl reached a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Seed, or a chain of verified links from one
    Authoritative,
    /// Followed link without verification
    Linked,
    /// Username candidate synthesized in guess mode
    Guess,
}

/// Result of offering a profile to the aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Profile took an empty platform slot
    Inserted,
    /// Platform slot was already filled
    Discarded,
    /// Guess held back until finalize
    Deferred,
}

/// Mutable aggregate used while a crawl is running
#[derive(Debug, Default)]
pub struct IdentityBuilder {
    profiles: BTreeMap<String, (Profile, Provenance)>,
    guesses: Vec<Profile>,
}

impl IdentityBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a profile. Authoritative and linked profiles take their
    /// platform slot immediately; guesses wait for `finalize`.
    pub fn record(&mut self, mut profile: Profile, provenance: Provenance) -> RecordOutcome {
        if provenance == Provenance::Guess {
            profile.mark_guess(0.0, Vec::new());
            self.guesses.push(profile);
            return RecordOutcome::Deferred;
        }
        if self.profiles.contains_key(&profile.platform) {
            return RecordOutcome::Discarded;
        }

        profile.mark_authoritative();
        self.profiles
            .insert(profile.platform.clone(), (profile, provenance));
        RecordOutcome::Inserted
    }

    /// Score every guess against the authoritative profiles and fill each
    /// still-empty platform with its best guess at or above
    /// `weights.min_confidence`. Ties go to the lexically smaller URL.
    /// Returns the identity and the URLs of guesses left out.
    ///
    /// Scoring happens here, against the final authoritative set, so the
    /// outcome does not depend on fetch completion order.
    pub fn finalize(self, weights: &GuessWeights) -> (Identity, Vec<String>) {
        let anchors: Vec<&Profile> = self
            .profiles
            .values()
            .filter(|(_, provenance)| *provenance == Provenance::Authoritative)
            .map(|(profile, _)| profile)
            .collect();

        let mut best: BTreeMap<String, Profile> = BTreeMap::new();
        let mut rejected = Vec::new();

        for mut guess in self.guesses {
            if self.profiles.contains_key(&guess.platform) {
                rejected.push(guess.url);
                continue;
            }
            let score = score_guess(&guess, anchors.iter().copied(), weights);
            if score.reasons.is_empty() || score.confidence < weights.min_confidence {
                rejected.push(guess.url);
                continue;
            }
            guess.mark_guess(score.confidence, score.reasons);

            let keep = best
                .get(&guess.platform)
                .map_or(true, |held| outranks(&guess, held));
            if !keep {
                rejected.push(guess.url);
            } else if let Some(loser) = best.insert(guess.platform.clone(), guess) {
                rejected.push(loser.url);
            }
        }

        let mut profiles: BTreeMap<String, Profile> = self
            .profiles
            .into_iter()
            .map(|(platform, (profile, _))| (platform, profile))
            .collect();
        profiles.extend(best);

        rejected.sort();
        rejected.dedup();
        (Identity { profiles }, rejected)
    }
}

fn outranks(guess: &Profile, held: &Profile) -> bool {
    guess.confidence > held.confidence
        || (guess.confidence == held.confidence && guess.url < held.url)
}

/// Finalized identity: platform name to profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity {
    profiles: BTreeMap<String, Profile>,
}

impl Identity {
    pub fn get(&self, platform: &str) -> Option<&Profile> {
        self.profiles.get(platform)
    }

    pub fn platforms(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
