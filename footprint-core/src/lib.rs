//! Footprint Core - data model for cross-platform profile discovery
//!
//! This crate provides the foundational primitives:
//! - `Profile`: what one platform says about one account
//! - `Identity`: the per-crawl aggregate, one profile per platform
//! - URL normalization used as the frontier dedup key
//! - The fetch error taxonomy shared by adapters and the crawl engine
//! - Heuristic scoring for guessed profiles

pub mod error;
pub mod identity;
pub mod normalize;
pub mod profile;
pub mod scoring;

pub use error::*;
pub use identity::*;
pub use normalize::*;
pub use profile::*;
pub use scoring::*;

/// Platform tag of the fallback adapter
pub const GENERIC_PLATFORM: &str = "generic";

/// Confidence assigned to authoritative profiles
pub const AUTHORITATIVE_CONFIDENCE: f64 = 1.0;
