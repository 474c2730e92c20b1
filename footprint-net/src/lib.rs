//! Footprint Network Layer
//!
//! Everything adapters need to talk to the web politely:
//! - HTTP client construction (timeouts, user agents, optional proxy)
//! - Response cache with TTL expiry and optional disk persistence
//! - Per-host rate limiter
//! - A cached, rate-limited fetch path with status classification
//! - HTML helpers for metadata and link extraction

pub mod cache;
pub mod client;
pub mod fetcher;
pub mod html;
pub mod ratelimit;

pub use cache::*;
pub use client::*;
pub use fetcher::*;
pub use html::*;
pub use ratelimit::*;
