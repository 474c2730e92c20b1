//! Footprint Runtime - the discovery crawl
//!
//! Ties the registry, adapters and network layer into one entry point:
//! - `CrawlEngine::discover`: seeds in, identity and diagnostics out
//! - `Frontier`: dedup and depth/budget bookkeeping under one lock
//! - `Diagnostics`: visits, failures, skips and truncation cause
//! - `CrawlConfig`: limits and policy, loadable from TOML

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod frontier;

pub use config::*;
pub use diagnostics::*;
pub use engine::*;
pub use frontier::*;
