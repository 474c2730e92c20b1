//! Footprint Adapters
//!
//! Platform-specific extraction strategies behind one [`Adapter`] trait:
//! - **GitHub**: users API plus `rel="me"` links and organizations from the profile page
//! - **Codeberg**: Gitea users API
//! - **LinkedIn**: OpenGraph metadata, session cookie required
//! - **Reddit**: `about.json`
//! - **VKontakte**: OpenGraph metadata
//! - **Mastodon**: account lookup API on any instance, verified profile fields
//! - **Generic**: HTML fallback for everything else
//!
//! [`Registry`] routes a URL to exactly one adapter, generic last.

pub mod codeberg;
pub mod generic;
pub mod github;
pub mod linkedin;
pub mod mastodon;
pub mod reddit;
pub mod registry;
pub mod traits;
pub mod vkontakte;

pub use codeberg::*;
pub use generic::*;
pub use github::*;
pub use linkedin::*;
pub use mastodon::*;
pub use reddit::*;
pub use registry::*;
pub use traits::*;
pub use vkontakte::*;
