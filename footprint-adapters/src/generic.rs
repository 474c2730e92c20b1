//! Generic HTML fallback
//!
//! Matches every URL and must be the registry's last entry. Extracts the page
//! title, description, visible text, outbound social links, `rel="me"` links
//! and email addresses. Local, private and cloud-metadata hosts are refused
//! before any request is made.

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::info;
use url::Host;

use footprint_core::{parse_web_url, FetchError, Profile, GENERIC_PLATFORM};
use footprint_net::{email_addresses, is_email_link, Fetcher, Page};

use crate::{drop_own_links, link_on, Adapter};

const BLOCKED_HOSTS: &[&str] = &[
    "localhost",
    "metadata.google.internal",
    "metadata.azure.com",
];

const BLOCKED_SUFFIXES: &[&str] = &[".local", ".internal", ".localhost"];

/// Refuse URLs that resolve to the local machine, private networks or cloud
/// metadata services
pub fn check_public_host(raw: &str) -> Result<(), FetchError> {
    let url = parse_web_url(raw)?;
    let blocked = match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.to_lowercase();
            BLOCKED_HOSTS.contains(&domain.as_str())
                || BLOCKED_SUFFIXES.iter().any(|s| domain.ends_with(s))
        }
        Some(Host::Ipv4(ip)) => !is_public_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => !is_public_ip(IpAddr::V6(ip)),
        None => true,
    };

    if blocked {
        return Err(FetchError::Invalid(format!("{}: refusing non-public host", raw)));
    }
    Ok(())
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.octets()[0] == 0)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_public_v4(v4);
    }
    let first = ip.segments()[0];
    let unique_local = first & 0xfe00 == 0xfc00;
    let link_local = first & 0xffc0 == 0xfe80;
    !(ip.is_loopback() || ip.is_unspecified() || unique_local || link_local)
}

/// Whether an address literal is publicly routable
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}

/// Remove "NOSPAM" markers people put in published addresses
fn clean_email(email: &str) -> String {
    if !email.is_ascii() {
        return email.to_string();
    }
    match email.to_ascii_lowercase().find("nospam") {
        Some(idx) => format!("{}{}", &email[..idx], &email[idx + "nospam".len()..]),
        None => email.to_string(),
    }
}

/// Build a profile from an arbitrary HTML page
pub fn parse_generic_page(html: &str, url: &str) -> Profile {
    let page = Page::parse(html, url);

    let mut profile = Profile::new(GENERIC_PLATFORM, url);
    profile.name = page
        .meta("og:title")
        .or_else(|| page.title())
        .unwrap_or_default();
    profile.bio = page.description().unwrap_or_default();
    profile.unstructured = page.text();

    for link in page.rel_me_links() {
        if !is_email_link(&link) {
            profile.add_verified_link(&link);
        }
    }
    for link in page.social_links() {
        profile.add_link(&link);
    }

    let emails = email_addresses(html);
    for (i, email) in emails.iter().enumerate() {
        let key = if i == 0 {
            "email".to_string()
        } else {
            format!("email_{}", i + 1)
        };
        profile.set_field(&key, clean_email(email));
    }

    profile
}

/// Fallback adapter for any web page
pub struct GenericAdapter {
    fetcher: Fetcher,
}

impl GenericAdapter {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Adapter for GenericAdapter {
    fn platform(&self) -> &'static str {
        GENERIC_PLATFORM
    }

    fn matches(&self, _url: &str) -> bool {
        true
    }

    async fn fetch(&self, url: &str) -> Result<Profile, FetchError> {
        check_public_host(url)?;
        let target = parse_web_url(url)?;
        info!("Fetching page {}", target);

        let html = self
            .fetcher
            .get_text(
                target.as_str(),
                &[
                    ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
                    ("Accept-Language", "en-US,en;q=0.5"),
                ],
            )
            .await?;

        let mut profile = parse_generic_page(&html, url);
        if let Some(host) = target.host_str().map(str::to_string) {
            drop_own_links(&mut profile, |l| link_on(l, host.trim_start_matches("www.")));
        }
        Ok(profile)
    }
}
