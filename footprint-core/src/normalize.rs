//! URL normalization
//!
//! Two URLs with the same normalized form are the same frontier key:
//! lowercase host, default port dropped, fragment dropped, one trailing slash
//! stripped, query stripped unless the owning platform needs it.

use url::Url;

use crate::FetchError;

/// Prefix scheme-less input ("github.com/octo") with https
pub fn ensure_scheme(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains("://") || has_opaque_scheme(raw) {
        raw.to_string()
    } else {
        format!("https://{}", raw.trim_start_matches("//"))
    }
}

// "mailto:x", "tel:123" but not "localhost:8080"
fn has_opaque_scheme(raw: &str) -> bool {
    match raw.split_once(':') {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && scheme.chars().all(|c| c.is_ascii_alphabetic())
                && !rest.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Parse into a `Url`, accepting scheme-less input. Only http(s) URLs with a host pass.
pub fn parse_web_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(&ensure_scheme(raw))
        .map_err(|e| FetchError::Invalid(format!("{}: {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::Invalid(format!(
            "unsupported scheme {} in {}",
            url.scheme(),
            raw
        )));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(FetchError::Invalid(format!("missing host in {}", raw))),
    }
}

/// Canonical frontier key for a URL
pub fn normalize_url(raw: &str, keep_query: bool) -> Result<String, FetchError> {
    let url = parse_web_url(raw)?;
    // parse_web_url guarantees a host
    let host = url.host_str().unwrap_or_default().to_lowercase();

    let mut out = format!("{}://{}", url.scheme(), host);
    // Url::port() is None when the port is the scheme default
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }

    let path = url.path();
    out.push_str(path.strip_suffix('/').unwrap_or(path));

    if keep_query {
        if let Some(query) = url.query().filter(|q| !q.is_empty()) {
            out.push('?');
            out.push_str(query);
        }
    }

    Ok(out)
}

/// Authority (host plus explicit port) of a URL, or `None` if unparseable.
/// Scheme and path do not participate.
pub fn host_key(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_lowercase();
    if host.is_empty() {
        return None;
    }
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(
            normalize_url("https://GitHub.com/Octo/", false).unwrap(),
            "https://github.com/Octo"
        );
        assert_eq!(
            normalize_url("http://example.com:80/about", false).unwrap(),
            "http://example.com/about"
        );
        assert_eq!(
            normalize_url("https://example.com:443", false).unwrap(),
            "https://example.com"
        );
        assert_eq!(
            normalize_url("https://example.com:8443/x", false).unwrap(),
            "https://example.com:8443/x"
        );
    }

    #[test]
    fn test_normalize_query_and_fragment() {
        assert_eq!(
            normalize_url("https://example.com/p?ref=bio#top", false).unwrap(),
            "https://example.com/p"
        );
        assert_eq!(
            normalize_url("https://example.com/p?id=7#top", true).unwrap(),
            "https://example.com/p?id=7"
        );
    }

    #[test]
    fn test_normalize_strips_single_trailing_slash() {
        assert_eq!(
            normalize_url("https://example.com/a//", false).unwrap(),
            "https://example.com/a/"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "https://GitHub.com/Octo/",
            "linkedin.com/in/johndoe",
            "http://example.com:80/",
            "https://mastodon.social/@alice?x=1",
            "https://example.com/a%20b/",
        ];
        for input in inputs {
            let once = normalize_url(input, false).unwrap();
            let twice = normalize_url(&once, false).unwrap();
            assert_eq!(once, twice, "not idempotent for {}", input);
        }
    }

    #[test]
    fn test_scheme_less_input() {
        assert_eq!(
            normalize_url("linkedin.com/in/johndoe", false).unwrap(),
            "https://linkedin.com/in/johndoe"
        );
    }

    #[test]
    fn test_rejects_non_web() {
        assert!(normalize_url("mailto:a@b.com", false).is_err());
        assert!(normalize_url("ftp://example.com/x", false).is_err());
        assert!(normalize_url("https://", false).is_err());
    }

    #[test]
    fn test_host_key() {
        assert_eq!(host_key("https://API.github.com/users/x"), Some("api.github.com".into()));
        assert_eq!(host_key("http://example.com:8080/"), Some("example.com:8080".into()));
        assert_eq!(host_key("http://example.com:80/"), Some("example.com".into()));
        assert_eq!(host_key("not a url"), None);
    }
}
