use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
///
/// These errors cover both parsing failures and the policy applied to
/// user-submitted feed URLs (SSRF protection).
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Returns the parsed URL when `candidate` is an absolute URL with both a
/// scheme and a host.
///
/// This is the validity rule for every URL found inside feed content
/// (homepages, enclosures, permalinks). Relative references, bare paths and
/// host-less schemes such as `mailto:` are rejected rather than coerced.
///
/// ```
/// use castfeed::util::is_absolute_url;
///
/// assert!(is_absolute_url("http://example.com").is_some());
/// assert!(is_absolute_url("/episodes/1.mp3").is_none());
/// assert!(is_absolute_url("mailto:host@example.com").is_none());
/// assert!(is_absolute_url("http:example.com/ep.mp3").is_none());
/// ```
pub fn is_absolute_url(candidate: &str) -> Option<Url> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return None;
    }
    let url = Url::parse(trimmed).ok()?;
    // `http:example.com` parses with a host, but only after the parser
    // inserted the missing `//`.
    let has_authority = trimmed
        .get(url.scheme().len()..)
        .is_some_and(|rest| rest.starts_with("://"));
    if !has_authority {
        return None;
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Some(url),
        _ => None,
    }
}

/// Validates a URL string submitted as a feed source.
///
/// Rejects:
/// - Non-HTTP(S) schemes (e.g., `file://`, `ftp://`)
/// - URLs without a host
/// - Localhost addresses (`localhost`, `127.0.0.1`, `::1`) unless `allow_private`
/// - Private IP ranges (RFC 1918, link-local, unique local IPv6) unless `allow_private`
///
/// # Errors
///
/// Returns [`UrlValidationError`] describing the first rule the URL breaks.
///
/// # Examples
///
/// ```
/// use castfeed::util::validate_url;
///
/// let url = validate_url("https://example.com/feed.xml", false).unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("http://localhost/feed", false).is_err());
/// assert!(validate_url("http://localhost/feed", true).is_ok());
/// assert!(validate_url("file:///etc/passwd", true).is_err());
/// ```
pub fn validate_url(url_str: &str, allow_private: bool) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
    if allow_private {
        return Ok(url);
    }

    if host == "localhost" {
        return Err(UrlValidationError::Localhost);
    }

    // Strip brackets from IPv6 addresses for parsing
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
        if ip.is_loopback() {
            return Err(UrlValidationError::Localhost);
        }
        if is_private_ip(&ip) {
            return Err(UrlValidationError::PrivateIp(ip.to_string()));
        }
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_urls_accepted() {
        assert!(is_absolute_url("http://example.com").is_some());
        assert!(is_absolute_url("https://cdn.example.com/ep1.mp3?x=1").is_some());
        assert!(is_absolute_url("  https://example.com/padded  ").is_some());
    }

    #[test]
    fn test_relative_and_hostless_rejected() {
        assert!(is_absolute_url("").is_none());
        assert!(is_absolute_url("   ").is_none());
        assert!(is_absolute_url("/episodes/1.mp3").is_none());
        assert!(is_absolute_url("episode-1").is_none());
        assert!(is_absolute_url("urn:uuid:1234").is_none());
        assert!(is_absolute_url("mailto:someone@example.com").is_none());
    }

    #[test]
    fn test_coerced_authority_rejected() {
        assert!(is_absolute_url("http:example.com/ep.mp3").is_none());
        assert!(is_absolute_url("http:/example.com/ep.mp3").is_none());
        assert!(is_absolute_url("HTTPS://example.com/ep.mp3").is_some());
    }

    #[test]
    fn test_valid_urls() {
        assert!(validate_url("https://example.com/feed.xml", false).is_ok());
        assert!(validate_url("http://news.example.org", false).is_ok());
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(validate_url("file:///etc/passwd", false).is_err());
        assert!(validate_url("ftp://example.com", false).is_err());
        assert!(validate_url("ftp://example.com", true).is_err());
    }

    #[test]
    fn test_localhost_rejected() {
        assert!(validate_url("http://localhost/feed", false).is_err());
        assert!(validate_url("http://127.0.0.1/feed", false).is_err());
        assert!(validate_url("http://[::1]/feed", false).is_err());
    }

    #[test]
    fn test_private_ips_rejected() {
        assert!(validate_url("http://192.168.1.1/feed", false).is_err());
        assert!(validate_url("http://10.0.0.1:3000/feed", false).is_err());
        assert!(validate_url("http://172.16.0.1/feed", false).is_err());
        assert!(validate_url("http://169.254.1.1/feed", false).is_err());
        assert!(validate_url("http://[fe80::1]/feed", false).is_err());
        assert!(validate_url("http://0.0.0.0/feed", false).is_err());
    }

    #[test]
    fn test_private_hosts_allowed_when_configured() {
        assert!(validate_url("http://127.0.0.1:8080/feed", true).is_ok());
        assert!(validate_url("http://192.168.1.1/feed", true).is_ok());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            validate_url("not a url", false),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }
}
