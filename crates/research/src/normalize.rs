//! URL normalization and candidate filtering.
//!
//! Normalized URLs are the deduplication key of a research session:
//! scheme and host lowercased, default port, fragment and tracking
//! parameters removed, trailing slash stripped.

use url::{form_urlencoded, Url};
use viincci_core::SearchConfig;

/// Query parameters that only identify campaigns or referrers.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "mc_cid", "mc_eid", "ref", "ref_src", "igshid", "yclid", "msclkid", "_ga",
];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Normalize an http(s) URL, or `None` if it is not one.
pub fn normalize_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;

    let mut normalized = format!("{}://{}", url.scheme(), host);
    // `port()` is None for the scheme's default port
    if let Some(port) = url.port() {
        normalized.push_str(&format!(":{}", port));
    }
    normalized.push_str(url.path().trim_end_matches('/'));

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !kept.is_empty() {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept)
            .finish();
        normalized.push('?');
        normalized.push_str(&query);
    }

    Some(normalized)
}

/// Host of a URL, lowercased.
pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Whether `host` is `domain` or a subdomain of it.
pub fn host_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Why a search hit was not fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Unparsable or not http(s)
    InvalidUrl,
    /// Host listed in `skipDomains`
    SkippedDomain(String),
    /// Path ends with an unsupported file extension
    UnsupportedExtension(String),
}

/// Apply the configured host and extension filters to a candidate URL.
pub fn check_candidate(raw: &str, config: &SearchConfig) -> Result<(), Rejection> {
    let url = Url::parse(raw.trim()).map_err(|_| Rejection::InvalidUrl)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Rejection::InvalidUrl);
    }
    let host = url.host_str().ok_or(Rejection::InvalidUrl)?;

    if let Some(domain) = config
        .skip_domains
        .iter()
        .find(|d| host_matches(host, d))
    {
        return Err(Rejection::SkippedDomain(domain.clone()));
    }

    let path = url.path().to_ascii_lowercase();
    if let Some(ext) = config
        .unsupported_extensions
        .iter()
        .find(|ext| path.ends_with(&ext.to_ascii_lowercase()))
    {
        return Err(Rejection::UnsupportedExtension(ext.clone()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_stripped() {
        assert_eq!(normalize_url("http://x.com/a"), normalize_url("http://x.com/a/"));
        assert_eq!(normalize_url("http://x.com/a").as_deref(), Some("http://x.com/a"));
    }

    #[test]
    fn test_root_path_becomes_empty() {
        assert_eq!(normalize_url("https://x.com/").as_deref(), Some("https://x.com"));
        assert_eq!(normalize_url("https://x.com").as_deref(), Some("https://x.com"));
    }

    #[test]
    fn test_scheme_and_host_lowercased() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM/Path").as_deref(),
            Some("https://example.com/Path")
        );
    }

    #[test]
    fn test_tracking_params_removed() {
        assert_eq!(
            normalize_url("https://x.com/a?utm_source=news&id=7&fbclid=abc&UTM_Medium=m")
                .as_deref(),
            Some("https://x.com/a?id=7")
        );
        assert_eq!(
            normalize_url("https://x.com/a?gclid=1").as_deref(),
            Some("https://x.com/a")
        );
    }

    #[test]
    fn test_fragment_and_default_port_removed() {
        assert_eq!(
            normalize_url("http://x.com:80/a#section").as_deref(),
            Some("http://x.com/a")
        );
        assert_eq!(
            normalize_url("http://x.com:8080/a").as_deref(),
            Some("http://x.com:8080/a")
        );
    }

    #[test]
    fn test_non_http_rejected() {
        assert_eq!(normalize_url("ftp://x.com/a"), None);
        assert_eq!(normalize_url("not a url"), None);
    }

    #[test]
    fn test_skip_domains_match_subdomains() {
        let config = SearchConfig::default();
        assert!(matches!(
            check_candidate("https://www.pinterest.com/pin/1", &config),
            Err(Rejection::SkippedDomain(_))
        ));
        assert!(check_candidate("https://notpinterest.com/pin/1", &config).is_ok());
    }

    #[test]
    fn test_unsupported_extension() {
        let config = SearchConfig::default();
        assert!(matches!(
            check_candidate("https://x.com/report.DOCX", &config),
            Err(Rejection::UnsupportedExtension(_))
        ));
        assert!(check_candidate("https://x.com/report.html", &config).is_ok());
    }
}
