use thiserror::Error;
use url::Url;

/// Errors that can occur while validating a subscription URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
}

/// Parses a user-supplied feed URL, accepting only `http` and `https`.
///
/// Surrounding whitespace is ignored.
pub fn parse_feed_url(input: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(input.trim())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// Resolves a possibly relative `href` against a base URL.
///
/// Falls back to the raw `href` when either side does not parse.
pub fn resolve_href(href: &str, base: &str) -> String {
    match Url::parse(base).and_then(|b| b.join(href)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => href.to_owned(),
    }
}

/// Returns `<origin>/favicon.ico` for a site URL.
pub fn default_favicon_url(site_url: &str) -> Option<String> {
    let url = Url::parse(site_url).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.join("/favicon.ico").ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feed_url_accepts_http() {
        let url = parse_feed_url("  https://example.com/feed.xml ").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_parse_feed_url_rejects_other_schemes() {
        assert!(matches!(
            parse_feed_url("file:///etc/passwd"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            parse_feed_url("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_resolve_relative_href() {
        assert_eq!(
            resolve_href("/page/2", "https://example.com/feed.xml"),
            "https://example.com/page/2"
        );
        assert_eq!(
            resolve_href("https://other.org/x", "https://example.com/"),
            "https://other.org/x"
        );
    }

    #[test]
    fn test_default_favicon() {
        assert_eq!(
            default_favicon_url("https://example.com/some/page").as_deref(),
            Some("https://example.com/favicon.ico")
        );
        assert_eq!(default_favicon_url("mailto:a@b.c"), None);
    }
}
