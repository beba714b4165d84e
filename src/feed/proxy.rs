use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use url::Url;

use crate::config::ProxyConfig;

/// Fallback transport used when a feed cannot be fetched directly.
///
/// A proxy only rewrites the request URL; the fetcher still performs the
/// request and decodes the echoed response.
pub trait FeedProxy: Send + Sync + fmt::Debug {
    fn proxied_url(&self, target: &str) -> Result<Url, url::ParseError>;
}

/// Proxy that passes the target URL as a query parameter of a fixed endpoint.
pub struct QueryProxy {
    base: Url,
    url_param: String,
    credential: Option<(String, SecretString)>,
}

impl QueryProxy {
    pub fn new(base_url: &str, url_param: impl Into<String>) -> Result<Self, url::ParseError> {
        Ok(Self {
            base: Url::parse(base_url)?,
            url_param: url_param.into(),
            credential: None,
        })
    }

    /// Appends `name=value` to every proxied URL.
    pub fn with_credential(mut self, name: impl Into<String>, value: SecretString) -> Self {
        self.credential = Some((name.into(), value));
        self
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self, url::ParseError> {
        let proxy = Self::new(&config.base_url, config.url_param.clone())?;
        Ok(match (&config.credential_name, &config.credential_value) {
            (Some(name), Some(value)) => proxy.with_credential(name.clone(), value.clone()),
            _ => proxy,
        })
    }
}

impl FeedProxy for QueryProxy {
    fn proxied_url(&self, target: &str) -> Result<Url, url::ParseError> {
        let mut url = self.base.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(&self.url_param, target);
            if let Some((name, value)) = &self.credential {
                query.append_pair(name, value.expose_secret());
            }
        }
        Ok(url)
    }
}

impl fmt::Debug for QueryProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryProxy")
            .field("base", &self.base.as_str())
            .field("url_param", &self.url_param)
            .field(
                "credential",
                &self.credential.as_ref().map(|(name, _)| (name, "[REDACTED]")),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_is_query_encoded() {
        let proxy = QueryProxy::new("https://api.allorigins.win/raw", "url").unwrap();
        let url = proxy
            .proxied_url("https://example.com/feed?a=1&b=2")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.allorigins.win/raw?url=https%3A%2F%2Fexample.com%2Ffeed%3Fa%3D1%26b%3D2"
        );
    }

    #[test]
    fn test_credential_appended() {
        let proxy = QueryProxy::new("https://proxy.example/raw", "target")
            .unwrap()
            .with_credential("key", SecretString::from("abc123".to_string()));
        let url = proxy.proxied_url("https://e.com/rss").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("target".to_string(), "https://e.com/rss".to_string()),
                ("key".to_string(), "abc123".to_string()),
            ]
        );
    }

    #[test]
    fn test_from_config_requires_both_credential_halves() {
        let mut config = ProxyConfig::default();
        config.credential_name = Some("key".into());
        let url = QueryProxy::from_config(&config)
            .unwrap()
            .proxied_url("https://e.com/rss")
            .unwrap();
        assert_eq!(url.query_pairs().count(), 1);
    }

    #[test]
    fn test_from_config_appends_credential() {
        let config = ProxyConfig {
            credential_name: Some("app".into()),
            credential_value: Some(SecretString::from("reader")),
            ..ProxyConfig::default()
        };
        let url = QueryProxy::from_config(&config)
            .unwrap()
            .proxied_url("https://e.com/rss")
            .unwrap();
        assert!(url
            .query_pairs()
            .any(|(k, v)| k == "app" && v == "reader"));
    }

    #[test]
    fn test_debug_hides_credential() {
        let proxy = QueryProxy::new("https://proxy.example/raw", "url")
            .unwrap()
            .with_credential("key", SecretString::from("topsecret".to_string()));
        let out = format!("{:?}", proxy);
        assert!(!out.contains("topsecret"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn test_bad_base_rejected() {
        assert!(QueryProxy::new("not a url", "url").is_err());
    }
}
