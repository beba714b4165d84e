use futures::future::BoxFuture;
use futures::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT, ACCEPT_ENCODING};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::decoder::{decode_with_strategy, EncodingHints};
use super::proxy::FeedProxy;
use crate::config::Config;

const ACCEPT_FEEDS: &str =
    "application/rss+xml, application/atom+xml, application/rdf+xml, application/xml;q=0.9, text/xml;q=0.9, */*;q=0.8";

/// Errors that can occur while fetching a feed document.
///
/// Every transport variant displays with the `Failed to fetch feed` prefix so
/// callers can surface the message as-is.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-success status from the proxy, after any direct attempt.
    #[error("Failed to fetch feed")]
    Failed { status: u16 },
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Failed to fetch feed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Failed to fetch feed: request timed out")]
    Timeout,
    /// Response body exceeded the configured size limit
    #[error("Failed to fetch feed: response too large")]
    ResponseTooLarge,
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Invoked once when a session first detects that direct fetches are blocked.
pub type PersistBlocked = Arc<dyn Fn(bool) -> BoxFuture<'static, ()> + Send + Sync>;

/// Session-wide memory of whether direct fetches are being blocked.
///
/// Starts from the persisted preference and only ever flips to blocked.
/// Concurrent fetches may both observe the block; the flag write is
/// idempotent, so no lock is taken.
pub struct CorsSession {
    blocked: AtomicBool,
    persist: Option<PersistBlocked>,
}

impl CorsSession {
    pub fn new(initially_blocked: bool) -> Self {
        Self {
            blocked: AtomicBool::new(initially_blocked),
            persist: None,
        }
    }

    pub fn with_persistence(mut self, persist: PersistBlocked) -> Self {
        self.persist = Some(persist);
        self
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Relaxed)
    }

    async fn mark_blocked(&self) {
        let was_blocked = self.blocked.swap(true, Ordering::Relaxed);
        if !was_blocked {
            if let Some(persist) = &self.persist {
                persist(true).await;
            }
        }
    }
}

impl std::fmt::Debug for CorsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorsSession")
            .field("blocked", &self.is_blocked())
            .finish_non_exhaustive()
    }
}

/// Outcome of a direct attempt that got as far as a response.
enum Direct {
    Body(String),
    Status(u16),
}

/// Fetches feed text directly, falling back to a proxy.
///
/// - If the session is already marked blocked, the direct attempt is skipped.
/// - A direct attempt that returns a non-success status falls back to the
///   proxy without marking the session.
/// - A direct attempt that errors or times out marks the session blocked,
///   persists that, and falls back to the proxy.
/// - A non-success status from the proxy is terminal.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    proxy: Arc<dyn FeedProxy>,
    session: Arc<CorsSession>,
    timeout: Duration,
    max_size: usize,
}

impl Fetcher {
    pub fn new(
        client: reqwest::Client,
        proxy: Arc<dyn FeedProxy>,
        session: Arc<CorsSession>,
        config: &Config,
    ) -> Self {
        Self {
            client,
            proxy,
            session,
            timeout: config.request_timeout(),
            max_size: config.max_feed_size_bytes,
        }
    }

    /// Builds the HTTP client shared by direct and proxied requests.
    ///
    /// Transparent decompression is left off; bodies are decoded by
    /// [`super::decoder`], which is why gzip/deflate are advertised here.
    pub fn build_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_FEEDS));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
        reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .connect_timeout(config.request_timeout())
            .build()
    }

    pub fn session(&self) -> &CorsSession {
        &self.session
    }

    /// Fetches `url` and returns its decoded text.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        if self.session.is_blocked() {
            tracing::debug!(feed = %url, "Direct fetches blocked this session, using proxy");
            return self.fetch_via_proxy(url).await;
        }

        match self.fetch_direct(url).await {
            Ok(Direct::Body(text)) => Ok(text),
            Ok(Direct::Status(status)) => {
                tracing::debug!(feed = %url, status = status, "Direct fetch failed, retrying via proxy");
                self.fetch_via_proxy(url).await
            }
            Err(FetchError::ResponseTooLarge) => Err(FetchError::ResponseTooLarge),
            // The request never left the client, so it says nothing about blocking
            Err(FetchError::Network(e)) if e.is_builder() => Err(FetchError::Network(e)),
            Err(e) => {
                tracing::warn!(
                    feed = %url,
                    error = %e,
                    "Direct fetch errored, treating as blocked for this session"
                );
                self.session.mark_blocked().await;
                self.fetch_via_proxy(url).await
            }
        }
    }

    async fn fetch_direct(&self, url: &str) -> Result<Direct, FetchError> {
        let response = self.send(url).await?;
        if !response.status().is_success() {
            return Ok(Direct::Status(response.status().as_u16()));
        }
        self.read_text(url, response).await.map(Direct::Body)
    }

    async fn fetch_via_proxy(&self, url: &str) -> Result<String, FetchError> {
        let proxied = self.proxy.proxied_url(url)?;
        let response = self.send(proxied.as_str()).await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            tracing::warn!(feed = %url, status = status, "Proxy fetch failed");
            return Err(FetchError::Failed { status });
        }
        self.read_text(url, response).await
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)
    }

    async fn read_text(&self, url: &str, response: reqwest::Response) -> Result<String, FetchError> {
        let hints = EncodingHints::from_headers(response.headers());
        let bytes = tokio::time::timeout(self.timeout, read_limited_bytes(response, self.max_size))
            .await
            .map_err(|_| FetchError::Timeout)??;
        let (text, strategy) = decode_with_strategy(&bytes, &hints);
        tracing::trace!(feed = %url, strategy = ?strategy, bytes = bytes.len(), "Decoded response body");
        Ok(text)
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("proxy", &self.proxy)
            .field("session", &self.session)
            .field("timeout", &self.timeout)
            .field("max_size", &self.max_size)
            .finish()
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
