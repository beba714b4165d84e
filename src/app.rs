use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::feed::{
    parse_feed, to_iso, CorsSession, FeedMetadata, FetchError, Fetcher, ParseError,
    PersistBlocked, QueryProxy,
};
use crate::refresh::{self, RefreshOutcome, SchedulerHandle};
use crate::storage::{
    articles_from_parsed, Article, Collection, FeedInfo, KeyValueStore, ReadMark, Settings,
    Storage, StorageError,
};
use crate::sync::{NoopSyncService, SyncService};
use crate::util::{default_favicon_url, feed_id_from_url, parse_feed_url, resolve_href, UrlValidationError};

// ============================================================================
// Error Types
// ============================================================================

/// Errors returned by user-initiated operations.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),

    #[error("Unknown feed: {0}")]
    UnknownFeed(String),

    #[error("Unknown article: {0}")]
    UnknownArticle(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),
}

// ============================================================================
// App
// ============================================================================

/// Everything a front end needs: feeds, articles, marks, collections and
/// background refresh, over one [`KeyValueStore`].
pub struct App<S: KeyValueStore> {
    storage: Storage<S>,
    fetcher: Fetcher,
    sync: Arc<dyn SyncService>,
    /// Stored feeds plus placeholders for feeds still being added.
    feeds: RwLock<Vec<FeedInfo>>,
    refresh_concurrency: usize,
}

impl<S: KeyValueStore> App<S> {
    /// Wires the fetcher, proxy and blocked-fetch memory to `store`.
    pub async fn open(config: &Config, store: S) -> Result<Self, AppError> {
        let storage = Storage::new(store);

        let persist_storage = storage.clone();
        let persist: PersistBlocked = Arc::new(move |blocked| {
            let storage = persist_storage.clone();
            Box::pin(async move {
                if let Err(e) = storage.save_cors_blocked(blocked).await {
                    tracing::warn!(error = %e, "Failed to persist blocked-fetch preference");
                }
            })
        });
        let blocked = storage.load_cors_blocked().await;
        if blocked {
            tracing::info!("Direct fetches were blocked previously, using proxy");
        }
        let session = CorsSession::new(blocked).with_persistence(persist);

        let proxy = QueryProxy::from_config(&config.proxy).map_err(FetchError::from)?;
        let client = Fetcher::build_client(config).map_err(FetchError::from)?;
        let fetcher = Fetcher::new(client, Arc::new(proxy), Arc::new(session), config);

        let feeds = storage.get_feeds().await;
        Ok(Self {
            storage,
            fetcher,
            sync: Arc::new(NoopSyncService),
            feeds: RwLock::new(feeds),
            refresh_concurrency: config.refresh_concurrency.max(1),
        })
    }

    /// Replaces the bookmark sync hook.
    pub fn with_sync_service(mut self, sync: Arc<dyn SyncService>) -> Self {
        self.sync = sync;
        self
    }

    pub fn storage(&self) -> &Storage<S> {
        &self.storage
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    // ------------------------------------------------------------------------
    // Feeds
    // ------------------------------------------------------------------------

    /// Current feed list, including feeds whose first fetch is in flight.
    pub async fn feeds(&self) -> Vec<FeedInfo> {
        self.feeds.read().await.clone()
    }

    async fn known_feed(&self, feed_id: &str) -> Result<FeedInfo, AppError> {
        self.storage
            .get_feed(feed_id)
            .await
            .ok_or_else(|| AppError::UnknownFeed(feed_id.to_string()))
    }

    /// Subscribes to `url`, or refreshes the existing subscription with the
    /// same id.
    ///
    /// The document is fetched once: its metadata becomes the feed record and
    /// its items replace the feed's stored articles. While the fetch runs the
    /// feed list carries a loading placeholder, removed again on failure.
    pub async fn add_feed_by_url(&self, url: &str) -> Result<FeedInfo, AppError> {
        parse_feed_url(url)?;
        let url = url.trim().to_string();
        let id = feed_id_from_url(&url);

        let existed = {
            let mut feeds = self.feeds.write().await;
            match feeds.iter_mut().find(|f| f.id == id) {
                Some(feed) => {
                    feed.is_loading = true;
                    true
                }
                None => {
                    feeds.insert(
                        0,
                        FeedInfo {
                            id: id.clone(),
                            url: url.clone(),
                            is_loading: true,
                            ..Default::default()
                        },
                    );
                    false
                }
            }
        };

        match self.load_new_feed(&id, &url).await {
            Ok(feed) => {
                let mut feeds = self.feeds.write().await;
                match feeds.iter_mut().find(|f| f.id == id) {
                    Some(slot) => *slot = feed.clone(),
                    None => feeds.insert(0, feed.clone()),
                }
                tracing::info!(feed = %url, title = %feed.display_title(), "Added feed");
                Ok(feed)
            }
            Err(e) => {
                let mut feeds = self.feeds.write().await;
                if existed {
                    feeds
                        .iter_mut()
                        .filter(|f| f.id == id)
                        .for_each(|f| f.is_loading = false);
                } else {
                    feeds.retain(|f| f.id != id);
                }
                tracing::warn!(feed = %url, error = %e, "Failed to add feed");
                Err(e)
            }
        }
    }

    async fn load_new_feed(&self, id: &str, url: &str) -> Result<FeedInfo, AppError> {
        let text = self.fetcher.fetch_text(url).await?;
        let parsed = parse_feed(&text)?;
        let feed = build_feed_info(id, url, parsed.metadata);
        self.storage.upsert_feed(feed.clone()).await?;

        let articles = articles_from_parsed(id, parsed.articles);
        self.storage.save_articles(id, &articles).await?;
        Ok(feed)
    }

    /// Unsubscribes and drops the feed's articles and collection memberships.
    pub async fn remove_feed(&self, feed_id: &str) -> Result<bool, AppError> {
        let removed = self.storage.remove_feed(feed_id).await?;
        self.feeds.write().await.retain(|f| f.id != feed_id);
        Ok(removed)
    }

    /// Refreshes one feed, propagating any failure.
    pub async fn refresh_feed(&self, feed_id: &str) -> Result<Vec<Article>, AppError> {
        let feed = self.known_feed(feed_id).await?;
        refresh::refresh_feed(&self.fetcher, &self.storage, &feed).await
    }

    /// Refreshes every feed; failures are reported per feed, never returned.
    pub async fn refresh_all(&self) -> Vec<RefreshOutcome> {
        refresh::refresh_all(&self.fetcher, &self.storage, self.refresh_concurrency).await
    }

    /// Starts the periodic background refresh using the stored interval.
    pub async fn start_scheduler(&self) -> SchedulerHandle {
        let period = self.storage.load_settings().await.sync_interval();
        refresh::spawn_scheduler(
            self.fetcher.clone(),
            self.storage.clone(),
            self.refresh_concurrency,
            period,
        )
    }

    // ------------------------------------------------------------------------
    // Articles
    // ------------------------------------------------------------------------

    pub async fn articles(&self, feed_id: &str) -> Vec<Article> {
        self.storage.load_articles(feed_id).await
    }

    /// Articles of every feed, newest first, cross-feed duplicates kept.
    pub async fn all_articles(&self) -> Vec<Article> {
        let feeds = self.storage.get_feeds().await;
        self.storage.load_all_articles(&feeds).await
    }

    pub async fn collection_articles(&self, collection_id: &str) -> Result<Vec<Article>, AppError> {
        let collection = self
            .storage
            .get_collection(collection_id)
            .await
            .ok_or_else(|| AppError::UnknownCollection(collection_id.to_string()))?;
        Ok(self.storage.aggregate_collection_articles(&collection).await)
    }

    async fn known_article(&self, article_id: &str) -> Result<Article, AppError> {
        self.storage
            .find_article(article_id)
            .await
            .ok_or_else(|| AppError::UnknownArticle(article_id.to_string()))
    }

    // ------------------------------------------------------------------------
    // Bookmarks and read marks
    // ------------------------------------------------------------------------

    /// Flips the bookmark and notifies the sync hook. Returns the new state.
    pub async fn toggle_bookmark(&self, article_id: &str) -> Result<bool, AppError> {
        let article = self.known_article(article_id).await?;
        let bookmarked = self.storage.toggle_bookmark(&article).await?;
        let ids: Vec<String> = self.storage.get_bookmarks().await.into_keys().collect();
        self.sync.sync_bookmarks(&ids).await;
        Ok(bookmarked)
    }

    pub async fn bookmarked_articles(&self) -> Vec<Article> {
        self.storage.bookmarked_articles().await
    }

    pub async fn set_article_read(&self, article_id: &str, read: bool) -> Result<(), AppError> {
        if read {
            let article = self.known_article(article_id).await?;
            self.storage.mark_article_read(&article).await?;
        } else {
            self.storage.mark_article_unread(article_id).await?;
        }
        Ok(())
    }

    pub async fn is_article_read(&self, article_id: &str) -> bool {
        self.storage.is_article_read(article_id).await
    }

    pub async fn read_marks(&self) -> Vec<ReadMark> {
        self.storage.get_read_marks().await.into_values().collect()
    }

    pub async fn mark_all_in_feed(&self, feed_id: &str, read: bool) -> Result<(), AppError> {
        self.known_feed(feed_id).await?;
        Ok(self.storage.mark_all_in_feed(feed_id, read).await?)
    }

    // ------------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------------

    pub async fn collections(&self) -> Vec<Collection> {
        self.storage.get_collections().await
    }

    /// Creates a collection over existing feeds.
    pub async fn create_collection(
        &self,
        name: &str,
        feed_ids: Vec<String>,
    ) -> Result<Collection, AppError> {
        for feed_id in &feed_ids {
            self.known_feed(feed_id).await?;
        }
        let collection = Collection::new(name, feed_ids);
        self.storage.add_or_update_collection(collection.clone()).await?;
        Ok(collection)
    }

    pub async fn update_collection(&self, collection: Collection) -> Result<(), AppError> {
        Ok(self.storage.add_or_update_collection(collection).await?)
    }

    pub async fn delete_collection(&self, collection_id: &str) -> Result<(), AppError> {
        if self.storage.remove_collection(collection_id).await? {
            Ok(())
        } else {
            Err(AppError::UnknownCollection(collection_id.to_string()))
        }
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    pub async fn settings(&self) -> Settings {
        self.storage.load_settings().await
    }

    pub async fn save_settings(&self, settings: Settings) -> Result<(), AppError> {
        Ok(self.storage.save_settings(settings).await?)
    }
}

/// Builds the stored record for a feed from its document metadata.
fn build_feed_info(id: &str, url: &str, meta: FeedMetadata) -> FeedInfo {
    let site_url = meta.site_url.as_deref().map(|link| resolve_href(link, url));
    let favicon_url = default_favicon_url(site_url.as_deref().unwrap_or(url));
    FeedInfo {
        id: id.to_string(),
        url: url.to_string(),
        title: meta.title,
        description: meta.description,
        last_build_date: meta.last_build_date.as_ref().map(to_iso),
        site_url,
        favicon_url,
        next_page_url: meta.next_page_url.map(|next| resolve_href(&next, url)),
        is_loading: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_feed_info_resolves_links() {
        let meta = FeedMetadata {
            title: Some("Blog".into()),
            site_url: Some("/".into()),
            next_page_url: Some("?page=2".into()),
            ..Default::default()
        };
        let info = build_feed_info("id", "https://blog.example/feed.xml", meta);
        assert_eq!(info.site_url.as_deref(), Some("https://blog.example/"));
        assert_eq!(
            info.favicon_url.as_deref(),
            Some("https://blog.example/favicon.ico")
        );
        assert_eq!(
            info.next_page_url.as_deref(),
            Some("https://blog.example/feed.xml?page=2")
        );
        assert!(!info.is_loading);
    }

    #[test]
    fn test_favicon_falls_back_to_feed_origin() {
        let info = build_feed_info("id", "https://news.example/rss", FeedMetadata::default());
        assert_eq!(info.site_url, None);
        assert_eq!(
            info.favicon_url.as_deref(),
            Some("https://news.example/favicon.ico")
        );
    }
}
