use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::kv::KeyValueStore;
use super::types::{
    Article, Bookmark, Collection, FeedInfo, ReadMark, Settings, StorageError, StoredState,
};
use crate::feed::to_iso;

/// Key of the shared state blob.
pub const STATE_KEY: &str = "feedloom_state_v1";
/// Prefix of the per-feed article list keys.
pub const ARTICLES_KEY_PREFIX: &str = "feedloom_articles_v1:";
/// Key of the persisted "direct fetches are blocked" preference.
pub const CORS_BLOCKED_KEY: &str = "feedloom_cors_blocked_v1";

/// Typed access to everything persisted in a [`KeyValueStore`].
///
/// Every read-modify-write goes through one async mutex, so two concurrent
/// mutations can never overwrite each other's changes.
pub struct Storage<S> {
    pub(super) kv: Arc<S>,
    pub(super) write_lock: Arc<Mutex<()>>,
}

impl<S> Clone for Storage<S> {
    fn clone(&self) -> Self {
        Self {
            kv: Arc::clone(&self.kv),
            write_lock: Arc::clone(&self.write_lock),
        }
    }
}

impl<S: KeyValueStore> Storage<S> {
    pub fn new(kv: S) -> Self {
        Self::from_arc(Arc::new(kv))
    }

    pub fn from_arc(kv: Arc<S>) -> Self {
        Self {
            kv,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Underlying key-value store.
    pub fn store(&self) -> &S {
        &self.kv
    }

    // ------------------------------------------------------------------------
    // State blob
    // ------------------------------------------------------------------------

    /// Loads the shared state, recovering to an empty state on any failure.
    pub async fn load_state(&self) -> StoredState {
        self.read_json(STATE_KEY).await.unwrap_or_default()
    }

    /// Applies `f` to the current state and persists the result atomically
    /// with respect to other mutations made through this `Storage`.
    pub(super) async fn update_state<T>(
        &self,
        f: impl FnOnce(&mut StoredState) -> T,
    ) -> Result<T, StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load_state().await;
        let out = f(&mut state);
        self.write_json(STATE_KEY, &state).await?;
        Ok(out)
    }

    pub(super) async fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.kv.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to read stored value, using fallback");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Corrupt stored JSON, using fallback");
                None
            }
        }
    }

    pub(super) async fn write_json<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let json = serde_json::to_string(value)?;
        self.kv.set(key, &json).await
    }

    // ------------------------------------------------------------------------
    // Feeds
    // ------------------------------------------------------------------------

    pub async fn get_feeds(&self) -> Vec<FeedInfo> {
        self.load_state().await.feeds
    }

    pub async fn get_feed(&self, feed_id: &str) -> Option<FeedInfo> {
        self.get_feeds().await.into_iter().find(|f| f.id == feed_id)
    }

    /// Inserts the feed, or replaces the stored feed with the same id in place.
    pub async fn upsert_feed(&self, feed: FeedInfo) -> Result<(), StorageError> {
        self.update_state(|state| {
            match state.feeds.iter_mut().find(|f| f.id == feed.id) {
                Some(existing) => *existing = feed,
                None => state.feeds.push(feed),
            }
        })
        .await
    }

    /// Removes a feed, its stored articles, and its membership in collections.
    ///
    /// Returns `false` when no such feed was stored.
    pub async fn remove_feed(&self, feed_id: &str) -> Result<bool, StorageError> {
        let removed = self
            .update_state(|state| {
                let before = state.feeds.len();
                state.feeds.retain(|f| f.id != feed_id);
                for collection in &mut state.collections {
                    collection.feed_ids.retain(|id| id != feed_id);
                }
                state.feeds.len() != before
            })
            .await?;
        self.delete_articles(feed_id).await?;
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Bookmarks
    // ------------------------------------------------------------------------

    pub async fn get_bookmarks(&self) -> BTreeMap<String, Bookmark> {
        self.load_state().await.bookmarks
    }

    pub async fn is_bookmarked(&self, article_id: &str) -> bool {
        self.get_bookmarks().await.contains_key(article_id)
    }

    /// Flips the bookmark for `article`. Returns the new bookmarked state.
    pub async fn toggle_bookmark(&self, article: &Article) -> Result<bool, StorageError> {
        self.update_state(|state| {
            if state.bookmarks.remove(&article.id).is_some() {
                return false;
            }
            state.bookmarks.insert(
                article.id.clone(),
                Bookmark {
                    id: article.id.clone(),
                    feed_id: article.feed_id.clone(),
                    created_at: to_iso(&Utc::now()),
                },
            );
            true
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Read marks
    // ------------------------------------------------------------------------

    pub async fn get_read_marks(&self) -> BTreeMap<String, ReadMark> {
        self.load_state().await.reads
    }

    pub async fn is_article_read(&self, article_id: &str) -> bool {
        self.get_read_marks().await.contains_key(article_id)
    }

    /// Marks an article read. An existing mark is left untouched.
    pub async fn mark_article_read(&self, article: &Article) -> Result<(), StorageError> {
        let read_at = to_iso(&Utc::now());
        self.update_state(|state| {
            state
                .reads
                .entry(article.id.clone())
                .or_insert_with(|| ReadMark {
                    id: article.id.clone(),
                    feed_id: article.feed_id.clone(),
                    read_at,
                });
        })
        .await
    }

    /// Removes the read mark. Unmarking an unread article is a no-op.
    pub async fn mark_article_unread(&self, article_id: &str) -> Result<(), StorageError> {
        self.update_state(|state| {
            state.reads.remove(article_id);
        })
        .await
    }

    /// Marks every stored article of a feed read, or clears all of the
    /// feed's read marks when `read` is false.
    pub async fn mark_all_in_feed(&self, feed_id: &str, read: bool) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load_state().await;
        if read {
            let read_at = to_iso(&Utc::now());
            for article in self.load_articles(feed_id).await {
                state.reads.insert(
                    article.id.clone(),
                    ReadMark {
                        id: article.id,
                        feed_id: feed_id.to_string(),
                        read_at: read_at.clone(),
                    },
                );
            }
        } else {
            state.reads.retain(|_, mark| mark.feed_id != feed_id);
        }
        self.write_json(STATE_KEY, &state).await
    }

    // ------------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------------

    pub async fn get_collections(&self) -> Vec<Collection> {
        self.load_state().await.collections
    }

    pub async fn get_collection(&self, id: &str) -> Option<Collection> {
        self.get_collections().await.into_iter().find(|c| c.id == id)
    }

    pub async fn save_collections(&self, mut collections: Vec<Collection>) -> Result<(), StorageError> {
        collections.iter_mut().for_each(Collection::dedup_feed_ids);
        self.update_state(|state| state.collections = collections).await
    }

    /// Inserts the collection or replaces the one with the same id.
    pub async fn add_or_update_collection(
        &self,
        mut collection: Collection,
    ) -> Result<(), StorageError> {
        collection.dedup_feed_ids();
        self.update_state(|state| {
            match state.collections.iter_mut().find(|c| c.id == collection.id) {
                Some(existing) => *existing = collection,
                None => state.collections.push(collection),
            }
        })
        .await
    }

    /// Returns `false` when no collection had that id.
    pub async fn remove_collection(&self, id: &str) -> Result<bool, StorageError> {
        self.update_state(|state| {
            let before = state.collections.len();
            state.collections.retain(|c| c.id != id);
            state.collections.len() != before
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    pub async fn load_settings(&self) -> Settings {
        self.load_state().await.settings
    }

    pub async fn save_settings(&self, settings: Settings) -> Result<(), StorageError> {
        self.update_state(|state| state.settings = settings).await
    }

    pub async fn update_last_sync(&self, iso: &str) -> Result<(), StorageError> {
        self.update_state(|state| state.settings.last_sync_at = Some(iso.to_string()))
            .await
    }

    // ------------------------------------------------------------------------
    // Fetch preferences
    // ------------------------------------------------------------------------

    pub async fn load_cors_blocked(&self) -> bool {
        self.read_json(CORS_BLOCKED_KEY).await.unwrap_or(false)
    }

    pub async fn save_cors_blocked(&self, blocked: bool) -> Result<(), StorageError> {
        self.write_json(CORS_BLOCKED_KEY, &blocked).await
    }
}
