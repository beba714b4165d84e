use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::feed::{to_iso, ParsedArticle};
use crate::util::article_id_from_link;

/// Sync interval used when the settings do not specify one.
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u32 = 15;

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by storage writes.
///
/// Reads never return these: a missing or corrupt value is recovered to its
/// empty fallback shape and logged instead.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("Storage migration failed: {0}")]
    Migration(String),

    #[error("Failed to serialize stored value: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ============================================================================
// Data Structures
// ============================================================================

/// A persisted article. `id` is derived from `link` alone, so the same URL
/// maps to the same article whichever feed or fetch produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub feed_id: String,
    pub title: String,
    pub content: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Article {
    /// Stamps a parsed article with its derived id and owning feed.
    pub fn from_parsed(feed_id: &str, parsed: ParsedArticle) -> Self {
        Self {
            id: article_id_from_link(&parsed.link),
            feed_id: feed_id.to_string(),
            pub_date: parsed.pub_date.as_ref().map(to_iso),
            title: parsed.title,
            content: parsed.content,
            link: parsed.link,
            image: parsed.image,
        }
    }

    /// Sort key: ISO-8601 strings order lexicographically, undated sorts as "".
    pub fn date_key(&self) -> &str {
        self.pub_date.as_deref().unwrap_or("")
    }
}

/// Converts a whole parsed batch for one feed.
pub fn articles_from_parsed(feed_id: &str, parsed: Vec<ParsedArticle>) -> Vec<Article> {
    parsed
        .into_iter()
        .map(|p| Article::from_parsed(feed_id, p))
        .collect()
}

/// A subscribed feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedInfo {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_build_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_url: Option<String>,
    /// True only while the first fetch of a newly added feed is in flight.
    #[serde(skip)]
    pub is_loading: bool,
}

impl FeedInfo {
    /// Title for display, falling back to the subscription URL.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMark {
    pub id: String,
    pub feed_id: String,
    pub read_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: String,
    pub feed_id: String,
    pub created_at: String,
}

/// A named group of feeds viewed as one deduplicated stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub feed_ids: Vec<String>,
    pub created_at: String,
}

impl Collection {
    /// Creates a collection with a fresh random id.
    pub fn new(name: impl Into<String>, feed_ids: impl IntoIterator<Item = String>) -> Self {
        let mut collection = Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            feed_ids: Vec::new(),
            created_at: to_iso(&chrono::Utc::now()),
        };
        for feed_id in feed_ids {
            collection.add_feed(feed_id);
        }
        collection
    }

    /// Adds a feed unless already present. Returns whether it was added.
    pub fn add_feed(&mut self, feed_id: String) -> bool {
        if self.feed_ids.contains(&feed_id) {
            return false;
        }
        self.feed_ids.push(feed_id);
        true
    }

    /// Drops repeated feed ids, keeping first occurrences in order.
    pub(crate) fn dedup_feed_ids(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.feed_ids.retain(|id| seen.insert(id.clone()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub background_sync_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_interval_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            background_sync_enabled: true,
            sync_interval_minutes: None,
            last_sync_at: None,
        }
    }
}

impl Settings {
    pub fn sync_interval(&self) -> Duration {
        let minutes = self
            .sync_interval_minutes
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_SYNC_INTERVAL_MINUTES);
        Duration::from_secs(u64::from(minutes) * 60)
    }
}

/// The shared state blob. Every field defaults independently so blobs written
/// by older versions load with their missing parts filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredState {
    pub feeds: Vec<FeedInfo>,
    pub bookmarks: BTreeMap<String, Bookmark>,
    pub reads: BTreeMap<String, ReadMark>,
    pub collections: Vec<Collection>,
    pub settings: Settings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_article_from_parsed() {
        let parsed = ParsedArticle {
            title: "T".into(),
            content: "C".into(),
            link: "https://e.com/1".into(),
            pub_date: Some(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap()),
            image: None,
        };
        let article = Article::from_parsed("feed-1", parsed);
        assert_eq!(article.id, article_id_from_link("https://e.com/1"));
        assert_eq!(article.feed_id, "feed-1");
        assert_eq!(article.pub_date.as_deref(), Some("2025-01-01T10:00:00.000Z"));
    }

    #[test]
    fn test_feed_loading_flag_not_persisted() {
        let feed = FeedInfo {
            id: "a".into(),
            url: "https://e.com/rss".into(),
            is_loading: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&feed).unwrap();
        assert!(!json.contains("isLoading"));
        let back: FeedInfo = serde_json::from_str(&json).unwrap();
        assert!(!back.is_loading);
    }

    #[test]
    fn test_legacy_state_fills_defaults() {
        let state: StoredState =
            serde_json::from_str(r#"{"feeds":[{"id":"a","url":"https://e.com/rss"}]}"#).unwrap();
        assert_eq!(state.feeds.len(), 1);
        assert!(state.bookmarks.is_empty());
        assert!(state.reads.is_empty());
        assert!(state.collections.is_empty());
        assert!(state.settings.background_sync_enabled);
    }

    #[test]
    fn test_state_uses_camel_case_keys() {
        let mut state = StoredState::default();
        state.reads.insert(
            "x".into(),
            ReadMark {
                id: "x".into(),
                feed_id: "f".into(),
                read_at: "2025-01-01T00:00:00.000Z".into(),
            },
        );
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"feedId\":\"f\""));
        assert!(json.contains("\"readAt\""));
        assert!(json.contains("\"backgroundSyncEnabled\":true"));
    }

    #[test]
    fn test_sync_interval_default_and_override() {
        let mut settings = Settings::default();
        assert_eq!(settings.sync_interval(), Duration::from_secs(15 * 60));
        settings.sync_interval_minutes = Some(5);
        assert_eq!(settings.sync_interval(), Duration::from_secs(300));
        settings.sync_interval_minutes = Some(0);
        assert_eq!(settings.sync_interval(), Duration::from_secs(15 * 60));
    }

    #[test]
    fn test_collection_feed_ids_stay_unique() {
        let mut c = Collection::new("News", vec!["a".to_string(), "b".to_string(), "a".to_string()]);
        assert_eq!(c.feed_ids, vec!["a", "b"]);
        assert!(!c.add_feed("b".into()));
        assert!(c.add_feed("c".into()));
        c.feed_ids.push("a".into());
        c.dedup_feed_ids();
        assert_eq!(c.feed_ids, vec!["a", "b", "c"]);
        assert_eq!(uuid::Uuid::parse_str(&c.id).unwrap().get_version_num(), 4);
    }
}
