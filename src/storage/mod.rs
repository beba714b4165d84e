//! Persistence for feeds, articles, marks, collections and settings.
//!
//! Everything is stored as JSON strings in a [`KeyValueStore`]: one shared
//! state blob plus one article list per feed. [`Storage`] is the typed layer
//! on top and the single owner of every read-modify-write.

mod articles;
mod kv;
mod schema;
mod state;
mod types;

pub use articles::{dedup_by_link, merge_articles, sort_by_date_desc};
pub use kv::{KeyValueStore, MemoryStore};
pub use schema::SqliteStore;
pub use state::{Storage, ARTICLES_KEY_PREFIX, CORS_BLOCKED_KEY, STATE_KEY};
pub use types::{
    articles_from_parsed, Article, Bookmark, Collection, FeedInfo, ReadMark, Settings,
    StorageError, StoredState, DEFAULT_SYNC_INTERVAL_MINUTES,
};
