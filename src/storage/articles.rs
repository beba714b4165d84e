use std::collections::HashSet;

use super::kv::KeyValueStore;
use super::state::{Storage, ARTICLES_KEY_PREFIX};
use super::types::{Article, Collection, FeedInfo, StorageError};

fn articles_key(feed_id: &str) -> String {
    format!("{ARTICLES_KEY_PREFIX}{feed_id}")
}

/// Sorts newest first by ISO date string. Stable: equal dates keep their
/// relative order, undated articles sink to the end.
pub fn sort_by_date_desc(articles: &mut [Article]) {
    articles.sort_by(|a, b| b.date_key().cmp(a.date_key()));
}

/// Replaces existing entries by id in place, appends the rest, then sorts.
pub fn merge_articles(mut existing: Vec<Article>, incoming: Vec<Article>) -> Vec<Article> {
    for article in incoming {
        match existing.iter_mut().find(|a| a.id == article.id) {
            Some(slot) => *slot = article,
            None => existing.push(article),
        }
    }
    sort_by_date_desc(&mut existing);
    existing
}

/// Keeps the first article seen for each link.
pub fn dedup_by_link(articles: Vec<Article>) -> Vec<Article> {
    let mut seen = HashSet::new();
    articles
        .into_iter()
        .filter(|a| seen.insert(a.link.clone()))
        .collect()
}

impl<S: KeyValueStore> Storage<S> {
    /// Stored articles of one feed; empty when missing or unreadable.
    pub async fn load_articles(&self, feed_id: &str) -> Vec<Article> {
        self.read_json(&articles_key(feed_id))
            .await
            .unwrap_or_default()
    }

    /// Overwrites the feed's stored list.
    pub async fn save_articles(&self, feed_id: &str, articles: &[Article]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.write_json(&articles_key(feed_id), &articles).await
    }

    /// Merges a fresh batch into the feed's stored list and returns the
    /// persisted, date-sorted result.
    pub async fn merge_and_save_articles(
        &self,
        feed_id: &str,
        incoming: Vec<Article>,
    ) -> Result<Vec<Article>, StorageError> {
        let _guard = self.write_lock.lock().await;
        let merged = merge_articles(self.load_articles(feed_id).await, incoming);
        self.write_json(&articles_key(feed_id), &merged).await?;
        Ok(merged)
    }

    pub async fn delete_articles(&self, feed_id: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove(&articles_key(feed_id)).await
    }

    async fn concat_articles(&self, feed_ids: &[String]) -> Vec<Article> {
        let mut all = Vec::new();
        for feed_id in feed_ids {
            all.extend(self.load_articles(feed_id).await);
        }
        all
    }

    /// Every article of the given feeds, newest first. Cross-feed duplicates
    /// are kept.
    pub async fn load_all_articles(&self, feeds: &[FeedInfo]) -> Vec<Article> {
        let ids: Vec<String> = feeds.iter().map(|f| f.id.clone()).collect();
        let mut all = self.concat_articles(&ids).await;
        sort_by_date_desc(&mut all);
        all
    }

    /// Articles of the collection's feeds, one per link (first wins in
    /// feed order), newest first.
    pub async fn aggregate_collection_articles(&self, collection: &Collection) -> Vec<Article> {
        let all = self.concat_articles(&collection.feed_ids).await;
        let mut unique = dedup_by_link(all);
        sort_by_date_desc(&mut unique);
        unique
    }

    /// Bookmarked articles still stored under a known feed, newest first.
    pub async fn bookmarked_articles(&self) -> Vec<Article> {
        let state = self.load_state().await;
        let ids: Vec<String> = state.feeds.iter().map(|f| f.id.clone()).collect();
        let mut marked: Vec<Article> = self
            .concat_articles(&ids)
            .await
            .into_iter()
            .filter(|a| state.bookmarks.contains_key(&a.id))
            .collect();
        sort_by_date_desc(&mut marked);
        marked
    }

    /// Looks an article up across every known feed.
    pub async fn find_article(&self, article_id: &str) -> Option<Article> {
        for feed in self.get_feeds().await {
            if let Some(article) = self
                .load_articles(&feed.id)
                .await
                .into_iter()
                .find(|a| a.id == article_id)
            {
                return Some(article);
            }
        }
        None
    }
}
