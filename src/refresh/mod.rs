//! Refresh orchestration: one feed on demand, or every feed in a batch.
//!
//! Single-feed refreshes return their error to the caller. Batch refreshes
//! log each feed's error and keep going, so one broken feed never blocks
//! the others.

mod scheduler;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::app::AppError;
use crate::feed::{parse_feed_text, to_iso, Fetcher};
use crate::storage::{articles_from_parsed, Article, FeedInfo, KeyValueStore, Storage};

pub use scheduler::{spawn_scheduler, SchedulerHandle};

/// Result of refreshing one feed inside a batch.
#[derive(Debug)]
pub struct RefreshOutcome {
    pub feed_id: String,
    /// Number of articles stored for the feed after the merge, or why the
    /// feed failed.
    pub result: Result<usize, AppError>,
}

/// Fetches, parses and merges one feed. Returns the feed's stored list
/// after the merge.
///
/// # Errors
///
/// Propagates fetch, parse and storage failures unchanged. Nothing is
/// written when the fetch or parse fails.
pub async fn refresh_feed<S: KeyValueStore>(
    fetcher: &Fetcher,
    storage: &Storage<S>,
    feed: &FeedInfo,
) -> Result<Vec<Article>, AppError> {
    let text = fetcher.fetch_text(&feed.url).await?;
    let parsed = parse_feed_text(&text)?;
    let fetched = parsed.len();
    let merged = storage
        .merge_and_save_articles(&feed.id, articles_from_parsed(&feed.id, parsed))
        .await?;
    tracing::debug!(
        feed = %feed.url,
        fetched = fetched,
        stored = merged.len(),
        "Refreshed feed"
    );
    Ok(merged)
}

/// Refreshes every stored feed with at most `concurrency` in flight, then
/// records the sync time.
///
/// Results are returned in completion order. With `concurrency == 1` feeds
/// are processed strictly one after another.
pub async fn refresh_all<S: KeyValueStore>(
    fetcher: &Fetcher,
    storage: &Storage<S>,
    concurrency: usize,
) -> Vec<RefreshOutcome> {
    let feeds = storage.get_feeds().await;
    let total = feeds.len();

    let outcomes: Vec<RefreshOutcome> = stream::iter(feeds)
        .map(|feed| {
            let fetcher = fetcher.clone();
            let storage = storage.clone();
            async move {
                let result = refresh_feed(&fetcher, &storage, &feed)
                    .await
                    .map(|stored| stored.len());
                if let Err(e) = &result {
                    tracing::warn!(feed = %feed.url, error = %e, "Feed refresh failed, skipping");
                }
                RefreshOutcome {
                    feed_id: feed.id,
                    result,
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    tracing::info!(total = total, failed = failed, "Refreshed all feeds");

    if let Err(e) = storage.update_last_sync(&to_iso(&Utc::now())).await {
        tracing::warn!(error = %e, "Failed to record last sync time");
    }

    outcomes
}
