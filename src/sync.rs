//! Hook for pushing bookmark changes to another device.
//!
//! Only the no-op implementation ships; [`crate::app::App`] calls the hook
//! after every bookmark change so a real backend can be dropped in later.

use futures::future::{self, BoxFuture};

pub trait SyncService: Send + Sync {
    /// Called with the full set of bookmarked article ids.
    fn sync_bookmarks<'a>(&'a self, bookmark_ids: &'a [String]) -> BoxFuture<'a, ()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSyncService;

impl SyncService for NoopSyncService {
    fn sync_bookmarks<'a>(&'a self, bookmark_ids: &'a [String]) -> BoxFuture<'a, ()> {
        tracing::trace!(count = bookmark_ids.len(), "Bookmark sync is disabled");
        Box::pin(future::ready(()))
    }
}
