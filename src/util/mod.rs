//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **Identifiers**: Stable hash-based ids for feeds and articles
//! - **URLs**: Subscription URL validation and relative link resolution
//!
//! # Examples
//!
//! ```
//! use feedloom::util::{article_id_from_link, feed_id_from_url};
//!
//! // Re-adding the same URL with different casing names the same feed
//! assert_eq!(
//!     feed_id_from_url("HTTPS://Example.com/feed.xml"),
//!     feed_id_from_url("https://example.com/feed.xml"),
//! );
//!
//! // Article ids only depend on the link
//! let id = article_id_from_link("https://example.com/post-1");
//! assert_eq!(id.len(), 16);
//! ```

mod ids;
mod links;

pub use ids::{article_id_from_link, feed_id_from_url, hash_to_id};
pub use links::{default_favicon_url, parse_feed_url, resolve_href, UrlValidationError};
