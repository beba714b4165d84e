//! Feed ingestion: fetching, decoding, parsing and extraction.
//!
//! Data flows through the submodules in this order:
//!
//! - [`fetcher`] - direct HTTP fetch with a session-remembered proxy fallback
//! - [`decoder`] - turns response bytes into text whatever the compression
//! - [`xml`] / [`normalize`] - RSS 2.0, RDF and Atom onto one document shape
//! - [`extract`] / [`date`] - required-field extraction into [`ParsedArticle`]
//!
//! # Example
//!
//! ```
//! use feedloom::feed::parse_feed_text;
//!
//! let text = r#"<rss version="2.0"><channel><item>
//!     <title>Hello</title>
//!     <link>https://example.com/hello</link>
//!     <description>First post</description>
//! </item></channel></rss>"#;
//! let articles = parse_feed_text(text).unwrap();
//! assert_eq!(articles[0].title, "Hello");
//! ```

pub mod date;
pub mod decoder;
pub mod extract;
mod fetcher;
mod info;
pub mod normalize;
mod proxy;
pub mod xml;

pub use date::{parse_date, to_iso, to_iso_string};
pub use decoder::{decode_text, DecodeStrategy, EncodingHints};
pub use extract::{extract_articles, parse_feed_text, ParseError, ParsedArticle};
pub use fetcher::{CorsSession, FetchError, Fetcher, PersistBlocked};
pub use info::{feed_info, parse_feed, FeedMetadata, ParsedFeed};
pub use normalize::{Dialect, FeedDocument, FeedItem};
pub use proxy::{FeedProxy, QueryProxy};
