use chrono::{DateTime, Utc};

use super::date::parse_date;
use super::extract::{extract_articles, ParseError, ParsedArticle};
use super::normalize::{normalize, Dialect, FeedDocument};
use super::xml::parse_document;

/// Feed-level metadata, independent of the items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    /// The site the feed belongs to, as written in the document.
    pub site_url: Option<String>,
    pub image: Option<String>,
    pub last_build_date: Option<DateTime<Utc>>,
    pub next_page_url: Option<String>,
}

impl From<&FeedDocument> for FeedMetadata {
    fn from(doc: &FeedDocument) -> Self {
        Self {
            title: doc.title.clone(),
            description: doc.description.clone(),
            site_url: doc.link.clone(),
            image: doc.image.clone(),
            last_build_date: doc.last_build_date.as_deref().and_then(parse_date),
            next_page_url: doc.next_page_url.clone(),
        }
    }
}

/// A fully parsed feed: metadata and articles from one document.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub dialect: Dialect,
    pub metadata: FeedMetadata,
    pub articles: Vec<ParsedArticle>,
}

/// Parses feed text once into metadata plus articles.
///
/// Article extraction is all-or-nothing, see [`extract_articles`].
pub fn parse_feed(text: &str) -> Result<ParsedFeed, ParseError> {
    let doc = normalize(&parse_document(text)?);
    let articles = extract_articles(&doc)?;
    tracing::debug!(
        dialect = ?doc.dialect,
        items = articles.len(),
        "Parsed feed document"
    );
    Ok(ParsedFeed {
        dialect: doc.dialect,
        metadata: FeedMetadata::from(&doc),
        articles,
    })
}

/// Reads only the feed-level metadata. Malformed items do not matter here.
pub fn feed_info(text: &str) -> Result<FeedMetadata, ParseError> {
    let doc = normalize(&parse_document(text)?);
    Ok(FeedMetadata::from(&doc))
}
