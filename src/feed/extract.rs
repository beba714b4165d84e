use chrono::{DateTime, Utc};
use thiserror::Error;

use super::date::parse_date;
use super::normalize::{normalize, FeedDocument, FeedItem};
use super::xml::{parse_document, XmlError};

/// Candidate field names for an article's body, in priority order.
const CONTENT_FIELDS: &[&str] = &["content", "contentSnippet", "description", "subtitle", "summary"];

/// Errors that abort extraction of a feed.
///
/// A single malformed item fails the whole document; no partial article list
/// is ever produced.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("No title found")]
    MissingTitle,

    #[error("No content found")]
    MissingContent,

    #[error("No link found")]
    MissingLink,

    #[error(transparent)]
    Xml(#[from] XmlError),
}

/// An article as read from a feed, before it is given an id or a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArticle {
    pub title: String,
    pub content: String,
    pub link: String,
    pub pub_date: Option<DateTime<Utc>>,
    pub image: Option<String>,
}

/// Parses feed text straight into articles.
pub fn parse_feed_text(text: &str) -> Result<Vec<ParsedArticle>, ParseError> {
    let root = parse_document(text)?;
    extract_articles(&normalize(&root))
}

/// Extracts every item of a normalized document.
///
/// # Errors
///
/// Returns the first [`ParseError`] hit by any item.
pub fn extract_articles(doc: &FeedDocument) -> Result<Vec<ParsedArticle>, ParseError> {
    doc.items.iter().map(extract_article).collect()
}

/// Maps one normalized item onto a [`ParsedArticle`].
pub fn extract_article(item: &FeedItem) -> Result<ParsedArticle, ParseError> {
    let title = required(item.find_similar("title")).ok_or(ParseError::MissingTitle)?;
    let content = CONTENT_FIELDS
        .iter()
        .find_map(|field| required(item.find_similar(field)))
        .ok_or(ParseError::MissingContent)?;
    let link = required(item.find_similar("link")).ok_or(ParseError::MissingLink)?;
    let image = required(item.find_similar("image"));
    let pub_date = item
        .get("pubDate")
        .or_else(|| item.find_similar("date"))
        .and_then(parse_date);

    Ok(ParsedArticle {
        title,
        content,
        link,
        pub_date,
        image,
    })
}

fn required(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RSS2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Sample Feed</title>
    <description>Example</description>
    <link>https://example.com</link>
    <item>
      <title>Post 1</title>
      <link>https://example.com/post-1</link>
      <description><![CDATA[<p>Hello world</p>]]></description>
      <pubDate>Wed, 01 Jan 2025 10:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    const RDF: &str = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/"
         xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel rdf:about="https://slashdot.example/">
    <title>RDF Feed</title>
    <link>https://slashdot.example/</link>
    <description>News</description>
  </channel>
  <item rdf:about="https://slashdot.example/story/1">
    <title>Story</title>
    <description>Story body</description>
    <dc:date>2025-01-02T03:04:05+00:00</dc:date>
  </item>
</rdf:RDF>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Feed</title>
  <link href="https://atom.example/"/>
  <updated>2025-01-03T00:00:00Z</updated>
  <entry>
    <title>Entry</title>
    <link href="https://atom.example/entry"/>
    <id>urn:uuid:60a76c80</id>
    <updated>2025-01-03T00:00:00Z</updated>
    <summary>Entry summary</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_each_dialect_yields_one_article() {
        for text in [RSS2, RDF, ATOM] {
            let articles = parse_feed_text(text).unwrap();
            assert_eq!(articles.len(), 1);
            let a = &articles[0];
            assert!(!a.title.is_empty());
            assert!(!a.link.is_empty());
            assert!(!a.content.is_empty());
            assert!(a.pub_date.is_some());
        }
    }

    #[test]
    fn test_rss2_fields() {
        let a = &parse_feed_text(RSS2).unwrap()[0];
        assert_eq!(a.title, "Post 1");
        assert_eq!(a.link, "https://example.com/post-1");
        assert_eq!(a.content, "<p>Hello world</p>");
        assert_eq!(a.pub_date, Some(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap()));
        assert_eq!(a.image, None);
    }

    #[test]
    fn test_rdf_link_from_about_and_dc_date() {
        let a = &parse_feed_text(RDF).unwrap()[0];
        assert_eq!(a.link, "https://slashdot.example/story/1");
        assert_eq!(a.pub_date, Some(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()));
    }

    #[test]
    fn test_full_content_preferred_over_description() {
        let text = r#"<rss><channel><item>
            <title>T</title><link>https://e.com/1</link>
            <description>Teaser</description>
            <content:encoded>Full body</content:encoded>
        </item></channel></rss>"#;
        assert_eq!(parse_feed_text(text).unwrap()[0].content, "Full body");
    }

    #[test]
    fn test_one_bad_item_fails_whole_feed() {
        let text = r#"<rss><channel>
            <item><title>Good</title><link>https://e.com/1</link><description>D</description></item>
            <item><link>https://e.com/2</link><description>D</description></item>
        </channel></rss>"#;
        assert!(matches!(parse_feed_text(text), Err(ParseError::MissingTitle)));
    }

    #[test]
    fn test_missing_content_and_link() {
        let no_content = "<rss><channel><item><title>T</title><link>https://e.com/1</link></item></channel></rss>";
        assert!(matches!(
            parse_feed_text(no_content),
            Err(ParseError::MissingContent)
        ));

        let no_link = "<rss><channel><item><title>T</title><description>D</description></item></channel></rss>";
        let err = parse_feed_text(no_link).unwrap_err();
        assert!(matches!(err, ParseError::MissingLink));
        assert_eq!(err.to_string(), "No link found");
    }

    #[test]
    fn test_unparseable_date_is_none() {
        let text = r#"<rss><channel><item>
            <title>T</title><link>https://e.com/1</link><description>D</description>
            <pubDate>sometime last week</pubDate>
        </item></channel></rss>"#;
        assert_eq!(parse_feed_text(text).unwrap()[0].pub_date, None);
    }

    #[test]
    fn test_empty_channel_is_not_an_error() {
        let text = r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#;
        assert!(parse_feed_text(text).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_xml_is_an_error() {
        assert!(matches!(
            parse_feed_text("<rss><channel></rss>"),
            Err(ParseError::Xml(_))
        ));
    }
}
