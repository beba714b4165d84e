//! Dialect detection and canonicalization of feed documents.
//!
//! RSS 2.0, RSS 1.0 (RDF) and Atom name the same concepts differently. This
//! module maps all three onto one [`FeedDocument`] whose items expose a flat
//! ordered field list, so extraction never needs to know which dialect it is
//! looking at.

use super::xml::Element;

/// The XML schema a feed document was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Rss2,
    Rdf,
    Atom,
    /// No known structure; items were searched generically.
    Generic,
}

/// Canonical feed structure shared by every dialect.
#[derive(Debug, Clone)]
pub struct FeedDocument {
    pub dialect: Dialect,
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    /// Raw, unparsed build date (or the dialect's closest equivalent).
    pub last_build_date: Option<String>,
    /// `rel="next"` pagination link, if the feed advertises one.
    pub next_page_url: Option<String>,
    pub items: Vec<FeedItem>,
}

impl FeedDocument {
    fn empty(dialect: Dialect) -> Self {
        Self {
            dialect,
            title: None,
            link: None,
            description: None,
            image: None,
            last_build_date: None,
            next_page_url: None,
            items: Vec::new(),
        }
    }
}

/// One feed entry as an ordered list of `(field, value)` pairs.
///
/// Normalized fields (`title`, `link`, `description`, `image`, `pubDate`) come
/// first, followed by every raw child element and attribute that carried a
/// value, in document order. Raw fields never shadow normalized ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedItem {
    fields: Vec<(String, String)>,
}

impl FeedItem {
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Value of the field with exactly this name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Exact match first, then the first field whose name contains `name`
    /// case-insensitively (`content` also matches `content:encoded`).
    pub fn find_similar(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.get(name) {
            return Some(value);
        }
        let needle = name.to_lowercase();
        self.fields
            .iter()
            .find(|(k, _)| k.to_lowercase().contains(&needle))
            .map(|(_, v)| v.as_str())
    }

    fn push(&mut self, name: &str, value: Option<String>) {
        if let Some(value) = value {
            if self.get(name).is_none() {
                self.fields.push((name.to_owned(), value));
            }
        }
    }
}

/// Recognizes the dialect of a parsed document and canonicalizes it.
///
/// Detection order is RSS 2.0, RDF, Atom, then a generic item search. A
/// document with no recognizable items yields zero items, not an error.
pub fn normalize(root: &Element) -> FeedDocument {
    match root.local_name() {
        "rss" => {
            if let Some(channel) = root.child_local("channel") {
                return normalize_rss2(channel);
            }
        }
        "RDF" => {
            if let Some(doc) = normalize_rdf(root) {
                return doc;
            }
        }
        "feed" => return normalize_atom(root),
        _ => {}
    }
    normalize_generic(root)
}

fn normalize_rss2(channel: &Element) -> FeedDocument {
    let mut doc = FeedDocument::empty(Dialect::Rss2);
    doc.title = text_of(channel, "title");
    doc.link = text_of(channel, "link");
    doc.description = text_of(channel, "description");
    doc.image = channel
        .child("image")
        .and_then(|img| text_of(img, "url"));
    doc.last_build_date = ["lastBuildDate", "updated", "pubDate", "published", "modified", "issued"]
        .iter()
        .find_map(|name| text_of(channel, name));
    doc.next_page_url = next_link(channel);
    doc.items = channel.children_local("item").map(normalize_item).collect();
    doc
}

fn normalize_rdf(root: &Element) -> Option<FeedDocument> {
    let channel = root.child_local("channel")?;
    let mut doc = FeedDocument::empty(Dialect::Rdf);
    doc.title = text_of(channel, "title");
    doc.link = text_of(channel, "link");
    doc.description = text_of(channel, "description");
    doc.image = root
        .child_local("image")
        .and_then(|img| text_of(img, "url"));
    doc.last_build_date = channel
        .child_local("date")
        .and_then(Element::text)
        .map(str::to_owned);
    doc.next_page_url = next_link(channel);
    // RDF items are siblings of the channel, not children
    doc.items = root.children_local("item").map(normalize_item).collect();
    Some(doc)
}

fn normalize_atom(feed: &Element) -> FeedDocument {
    let mut doc = FeedDocument::empty(Dialect::Atom);
    doc.title = text_of(feed, "title");
    doc.link = pick_atom_link(feed);
    doc.description = text_of(feed, "subtitle");
    doc.image = text_of(feed, "logo").or_else(|| text_of(feed, "icon"));
    doc.last_build_date = ["updated", "published", "modified", "issued", "created"]
        .iter()
        .find_map(|name| text_of(feed, name));
    doc.next_page_url = next_link(feed);
    doc.items = feed.children_local("entry").map(normalize_item).collect();
    doc
}

fn normalize_generic(root: &Element) -> FeedDocument {
    let mut doc = FeedDocument::empty(Dialect::Generic);
    let container = match root.local_name() {
        "channel" | "items" => Some(root),
        _ => root
            .child_local("channel")
            .or_else(|| root.child_local("items")),
    };
    if let Some(container) = container {
        doc.title = text_of(container, "title");
        doc.link = text_of(container, "link");
        doc.description = text_of(container, "description");
        doc.items = container.children_local("item").map(normalize_item).collect();
    }
    doc
}

/// Chooses the feed-level Atom link: explicit `rel="alternate"`, then
/// `rel="self"`, then the first link with an `href`.
fn pick_atom_link(feed: &Element) -> Option<String> {
    let links: Vec<&Element> = feed
        .children_local("link")
        .filter(|l| l.attr("href").is_some())
        .collect();
    let by_rel = |rel: &str| {
        links
            .iter()
            .find(|l| l.attr("rel") == Some(rel))
            .and_then(|l| l.attr("href"))
    };
    by_rel("alternate")
        .or_else(|| by_rel("self"))
        .or_else(|| links.first().and_then(|l| l.attr("href")))
        .map(str::to_owned)
}

fn next_link(container: &Element) -> Option<String> {
    container
        .children_local("link")
        .find(|l| l.attr("rel") == Some("next"))
        .and_then(|l| l.attr("href"))
        .map(str::to_owned)
}

fn text_of(element: &Element, name: &str) -> Option<String> {
    element.child_text(name).map(str::to_owned)
}

/// First non-empty text among the named children.
fn first_text(raw: &Element, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| text_of(raw, name))
}

/// Resolves an item's canonical link.
///
/// `link` elements win (first one with an `href`, else the first one's
/// text), then `rdf:about`, then the Atom `id`.
fn resolve_link(raw: &Element) -> Option<String> {
    let links: Vec<&Element> = raw.children_named("link").collect();
    let from_links = match links.as_slice() {
        [] => None,
        [single] => single
            .attr("href")
            .map(str::to_owned)
            .or_else(|| single.text().map(str::to_owned)),
        many => many
            .iter()
            .find_map(|l| l.attr("href"))
            .map(str::to_owned)
            .or_else(|| many[0].text().map(str::to_owned)),
    };
    from_links
        .or_else(|| raw.attr("rdf:about").map(str::to_owned))
        .or_else(|| raw.attr("about").map(str::to_owned))
        .or_else(|| text_of(raw, "id"))
}

/// Resolves an item image: enclosure, `media:content`, `media:thumbnail`,
/// then an `image` element (its `url` child or its own text).
fn resolve_image(raw: &Element) -> Option<String> {
    let attr_of = |name: &str, attrs: &[&str]| {
        raw.child(name)
            .and_then(|e| attrs.iter().find_map(|a| e.attr(a)))
            .map(str::to_owned)
    };
    attr_of("enclosure", &["url", "href"])
        .or_else(|| attr_of("media:content", &["url"]))
        .or_else(|| attr_of("media:thumbnail", &["url"]))
        .or_else(|| {
            raw.child("image").and_then(|img| {
                text_of(img, "url")
                    .or_else(|| img.attr("url").map(str::to_owned))
                    .or_else(|| img.text().map(str::to_owned))
            })
        })
}

fn normalize_item(raw: &Element) -> FeedItem {
    let mut item = FeedItem::default();

    item.push("title", first_text(raw, &["title", "media:title", "dc:title"]));
    item.push("link", resolve_link(raw));
    item.push(
        "description",
        first_text(
            raw,
            &[
                "description",
                "summary",
                "content",
                "subtitle",
                "contentSnippet",
                "dc:description",
            ],
        ),
    );
    item.push("image", resolve_image(raw));
    item.push(
        "pubDate",
        first_text(
            raw,
            &["pubDate", "updated", "published", "modified", "issued", "created"],
        ),
    );

    // Originals stay available for fuzzy lookups downstream
    for (key, value) in &raw.attributes {
        if !key.starts_with("xmlns") {
            item.push(key, Some(value.clone()));
        }
    }
    for child in &raw.children {
        item.push(&child.name, child.text().map(str::to_owned));
    }

    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::xml::parse_document;

    fn doc(text: &str) -> FeedDocument {
        normalize(&parse_document(text).unwrap())
    }

    #[test]
    fn test_rss2_single_item() {
        let feed = doc(r#"<rss version="2.0"><channel>
            <title>Sample</title><link>https://example.com</link>
            <description>Desc</description>
            <image><url>https://example.com/logo.png</url></image>
            <lastBuildDate>Wed, 01 Jan 2025 10:00:00 GMT</lastBuildDate>
            <item><title>Post</title><link>https://example.com/p</link>
              <description>Body</description>
              <content:encoded><![CDATA[<p>Full</p>]]></content:encoded>
              <enclosure url="https://example.com/i.jpg" type="image/jpeg"/>
            </item>
        </channel></rss>"#);
        assert_eq!(feed.dialect, Dialect::Rss2);
        assert_eq!(feed.title.as_deref(), Some("Sample"));
        assert_eq!(feed.image.as_deref(), Some("https://example.com/logo.png"));
        assert!(feed.last_build_date.is_some());
        assert_eq!(feed.items.len(), 1);
        let item = &feed.items[0];
        assert_eq!(item.get("link"), Some("https://example.com/p"));
        assert_eq!(item.get("image"), Some("https://example.com/i.jpg"));
        assert_eq!(item.get("content:encoded"), Some("<p>Full</p>"));
    }

    #[test]
    fn test_rss2_falls_back_to_pub_date() {
        let feed = doc("<rss><channel><pubDate>Wed, 01 Jan 2025 10:00:00 GMT</pubDate></channel></rss>");
        assert_eq!(
            feed.last_build_date.as_deref(),
            Some("Wed, 01 Jan 2025 10:00:00 GMT")
        );
        assert!(feed.items.is_empty());
    }

    #[test]
    fn test_rdf_items_are_siblings() {
        let feed = doc(r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/">
            <channel rdf:about="https://e.com/"><title>RDF</title><dc:date>2025-01-02T00:00:00Z</dc:date></channel>
            <item rdf:about="https://e.com/1"><title>One</title><description>D</description></item>
            <item rdf:about="https://e.com/2"><title>Two</title><description>D</description></item>
        </rdf:RDF>"#);
        assert_eq!(feed.dialect, Dialect::Rdf);
        assert_eq!(feed.last_build_date.as_deref(), Some("2025-01-02T00:00:00Z"));
        assert_eq!(feed.items.len(), 2);
        assert_eq!(feed.items[1].get("link"), Some("https://e.com/2"));
    }

    #[test]
    fn test_atom_link_preference() {
        let feed = doc(r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <title>Atom</title>
            <link rel="self" href="https://e.com/feed.atom"/>
            <link rel="alternate" href="https://e.com/"/>
            <link rel="next" href="https://e.com/feed.atom?page=2"/>
            <updated>2025-01-03T00:00:00Z</updated>
            <entry><title>E</title><id>urn:uuid:1</id><summary>S</summary></entry>
        </feed>"#);
        assert_eq!(feed.dialect, Dialect::Atom);
        assert_eq!(feed.link.as_deref(), Some("https://e.com/"));
        assert_eq!(
            feed.next_page_url.as_deref(),
            Some("https://e.com/feed.atom?page=2")
        );
        assert_eq!(feed.last_build_date.as_deref(), Some("2025-01-03T00:00:00Z"));
        // Atom id stands in for a missing link
        assert_eq!(feed.items[0].get("link"), Some("urn:uuid:1"));
    }

    #[test]
    fn test_atom_self_link_when_no_alternate() {
        let feed = doc(r#"<feed><link rel="self" href="https://e.com/self"/><link rel="hub" href="https://hub"/></feed>"#);
        assert_eq!(feed.link.as_deref(), Some("https://e.com/self"));
    }

    #[test]
    fn test_atom_self_link_beats_link_without_rel() {
        let feed = doc(r#"<feed>
            <link href="https://e.com/first"/>
            <link rel="self" href="https://e.com/self"/>
        </feed>"#);
        assert_eq!(feed.link.as_deref(), Some("https://e.com/self"));

        // With neither alternate nor self, the first href is used
        let feed = doc(r#"<feed><link href="https://e.com/first"/><link rel="hub" href="https://hub"/></feed>"#);
        assert_eq!(feed.link.as_deref(), Some("https://e.com/first"));
    }

    #[test]
    fn test_atom_entry_with_multiple_links_takes_first_href() {
        let feed = doc(r#"<feed><entry><title>E</title>
            <link rel="alternate" href="https://e.com/a"/>
            <link rel="replies" href="https://e.com/a#comments"/>
        </entry></feed>"#);
        assert_eq!(feed.items[0].get("link"), Some("https://e.com/a"));
    }

    #[test]
    fn test_generic_fallback_and_unknown_root() {
        let feed = doc("<channel><item><title>X</title></item></channel>");
        assert_eq!(feed.dialect, Dialect::Generic);
        assert_eq!(feed.items.len(), 1);

        let feed = doc("<html><body/></html>");
        assert_eq!(feed.dialect, Dialect::Generic);
        assert!(feed.items.is_empty());
    }

    #[test]
    fn test_media_image_order() {
        let feed = doc(r#"<rss><channel><item>
            <media:thumbnail url="https://e.com/thumb.jpg"/>
            <media:content url="https://e.com/full.jpg" medium="image"/>
        </item></channel></rss>"#);
        assert_eq!(feed.items[0].get("image"), Some("https://e.com/full.jpg"));
    }

    #[test]
    fn test_find_similar() {
        let feed = doc(r#"<rss><channel><item>
            <title>T</title><dc:date>2025-01-01</dc:date>
            <content:encoded>Full</content:encoded>
        </item></channel></rss>"#);
        let item = &feed.items[0];
        assert_eq!(item.find_similar("title"), Some("T"));
        assert_eq!(item.find_similar("DATE"), Some("2025-01-01"));
        assert_eq!(item.find_similar("content"), Some("Full"));
        assert_eq!(item.find_similar("author"), None);
    }

    #[test]
    fn test_normalized_fields_not_shadowed_by_raw() {
        let feed = doc(r#"<feed><entry>
            <summary>Short</summary><content>Long</content><title>T</title>
        </entry></feed>"#);
        let item = &feed.items[0];
        assert_eq!(item.get("description"), Some("Short"));
        assert_eq!(item.get("content"), Some("Long"));
        assert_eq!(item.fields()[0].0, "title");
    }
}
