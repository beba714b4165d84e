use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// SEC-003: Maximum element nesting depth accepted from a feed document.
const MAX_XML_DEPTH: usize = 64;

/// Errors produced while reading a feed document into an element tree.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML parse error: {0}")]
    Syntax(String),

    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    #[error("document has no root element")]
    NoRoot,
}

/// A generic XML element.
///
/// Names are kept exactly as written in the document (`dc:date`,
/// `content:encoded`), so namespace prefixes remain visible to later stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Concatenated text and CDATA content directly inside this element.
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Name without any namespace prefix.
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Attribute value by qualified name, falling back to a local-name match.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .or_else(|| self.attributes.iter().find(|(k, _)| local_part(k) == name))
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed text content, `None` when empty.
    pub fn text(&self) -> Option<&str> {
        let trimmed = self.text.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// First child with the exact qualified name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the exact qualified name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First child whose local name matches, ignoring prefixes.
    pub fn child_local(&self, local: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.local_name() == local)
    }

    /// All children whose local name matches, ignoring prefixes.
    pub fn children_local<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children
            .iter()
            .filter(move |c| c.local_name() == local)
    }

    /// Text of the first child with the given qualified name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(Element::text)
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// Parses a document into its root element.
///
/// SEC-002: quick-xml (0.37) never expands `<!ENTITY>` declarations, so
/// external-entity payloads cannot reach the tree. Unknown entities inside
/// text are kept verbatim instead of failing the whole document.
pub fn parse_document(text: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if stack.len() >= MAX_XML_DEPTH {
                    return Err(XmlError::MaxDepthExceeded(MAX_XML_DEPTH));
                }
                stack.push(start_element(&e, &reader));
            }
            Ok(Event::Empty(e)) => {
                let element = start_element(&e, &reader);
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(top) = stack.last_mut() {
                    match e.unescape() {
                        Ok(s) => top.text.push_str(&s),
                        Err(_) => top.text.push_str(&String::from_utf8_lossy(&e)),
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XmlError::Syntax(e.to_string())),
            _ => {}
        }
    }

    // Truncated documents: close whatever is still open
    while let Some(element) = stack.pop() {
        attach(&mut stack, &mut root, element);
    }

    root.ok_or(XmlError::NoRoot)
}

fn start_element(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Element {
    let mut element = Element::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes().with_checks(false).flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.decode_and_unescape_value(reader.decoder()) {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        element.attributes.push((key, value));
    }
    element
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_tree_with_prefixes() {
        let doc = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <item rdf:about="https://e.com/1"><dc:date>2025-01-01</dc:date></item>
</rdf:RDF>"#;
        let root = parse_document(doc).unwrap();
        assert_eq!(root.name, "rdf:RDF");
        assert_eq!(root.local_name(), "RDF");
        let item = root.child_local("item").unwrap();
        assert_eq!(item.attr("rdf:about"), Some("https://e.com/1"));
        assert_eq!(item.attr("about"), Some("https://e.com/1"));
        assert_eq!(item.child_text("dc:date"), Some("2025-01-01"));
    }

    #[test]
    fn test_cdata_and_entities() {
        let doc = "<a><b><![CDATA[<p>Hi</p>]]></b><c>x &amp; y</c></a>";
        let root = parse_document(doc).unwrap();
        assert_eq!(root.child_text("b"), Some("<p>Hi</p>"));
        assert_eq!(root.child_text("c"), Some("x & y"));
    }

    #[test]
    fn test_empty_element_attributes() {
        let doc = r#"<entry><link rel="alternate" href="https://e.com/a"/></entry>"#;
        let root = parse_document(doc).unwrap();
        let link = root.child("link").unwrap();
        assert_eq!(link.attr("href"), Some("https://e.com/a"));
        assert_eq!(link.text(), None);
    }

    #[test]
    fn test_depth_limit() {
        let doc = format!("{}{}", "<a>".repeat(100), "</a>".repeat(100));
        assert!(matches!(
            parse_document(&doc),
            Err(XmlError::MaxDepthExceeded(_))
        ));
    }

    #[test]
    fn test_mismatched_tags_rejected() {
        assert!(matches!(
            parse_document("<a><b></a>"),
            Err(XmlError::Syntax(_))
        ));
    }

    #[test]
    fn test_no_root() {
        assert!(matches!(parse_document("   "), Err(XmlError::NoRoot)));
    }
}
