//! Turns raw HTTP response bytes into text.
//!
//! Proxies and CDNs report compression inconsistently, and some intermediaries
//! decompress before the headers reach us. The decoder therefore never trusts a
//! single signal: it tries an ordered list of strategies and the first one that
//! produces text wins. Decompression failures fall through to the next strategy
//! and are never surfaced as errors.

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use std::io::Read;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZLIB_HEADER: u8 = 0x78;
const ZLIB_LEVELS: [u8; 3] = [0x01, 0x9c, 0xda];

/// Response headers that influence decoding.
#[derive(Debug, Clone, Default)]
pub struct EncodingHints {
    /// Lower-cased `Content-Type` header value, if any.
    pub content_type: Option<String>,
    /// Lower-cased `Content-Encoding` header value, if any.
    pub content_encoding: Option<String>,
}

impl EncodingHints {
    pub fn new(content_type: Option<&str>, content_encoding: Option<&str>) -> Self {
        Self {
            content_type: content_type.map(|v| v.trim().to_lowercase()),
            content_encoding: content_encoding.map(|v| v.trim().to_lowercase()),
        }
    }

    /// Reads the hints from a reqwest header map.
    pub fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        let get = |name: reqwest::header::HeaderName| {
            headers.get(name).and_then(|v| v.to_str().ok())
        };
        Self::new(
            get(reqwest::header::CONTENT_TYPE),
            get(reqwest::header::CONTENT_ENCODING),
        )
    }

    fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or("")
    }

    fn content_encoding(&self) -> &str {
        self.content_encoding.as_deref().unwrap_or("")
    }

    fn says_gzip(&self) -> bool {
        self.content_encoding().contains("gzip") || self.content_type().contains("gzip")
    }

    fn says_deflate(&self) -> bool {
        self.content_encoding().contains("deflate")
            || self.content_type().contains("deflate")
            || self.content_type().contains("zlib")
    }

    fn says_text(&self) -> bool {
        let ct = self.content_type();
        ["xml", "html", "text", "json"].iter().any(|t| ct.contains(t))
    }

    fn says_opaque_encoding(&self) -> bool {
        let ce = self.content_encoding();
        ce.contains("br") || ce.contains("deflate")
    }
}

/// The strategy that produced the decoded text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Body was already readable markup.
    Markup,
    /// Body was gzip-compressed.
    Gzip,
    /// Body was zlib (or raw deflate) compressed.
    Deflate,
    /// Headers declared a text type; decoded directly.
    DeclaredText,
    /// Body was valid UTF-8 but did not look like markup.
    PlainUtf8,
    /// Nothing else worked; invalid sequences were replaced.
    Lossy,
}

/// Magic-number classification of the first bytes of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Magic {
    Gzip,
    Zlib,
    None,
}

fn sniff(bytes: &[u8]) -> Magic {
    match bytes {
        [a, b, ..] if [*a, *b] == GZIP_MAGIC => Magic::Gzip,
        [ZLIB_HEADER, level, ..] if ZLIB_LEVELS.contains(level) => Magic::Zlib,
        _ => Magic::None,
    }
}

/// Decodes a response body into text. Never fails.
pub fn decode_text(bytes: &[u8], hints: &EncodingHints) -> String {
    decode_with_strategy(bytes, hints).0
}

/// Decodes a response body and reports which strategy succeeded.
pub fn decode_with_strategy(bytes: &[u8], hints: &EncodingHints) -> (String, DecodeStrategy) {
    // 1. Already-decoded markup
    if let Ok(text) = std::str::from_utf8(bytes) {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        if text.trim_start().starts_with('<') {
            return (text.to_owned(), DecodeStrategy::Markup);
        }
    }

    // 2. Magic bytes
    let magic = sniff(bytes);

    // 3. gzip
    if magic == Magic::Gzip || hints.says_gzip() {
        match inflate(GzDecoder::new(bytes)) {
            Ok(text) => return (text, DecodeStrategy::Gzip),
            Err(e) => tracing::debug!(error = %e, "gzip inflate failed, trying next strategy"),
        }
    }

    // 4. zlib / deflate
    if magic == Magic::Zlib || hints.says_deflate() {
        match inflate(ZlibDecoder::new(bytes)) {
            Ok(text) => return (text, DecodeStrategy::Deflate),
            Err(e) => {
                tracing::debug!(error = %e, "zlib inflate failed, trying raw deflate");
                // Some servers send headerless deflate streams
                if let Ok(text) = inflate(DeflateDecoder::new(bytes)) {
                    return (text, DecodeStrategy::Deflate);
                }
            }
        }
    }

    // 5. Declared text type with a transparent encoding
    if hints.says_text() && !hints.says_opaque_encoding() {
        return (
            String::from_utf8_lossy(bytes).into_owned(),
            DecodeStrategy::DeclaredText,
        );
    }

    // 6. Last resort
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_owned(), DecodeStrategy::PlainUtf8),
        Err(_) => (
            String::from_utf8_lossy(bytes).into_owned(),
            DecodeStrategy::Lossy,
        ),
    }
}

/// Inflates the whole stream. Once decompression succeeds the output is
/// decoded as UTF-8 with invalid sequences replaced.
fn inflate<R: Read>(mut decoder: R) -> std::io::Result<String> {
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}
