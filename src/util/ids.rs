use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest.
const ID_HEX_LEN: usize = 16;

/// Hashes an arbitrary string into a compact, stable hex identifier.
///
/// The id is the first 64 bits of the SHA-256 digest, rendered as lowercase hex.
/// Collisions are theoretically possible and are not engineered around.
pub fn hash_to_id(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(ID_HEX_LEN);
    hex
}

/// Derives a feed id from its subscription URL.
///
/// The URL is trimmed and lower-cased first, so `" HTTPS://Example.com/feed "`
/// and `"https://example.com/feed"` name the same feed.
pub fn feed_id_from_url(url: &str) -> String {
    hash_to_id(&url.trim().to_lowercase())
}

/// Derives an article id from its canonical link.
///
/// Only surrounding whitespace is removed; path case is significant.
/// The same link yields the same id regardless of which feed produced it.
pub fn article_id_from_link(link: &str) -> String {
    hash_to_id(link.trim())
}
