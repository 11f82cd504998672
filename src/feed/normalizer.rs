use thiserror::Error;

use super::atom;
use super::date::PubDate;
use super::rss;
use super::xml::{self, Element, Ns, XmlError};

/// Title used when an item carries none.
pub const NO_TITLE: &str = "No Title";
/// Description used when an item carries none.
pub const NO_DESCRIPTION: &str = "No Description";
/// Host used when neither the item nor the channel names one.
pub const UNKNOWN_HOST: &str = "Unknown Host";

/// Errors produced while turning feed bytes into a [`NormalizedFeed`].
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The bytes are not well-formed XML.
    #[error("Parse error: {0}")]
    Parse(#[from] XmlError),
    /// Well-formed XML, but neither an RSS channel nor an Atom feed.
    #[error("Unsupported feed format: root element <{0}>")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Rss,
    Atom,
}

/// Feed-level fields lifted out of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedMetadata {
    pub name: Option<String>,
    pub topic: Option<String>,
    /// Always an absolute URL with scheme and host when present.
    pub homepage_url: Option<String>,
}

/// One item/entry, after every fallback hierarchy has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeCandidate {
    pub title: String,
    pub description: String,
    pub pub_date: Option<PubDate>,
    pub url: String,
    pub host: String,
}

#[derive(Debug, Clone)]
pub struct NormalizedFeed {
    pub dialect: Dialect,
    pub metadata: FeedMetadata,
    pub episodes: Vec<EpisodeCandidate>,
    /// Items dropped because no candidate URL passed validation.
    pub dropped: usize,
}

/// Normalizes raw feed bytes into canonical metadata and episode candidates.
///
/// Pure and synchronous: the only work done is the XML parse and the field
/// resolution that follows it, so it can run on any thread.
///
/// # Errors
///
/// - [`NormalizeError::Parse`] for malformed XML
/// - [`NormalizeError::UnsupportedFormat`] when the root is neither an RSS
///   document with a `channel` nor an Atom `feed`
pub fn normalize(bytes: &[u8]) -> Result<NormalizedFeed, NormalizeError> {
    let root = xml::parse_document(bytes)?;

    let feed = match detect_dialect(&root)? {
        Dialect::Rss => rss::extract(&root),
        Dialect::Atom => atom::extract(&root),
    };

    tracing::debug!(
        dialect = ?feed.dialect,
        episodes = feed.episodes.len(),
        dropped = feed.dropped,
        "Normalized feed document"
    );
    Ok(feed)
}

fn detect_dialect(root: &Element) -> Result<Dialect, NormalizeError> {
    if root.child(&Ns::None, "channel").is_some() {
        Ok(Dialect::Rss)
    } else if root.is(&Ns::Atom, "feed") {
        Ok(Dialect::Atom)
    } else {
        Err(NormalizeError::UnsupportedFormat(root.name.clone()))
    }
}
