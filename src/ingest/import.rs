//! Subscription-list loading for bulk import.
//!
//! Two formats are accepted:
//!
//! - **OPML**: every `<outline>` with an `xmlUrl` attribute is one request.
//!   The name comes from `title`, falling back to `text`. The topic comes from
//!   the `category` attribute, falling back to the enclosing folder outline.
//! - **JSON**: an array of `{"url", "name", "topic", "is_active"}` objects,
//!   all keys optional.
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use thiserror::Error;

use crate::reconcile::FeedRequest;
use crate::util::clean_text;

/// Maximum allowed nesting depth for OPML outline elements.
const MAX_OPML_DEPTH: usize = 50;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to read subscription list: {0}")]
    Io(#[from] std::io::Error),

    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("Invalid JSON subscription list: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads a subscription list from disk.
///
/// A `.json` extension, or content starting with `[`, selects JSON; anything
/// else is parsed as OPML.
pub async fn load_requests(path: &Path) -> Result<Vec<FeedRequest>, ImportError> {
    let content = tokio::fs::read_to_string(path).await?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        || content.trim_start().starts_with('[');

    let requests = if is_json {
        parse_json(&content)?
    } else {
        parse_opml(&content)?
    };
    tracing::info!(path = %path.display(), entries = requests.len(), "Loaded subscription list");
    Ok(requests)
}

pub fn parse_json(content: &str) -> Result<Vec<FeedRequest>, ImportError> {
    Ok(serde_json::from_str(content)?)
}

/// Parses OPML content into feed requests, in document order.
///
/// `<!ENTITY>` declarations are never expanded: quick-xml only resolves the
/// five predefined XML entities, so custom ones fail to unescape.
pub fn parse_opml(content: &str) -> Result<Vec<FeedRequest>, ImportError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut requests = Vec::new();
    // One entry per open <outline>; `Some` for folders carrying a label.
    let mut folders: Vec<Option<String>> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                if folders.len() >= MAX_OPML_DEPTH {
                    return Err(ImportError::MaxDepthExceeded(MAX_OPML_DEPTH));
                }
                let outline = read_outline(&e, &reader)?;
                let label = outline.label();
                match outline.into_request(&folders) {
                    Some(request) => {
                        requests.push(request);
                        folders.push(None);
                    }
                    None => folders.push(label),
                }
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                if let Some(request) = read_outline(&e, &reader)?.into_request(&folders) {
                    requests.push(request);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                folders.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ImportError::XmlParse(e.to_string())),
            _ => {}
        }
    }

    Ok(requests)
}

#[derive(Default)]
struct Outline {
    xml_url: Option<String>,
    title: Option<String>,
    text: Option<String>,
    category: Option<String>,
}

impl Outline {
    fn label(&self) -> Option<String> {
        self.text.clone().or_else(|| self.title.clone())
    }

    /// `None` for folder outlines (no `xmlUrl`).
    fn into_request(self, folders: &[Option<String>]) -> Option<FeedRequest> {
        let url = self.xml_url?;
        let topic = self
            .category
            .as_deref()
            .and_then(category_topic)
            .or_else(|| folders.iter().rev().flatten().next().cloned());
        Some(FeedRequest {
            url: url.trim().to_string(),
            name: self.title.or(self.text),
            topic,
            is_active: None,
        })
    }
}

fn read_outline(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Outline, ImportError> {
    let mut outline = Outline::default();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let key = attr.key.as_ref();
        if !matches!(key, b"xmlUrl" | b"title" | b"text" | b"category") {
            continue;
        }
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| ImportError::XmlParse(e.to_string()))?;
        match key {
            // Kept even when blank so the entry is reported, not lost.
            b"xmlUrl" => outline.xml_url = Some(value.into_owned()),
            b"title" => outline.title = clean_text(&value),
            b"text" => outline.text = clean_text(&value),
            _ => outline.category = clean_text(&value),
        }
    }

    Ok(outline)
}

/// OPML `category` is a comma-separated list of slash-delimited paths;
/// the topic is the last segment of the first path.
fn category_topic(category: &str) -> Option<String> {
    category
        .split(',')
        .next()
        .and_then(|path| path.split('/').filter_map(clean_text).last())
}
