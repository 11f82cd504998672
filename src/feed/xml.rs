//! Minimal namespace-aware element tree over `quick-xml`.
//!
//! Feeds are small enough to hold in memory, and the extraction rules need
//! random access ("first `itunes:category` anywhere under the channel"), so
//! the event stream is folded into an owned tree once and queried afterwards.
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use thiserror::Error;

use crate::util::clean_text;

/// Maximum element nesting accepted before the document is rejected.
const MAX_DEPTH: usize = 256;

/// Errors raised while building the element tree.
#[derive(Debug, Error)]
pub enum XmlError {
    /// quick-xml rejected the byte stream.
    #[error("malformed XML at byte {position}: {message}")]
    Syntax { position: u64, message: String },
    /// The document ended with elements still open.
    #[error("unexpected end of document: <{0}> was never closed")]
    Unclosed(String),
    /// An end tag appeared with no matching start tag.
    #[error("unmatched closing tag </{0}>")]
    Unmatched(String),
    /// No root element was found.
    #[error("document has no root element")]
    Empty,
    /// A second top-level element followed the root.
    #[error("multiple root elements")]
    MultipleRoots,
    /// Nesting exceeded [`MAX_DEPTH`].
    #[error("element nesting exceeds {0} levels")]
    TooDeep(usize),
}

/// Namespaces the extractors care about.
///
/// RSS 0.9x/1.0 element namespaces fold into [`Ns::None`] so the RSS rules
/// can treat every "plain" element the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ns {
    None,
    Itunes,
    Atom,
    Media,
    DublinCore,
    GooglePlay,
    Webfeeds,
    Content,
    Other(String),
}

impl Ns {
    fn from_uri(uri: &[u8]) -> Self {
        let uri = String::from_utf8_lossy(uri).to_ascii_lowercase();
        match uri.trim_end_matches('/') {
            "http://www.itunes.com/dtds/podcast-1.0.dtd" => Ns::Itunes,
            "http://www.w3.org/2005/atom" => Ns::Atom,
            "http://search.yahoo.com/mrss" => Ns::Media,
            "http://purl.org/dc/elements/1.1" => Ns::DublinCore,
            "http://www.google.com/schemas/play-podcasts/1.0" => Ns::GooglePlay,
            "http://webfeeds.org/rss/1.0" => Ns::Webfeeds,
            "http://purl.org/rss/1.0/modules/content" => Ns::Content,
            "http://purl.org/rss/1.0" | "http://my.netscape.com/rdf/simple/0.9" => Ns::None,
            _ => Ns::Other(uri),
        }
    }

    /// Conventional prefixes, used when a feed forgets to declare them.
    fn from_prefix(prefix: &[u8]) -> Self {
        match prefix {
            b"itunes" => Ns::Itunes,
            b"atom" | b"atom10" => Ns::Atom,
            b"media" => Ns::Media,
            b"dc" => Ns::DublinCore,
            b"googleplay" => Ns::GooglePlay,
            b"webfeeds" => Ns::Webfeeds,
            b"content" => Ns::Content,
            other => Ns::Other(String::from_utf8_lossy(other).into_owned()),
        }
    }

    fn resolve(result: &ResolveResult<'_>) -> Self {
        match result {
            ResolveResult::Unbound => Ns::None,
            ResolveResult::Bound(ns) => Ns::from_uri(ns.as_ref()),
            ResolveResult::Unknown(prefix) => Ns::from_prefix(prefix),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub ns: Ns,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub ns: Ns,
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn is(&self, ns: &Ns, name: &str) -> bool {
        self.ns == *ns && self.name == name
    }

    /// First direct child with the given namespace and local name.
    pub fn child(&self, ns: &Ns, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(ns, name))
    }

    pub fn children_named<'a>(
        &'a self,
        ns: &'a Ns,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(ns, name))
    }

    /// Unqualified attribute value, exact name match.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.ns == Ns::None && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Unqualified attribute value, ASCII case-insensitive name match.
    pub fn attr_ignore_case(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.ns == Ns::None && a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    /// Cleaned direct text content, `None` when blank.
    pub fn text(&self) -> Option<String> {
        clean_text(&self.text)
    }

    /// Text of this element and all descendants, space separated.
    ///
    /// Used for bodies that arrive as unescaped inline markup.
    pub fn deep_text(&self) -> Option<String> {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        clean_text(&parts.join(" "))
    }

    fn collect_text<'a>(&'a self, parts: &mut Vec<&'a str>) {
        let own = self.text.trim();
        if !own.is_empty() {
            parts.push(own);
        }
        for child in &self.children {
            child.collect_text(parts);
        }
    }

    /// Cleaned text of the first matching child.
    pub fn child_text(&self, ns: &Ns, name: &str) -> Option<String> {
        self.child(ns, name).and_then(Element::text)
    }
}

/// Parses `bytes` into an element tree rooted at the document element.
///
/// # Errors
///
/// Returns [`XmlError`] for syntax errors, unbalanced tags, an empty
/// document, trailing root elements or excessive nesting.
pub fn parse_document(bytes: &[u8]) -> Result<Element, XmlError> {
    let mut reader = NsReader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        let (resolved, event) = match reader.read_resolved_event_into(&mut buf) {
            Ok(pair) => pair,
            Err(e) => {
                return Err(XmlError::Syntax {
                    position: reader.error_position(),
                    message: e.to_string(),
                })
            }
        };
        let ns = Ns::resolve(&resolved);

        match event {
            Event::Start(e) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError::TooDeep(MAX_DEPTH));
                }
                if root.is_some() {
                    return Err(XmlError::MultipleRoots);
                }
                stack.push(open_element(&reader, ns, &e));
            }
            Event::Empty(e) => {
                if root.is_some() && stack.is_empty() {
                    return Err(XmlError::MultipleRoots);
                }
                let element = open_element(&reader, ns, &e);
                attach(&mut stack, &mut root, element);
            }
            Event::End(e) => {
                let element = match stack.pop() {
                    Some(el) => el,
                    None => {
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        return Err(XmlError::Unmatched(name));
                    }
                };
                attach(&mut stack, &mut root, element);
            }
            Event::Text(e) => {
                if let Some(current) = stack.last_mut() {
                    // Unknown entities (&nbsp; and friends) keep their raw form.
                    match e.unescape() {
                        Ok(text) => current.text.push_str(&text),
                        Err(_) => current.text.push_str(&String::from_utf8_lossy(&e)),
                    }
                }
            }
            Event::CData(e) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Unclosed(open.name.clone()));
    }
    root.ok_or(XmlError::Empty)
}

fn open_element(reader: &NsReader<&[u8]>, ns: Ns, start: &BytesStart<'_>) -> Element {
    let mut attrs = Vec::new();
    for attr in start.attributes().with_checks(false) {
        let attr = match attr {
            Ok(attr) => attr,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed attribute");
                continue;
            }
        };
        // xmlns declarations are consumed by the reader's resolver
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let (resolved, local) = reader.resolve_attribute(attr.key);
        let value = match attr.decode_and_unescape_value(reader.decoder()) {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attrs.push(Attribute {
            ns: Ns::resolve(&resolved),
            name: String::from_utf8_lossy(local.as_ref()).into_owned(),
            value,
        });
    }

    Element {
        ns,
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        attrs,
        text: String::new(),
        children: Vec::new(),
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}
