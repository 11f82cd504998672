//! Feed retrieval and normalization.
//!
//! - **Fetching**: [`Fetcher`] trait and the single-attempt [`HttpFetcher`]
//! - **XML**: a small namespace-aware element tree built on `quick-xml`
//! - **Normalization**: RSS and Atom documents reduced to [`FeedMetadata`]
//!   and a list of [`EpisodeCandidate`]s, with every fallback hierarchy
//!   already applied
//!
//! # Example
//!
//! ```
//! use castfeed::feed::normalize;
//!
//! let doc = br#"<rss version="2.0"><channel>
//!     <title>Show</title>
//!     <item><title>Ep 1</title><enclosure url="https://cdn.example.com/1.mp3"/></item>
//! </channel></rss>"#;
//!
//! let feed = normalize(doc).unwrap();
//! assert_eq!(feed.metadata.name.as_deref(), Some("Show"));
//! assert_eq!(feed.episodes[0].url, "https://cdn.example.com/1.mp3");
//! ```

mod atom;
mod date;
mod fetcher;
mod normalizer;
mod resolve;
mod rss;
mod xml;

pub use date::{parse_pub_date, PubDate};
pub use fetcher::{FetchError, Fetcher, HttpFetcher};
pub use normalizer::{
    normalize, Dialect, EpisodeCandidate, FeedMetadata, NormalizeError, NormalizedFeed,
    NO_DESCRIPTION, NO_TITLE, UNKNOWN_HOST,
};
pub use xml::XmlError;
