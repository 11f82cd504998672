//! castfeed: track podcast RSS/Atom feeds in a local SQLite episode library.
//!
//! The pipeline is fetch ([`feed::Fetcher`]), normalize ([`feed::normalize`]),
//! reconcile ([`reconcile::reconcile`]) and commit ([`storage::Database`]),
//! driven by [`ingest::Ingestor`].

pub mod config;
pub mod feed;
pub mod ingest;
pub mod reconcile;
pub mod storage;
pub mod util;
