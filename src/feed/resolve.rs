//! Ordered candidate resolution.
//!
//! Dates, homepage URLs, episode URLs and hosts are all "try these sources in
//! order, keep the first one that passes validation". This module is that
//! rule, written once.

use crate::util::is_absolute_url;

/// Acceptor for URL candidates: the trimmed string when it is absolute.
pub fn absolute_url(candidate: String) -> Option<String> {
    is_absolute_url(&candidate).map(|_| candidate.trim().to_string())
}

/// A value offered by one source, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct Candidate<T> {
    pub source: &'static str,
    pub value: Option<T>,
}

impl<T> Candidate<T> {
    pub fn new(source: &'static str, value: T) -> Self {
        Self {
            source,
            value: Some(value),
        }
    }

    /// A source that may or may not have produced a value.
    pub fn maybe(source: &'static str, value: Option<T>) -> Self {
        Self { source, value }
    }
}

/// Returns the first candidate, in iteration order, that `accept` turns into
/// a value. Absent candidates are skipped without calling `accept`.
///
/// Candidates are consumed lazily, so an expensive source late in the list is
/// never evaluated once an earlier one wins.
pub fn resolve_first<T, U, I, F>(candidates: I, mut accept: F) -> Option<U>
where
    I: IntoIterator<Item = Candidate<T>>,
    F: FnMut(T) -> Option<U>,
{
    for candidate in candidates {
        let Some(value) = candidate.value else {
            continue;
        };
        if let Some(accepted) = accept(value) {
            tracing::trace!(source = candidate.source, "Candidate accepted");
            return Some(accepted);
        }
        tracing::trace!(source = candidate.source, "Candidate rejected");
    }
    None
}
