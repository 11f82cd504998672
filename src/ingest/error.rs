use thiserror::Error;

use crate::feed::{FetchError, NormalizeError, XmlError};
use crate::storage::DatabaseError;
use crate::util::UrlValidationError;

/// Failure of one ingestion unit (one feed).
#[derive(Debug, Error)]
pub enum IngestError {
    /// Rejected before any network activity.
    #[error("Invalid feed URL: {0}")]
    Validation(String),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Feed is not well-formed XML: {0}")]
    Parse(XmlError),

    #[error("Unsupported feed format: root element <{0}>")]
    Unsupported(String),

    #[error("Feed {0} not found")]
    NotFound(i64),

    #[error("Feed {0} is inactive")]
    Inactive(i64),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

impl From<NormalizeError> for IngestError {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::Parse(e) => IngestError::Parse(e),
            NormalizeError::UnsupportedFormat(root) => IngestError::Unsupported(root),
        }
    }
}

impl From<UrlValidationError> for IngestError {
    fn from(err: UrlValidationError) -> Self {
        IngestError::Validation(err.to_string())
    }
}

impl IngestError {
    /// HTTP status class a service boundary should answer with.
    pub fn status_class(&self) -> u16 {
        match self {
            IngestError::Validation(_) | IngestError::Inactive(_) => 400,
            IngestError::NotFound(_) | IngestError::Storage(DatabaseError::NotFound { .. }) => 404,
            IngestError::Parse(_) | IngestError::Unsupported(_) => 422,
            IngestError::Fetch(_) => 502,
            IngestError::Storage(_) => 500,
        }
    }
}
