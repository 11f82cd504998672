//! Utility functions shared by the normalizer, the ingestor and the CLI.
//!
//! - **URL validation**: the absolute-URL rule applied to feed content, and
//!   the stricter policy applied to user-submitted feed URLs
//! - **Text cleanup**: control-character stripping and blank-to-`None`
//!
//! # Examples
//!
//! ```
//! use castfeed::util::{clean_text, is_absolute_url, validate_url};
//!
//! assert!(is_absolute_url("https://example.com/ep1.mp3").is_some());
//! assert!(validate_url("https://example.com/feed.xml", false).is_ok());
//! assert_eq!(clean_text("  Title  ").as_deref(), Some("Title"));
//! ```

mod text;
mod url_validator;

pub use text::{clean_text, strip_control_chars};
pub use url_validator::{is_absolute_url, validate_url, UrlValidationError};
