//! Configuration file parser for ~/.config/castfeed/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::reconcile::ReconcilePolicy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database file. Defaults to `castfeed.db` in the config directory.
    pub database_path: Option<PathBuf>,
    pub fetch: FetchConfig,
    pub ingest: IngestConfig,
}

/// Settings for the HTTP fetcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// Largest feed body accepted, in bytes.
    pub max_feed_bytes: usize,
    pub user_agent: String,
    /// Accept feed URLs on localhost and private networks.
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_feed_bytes: 10 * 1024 * 1024,
            user_agent: concat!("castfeed/", env!("CARGO_PKG_VERSION")).to_string(),
            allow_private_hosts: false,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Settings for the ingestion entry points.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Feeds processed simultaneously during bulk import.
    pub concurrency: usize,
    /// Episode policy for "refresh one feed".
    pub refresh_policy: ReconcilePolicy,
    /// Carry `is_favorite` across a replace-for-feed refresh when the
    /// episode URL is unchanged.
    pub preserve_favorites_on_replace: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            refresh_policy: ReconcilePolicy::ReplaceForFeed,
            preserve_favorites_on_replace: true,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: &'static [&'static str] = &["database_path", "fetch", "ingest"];
    const KNOWN_FETCH_KEYS: &'static [&'static str] = &[
        "timeout_secs",
        "max_feed_bytes",
        "user_agent",
        "allow_private_hosts",
    ];
    const KNOWN_INGEST_KEYS: &'static [&'static str] = &[
        "concurrency",
        "refresh_policy",
        "preserve_favorites_on_replace",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw, None, Self::KNOWN_KEYS);
            if let Some(toml::Value::Table(fetch)) = raw.get("fetch") {
                warn_unknown_keys(fetch, Some("fetch"), Self::KNOWN_FETCH_KEYS);
            }
            if let Some(toml::Value::Table(ingest)) = raw.get("ingest") {
                warn_unknown_keys(ingest, Some("ingest"), Self::KNOWN_INGEST_KEYS);
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            refresh_policy = ?config.ingest.refresh_policy,
            "Loaded configuration"
        );
        Ok(config)
    }
}

fn warn_unknown_keys(table: &toml::Table, section: Option<&str>, known: &[&str]) {
    for key in table.keys() {
        if !known.contains(&key.as_str()) {
            tracing::warn!(
                section = section.unwrap_or("root"),
                key = %key,
                "Unknown key in config file, ignoring"
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
