use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::feed::PubDate;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has locked the database
    #[error("The database is locked by another castfeed process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// The addressed row does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A unique or foreign key constraint rejected the write
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error: lock contention, constraint violation, or other.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() || db_err.is_foreign_key_violation() {
                return DatabaseError::Constraint(db_err.message().to_string());
            }
        }

        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }

    pub(crate) fn feed_not_found(id: i64) -> Self {
        DatabaseError::NotFound { entity: "Feed", id }
    }

    pub(crate) fn episode_not_found(id: i64) -> Self {
        DatabaseError::NotFound {
            entity: "Episode",
            id,
        }
    }
}

// ============================================================================
// Helper Types
// ============================================================================

/// Internal row type for feed queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedDbRow {
    pub id: i64,
    pub url: String,
    pub name: Option<String>,
    pub topic: Option<String>,
    pub homepage_url: Option<String>,
    pub is_active: bool,
    pub last_checked: Option<String>,
}

impl FeedDbRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            url: self.url,
            name: self.name,
            topic: self.topic,
            homepage_url: self.homepage_url,
            is_active: self.is_active,
            last_checked: self.last_checked.as_deref().and_then(parse_timestamp),
        }
    }
}

/// Internal row type for episode queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EpisodeDbRow {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub description: String,
    pub pub_date: Option<String>,
    pub url: String,
    pub is_favorite: bool,
    pub host: Option<String>,
}

impl EpisodeDbRow {
    pub(crate) fn into_episode(self) -> Episode {
        let pub_date = self.pub_date.as_deref().and_then(|raw| {
            let parsed = PubDate::from_iso8601(raw);
            if parsed.is_none() {
                tracing::warn!(episode_id = self.id, pub_date = %raw, "Stored pub_date is not ISO-8601");
            }
            parsed
        });
        Episode {
            id: self.id,
            feed_id: self.feed_id,
            title: self.title,
            description: self.description,
            pub_date,
            url: self.url,
            is_favorite: self.is_favorite,
            host: self.host,
        }
    }
}

pub(crate) const EPISODE_COLUMNS: &str =
    "id, feed_id, title, description, pub_date, url, is_favorite, host";

pub(crate) const FEED_COLUMNS: &str =
    "id, url, name, topic, homepage_url, is_active, last_checked";

/// UTC timestamps are stored as RFC 3339 text.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// Data Structures
// ============================================================================

/// A tracked feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub name: Option<String>,
    pub topic: Option<String>,
    pub homepage_url: Option<String>,
    pub is_active: bool,
    pub last_checked: Option<DateTime<Utc>>,
}

/// A stored episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Episode {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub description: String,
    pub pub_date: Option<PubDate>,
    pub url: String,
    pub is_favorite: bool,
    pub host: Option<String>,
}

/// Manual edit of a feed. `None` leaves a field untouched; an empty string
/// clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct FeedEdit {
    pub name: Option<String>,
    pub topic: Option<String>,
    pub homepage_url: Option<String>,
    pub is_active: Option<bool>,
}

/// Manual edit of an episode. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct EpisodeEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub pub_date: Option<PubDate>,
    pub host: Option<String>,
}

/// Filter for [`Database::list_episodes`](super::Database::list_episodes).
#[derive(Debug, Clone, Copy, Default)]
pub struct EpisodeFilter {
    pub feed_id: Option<i64>,
    pub favorites_only: bool,
}

/// What a plan commit actually wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub feed_id: i64,
    pub inserted: usize,
    pub deleted: usize,
    /// Episode URLs another writer stored between planning and commit.
    pub conflicts: Vec<String>,
}
