use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::feed::PubDate;

/// A feed row to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFeed {
    pub url: String,
    pub name: Option<String>,
    pub topic: Option<String>,
    pub homepage_url: Option<String>,
    pub is_active: bool,
    pub last_checked: DateTime<Utc>,
}

/// Field updates for an existing feed.
///
/// `name`, `topic` and `is_active` are only written when `Some`.
/// `homepage_url` and `last_checked` are always written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedChanges {
    pub name: Option<String>,
    pub topic: Option<String>,
    pub homepage_url: Option<String>,
    pub is_active: Option<bool>,
    pub last_checked: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedWrite {
    Create(NewFeed),
    Update { id: i64, changes: FeedChanges },
}

impl FeedWrite {
    pub fn feed_id(&self) -> Option<i64> {
        match self {
            FeedWrite::Create(_) => None,
            FeedWrite::Update { id, .. } => Some(*id),
        }
    }

    /// `is_active` the feed will have once the write is applied, when the
    /// write decides it.
    pub fn is_active(&self) -> Option<bool> {
        match self {
            FeedWrite::Create(feed) => Some(feed.is_active),
            FeedWrite::Update { changes, .. } => changes.is_active,
        }
    }
}

/// An episode row to be inserted under the plan's feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEpisode {
    pub title: String,
    pub description: String,
    pub pub_date: Option<PubDate>,
    pub url: String,
    pub host: String,
    pub is_favorite: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The URL is already stored under a different feed.
    OwnedByOtherFeed,
    /// The URL appeared earlier in the same document.
    DuplicateInDocument,
    /// Additive policy: the feed already has this episode.
    AlreadyKnown,
    /// Another writer inserted the URL between planning and commit.
    InsertedConcurrently,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEpisode {
    pub url: String,
    pub reason: SkipReason,
}

/// Everything one reconciliation decided, ready to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedUpdatePlan {
    pub feed: FeedWrite,
    pub insert: Vec<NewEpisode>,
    /// Ids of episodes owned by this feed to delete before inserting.
    pub delete: Vec<i64>,
    pub skipped: Vec<SkippedEpisode>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanCounts {
    pub created: usize,
    pub updated: usize,
    pub new_episodes: usize,
    pub deleted_episodes: usize,
    pub skipped_episodes: usize,
}

impl FeedUpdatePlan {
    pub fn counts(&self) -> PlanCounts {
        let (created, updated) = match self.feed {
            FeedWrite::Create(_) => (1, 0),
            FeedWrite::Update { .. } => (0, 1),
        };
        PlanCounts {
            created,
            updated,
            new_episodes: self.insert.len(),
            deleted_episodes: self.delete.len(),
            skipped_episodes: self.skipped.len(),
        }
    }
}
