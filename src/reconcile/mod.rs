//! Reconciliation of a freshly normalized feed against stored state.
//!
//! [`reconcile`] is pure: it looks at the stored feed (if any), the slice of
//! stored episodes that matters, and the normalizer output, and returns a
//! [`FeedUpdatePlan`]. The store commits the plan in one transaction.
//!
//! # Feed fields
//!
//! A deliberate edit is never clobbered. `name` and `topic` are overwritten
//! only when the stored value is absent, blank, equal to the feed URL, or one
//! of the placeholder labels ([`UNKNOWN_FEED`], [`UNKNOWN_TOPIC`]).
//! `homepage_url` always follows the latest parse.
//!
//! # Episodes
//!
//! Episode URLs are globally unique. A candidate whose URL belongs to another
//! feed is skipped and reported, never re-parented.

mod plan;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::feed::{EpisodeCandidate, NormalizedFeed};
use crate::storage::Feed;
use crate::util::clean_text;

pub use plan::{
    FeedChanges, FeedUpdatePlan, FeedWrite, NewEpisode, NewFeed, PlanCounts, SkipReason,
    SkippedEpisode,
};

/// Placeholder feed name treated as "not set".
pub const UNKNOWN_FEED: &str = "Unknown Feed";
/// Placeholder topic treated as "not set".
pub const UNKNOWN_TOPIC: &str = "Unknown Topic";

/// What happens to a feed's stored episodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// Insert unknown episodes, never delete.
    Additive,
    /// Drop every episode of the feed and insert the current document.
    #[serde(alias = "replace")]
    ReplaceForFeed,
}

/// A caller's request to track a feed.
///
/// Caller-supplied `name` and `topic` win over parsed values as the incoming
/// value; whether they land is still decided by the clobber rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl FeedRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// An episode currently stored under the feed being reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedEpisode {
    pub id: i64,
    pub url: String,
    pub is_favorite: bool,
}

/// The stored state reconciliation needs to see.
#[derive(Debug, Clone, Default)]
pub struct KnownEpisodes {
    /// Episodes owned by the feed (empty for a new feed).
    pub owned: Vec<OwnedEpisode>,
    /// Owning feed id for every candidate URL already stored anywhere.
    pub owners: HashMap<String, i64>,
}

impl KnownEpisodes {
    pub fn new(owned: Vec<OwnedEpisode>, owners: HashMap<String, i64>) -> Self {
        Self { owned, owners }
    }

    fn owner_of(&self, url: &str) -> Option<i64> {
        self.owners.get(url).copied()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    /// Carry `is_favorite` forward across a replace when the URL is unchanged.
    pub preserve_favorites: bool,
    /// Written to `last_checked`.
    pub checked_at: DateTime<Utc>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            preserve_favorites: true,
            checked_at: Utc::now(),
        }
    }
}

/// Decides every write needed to bring stored state in line with `normalized`.
pub fn reconcile(
    existing: Option<&Feed>,
    request: &FeedRequest,
    normalized: &NormalizedFeed,
    known: &KnownEpisodes,
    policy: ReconcilePolicy,
    options: &ReconcileOptions,
) -> FeedUpdatePlan {
    let feed_url = request.url.trim();
    let incoming_name = request
        .name
        .as_deref()
        .and_then(clean_text)
        .or_else(|| normalized.metadata.name.clone());
    let incoming_topic = request
        .topic
        .as_deref()
        .and_then(clean_text)
        .or_else(|| normalized.metadata.topic.clone());
    let homepage_url = normalized.metadata.homepage_url.clone();

    let plan = match existing {
        None => {
            let feed = FeedWrite::Create(NewFeed {
                url: feed_url.to_string(),
                name: incoming_name,
                topic: incoming_topic,
                homepage_url,
                is_active: request.is_active.unwrap_or(true),
                last_checked: options.checked_at,
            });
            let (insert, skipped) = plan_new_feed_episodes(&normalized.episodes, known);
            FeedUpdatePlan {
                feed,
                insert,
                delete: Vec::new(),
                skipped,
            }
        }
        Some(stored) => {
            let changes = FeedChanges {
                name: incoming_name.filter(|_| is_replaceable(stored.name.as_deref(), &stored.url)),
                topic: incoming_topic
                    .filter(|_| is_replaceable(stored.topic.as_deref(), &stored.url)),
                homepage_url,
                is_active: request.is_active,
                last_checked: options.checked_at,
            };
            let (insert, delete, skipped) = match policy {
                ReconcilePolicy::Additive => {
                    let (insert, skipped) =
                        plan_additive_episodes(stored.id, &normalized.episodes, known);
                    (insert, Vec::new(), skipped)
                }
                ReconcilePolicy::ReplaceForFeed => plan_replacement_episodes(
                    stored.id,
                    &normalized.episodes,
                    known,
                    options.preserve_favorites,
                ),
            };
            FeedUpdatePlan {
                feed: FeedWrite::Update {
                    id: stored.id,
                    changes,
                },
                insert,
                delete,
                skipped,
            }
        }
    };

    tracing::debug!(
        feed = %feed_url,
        policy = ?policy,
        insert = plan.insert.len(),
        delete = plan.delete.len(),
        skipped = plan.skipped.len(),
        "Reconciled feed"
    );
    plan
}

/// `true` when a stored name/topic may be replaced by an incoming value.
fn is_replaceable(stored: Option<&str>, feed_url: &str) -> bool {
    let Some(value) = stored.map(str::trim) else {
        return true;
    };
    value.is_empty()
        || value == feed_url.trim()
        || value.eq_ignore_ascii_case(UNKNOWN_FEED)
        || value.eq_ignore_ascii_case(UNKNOWN_TOPIC)
}

fn new_episode(candidate: &EpisodeCandidate, is_favorite: bool) -> NewEpisode {
    NewEpisode {
        title: candidate.title.clone(),
        description: candidate.description.clone(),
        pub_date: candidate.pub_date,
        url: candidate.url.clone(),
        host: candidate.host.clone(),
        is_favorite,
    }
}

fn skip(url: &str, reason: SkipReason) -> SkippedEpisode {
    SkippedEpisode {
        url: url.to_string(),
        reason,
    }
}

/// Yields candidates in document order, reporting repeated URLs.
fn first_occurrences<'a>(
    candidates: &'a [EpisodeCandidate],
    skipped: &'a mut Vec<SkippedEpisode>,
) -> impl Iterator<Item = &'a EpisodeCandidate> + 'a {
    let mut seen = HashSet::new();
    candidates.iter().filter(move |&c| {
        if seen.insert(c.url.as_str()) {
            true
        } else {
            skipped.push(skip(&c.url, SkipReason::DuplicateInDocument));
            false
        }
    })
}

fn plan_new_feed_episodes(
    candidates: &[EpisodeCandidate],
    known: &KnownEpisodes,
) -> (Vec<NewEpisode>, Vec<SkippedEpisode>) {
    let mut insert = Vec::new();
    let mut skipped = Vec::new();
    let mut owned_elsewhere = Vec::new();

    for candidate in first_occurrences(candidates, &mut skipped) {
        if known.owner_of(&candidate.url).is_some() {
            owned_elsewhere.push(skip(&candidate.url, SkipReason::OwnedByOtherFeed));
        } else {
            insert.push(new_episode(candidate, false));
        }
    }

    skipped.extend(owned_elsewhere);
    (insert, skipped)
}

fn plan_additive_episodes(
    feed_id: i64,
    candidates: &[EpisodeCandidate],
    known: &KnownEpisodes,
) -> (Vec<NewEpisode>, Vec<SkippedEpisode>) {
    let mut insert = Vec::new();
    let mut skipped = Vec::new();
    let mut rejected = Vec::new();

    for candidate in first_occurrences(candidates, &mut skipped) {
        match known.owner_of(&candidate.url) {
            None => insert.push(new_episode(candidate, false)),
            Some(owner) if owner == feed_id => {
                rejected.push(skip(&candidate.url, SkipReason::AlreadyKnown))
            }
            Some(_) => rejected.push(skip(&candidate.url, SkipReason::OwnedByOtherFeed)),
        }
    }

    skipped.extend(rejected);
    (insert, skipped)
}

fn plan_replacement_episodes(
    feed_id: i64,
    candidates: &[EpisodeCandidate],
    known: &KnownEpisodes,
    preserve_favorites: bool,
) -> (Vec<NewEpisode>, Vec<i64>, Vec<SkippedEpisode>) {
    let favorites: HashSet<&str> = known
        .owned
        .iter()
        .filter(|e| preserve_favorites && e.is_favorite)
        .map(|e| e.url.as_str())
        .collect();
    let delete = known.owned.iter().map(|e| e.id).collect();

    let mut insert = Vec::new();
    let mut skipped = Vec::new();
    let mut rejected = Vec::new();

    for candidate in first_occurrences(candidates, &mut skipped) {
        match known.owner_of(&candidate.url) {
            Some(owner) if owner != feed_id => {
                rejected.push(skip(&candidate.url, SkipReason::OwnedByOtherFeed))
            }
            _ => insert.push(new_episode(
                candidate,
                favorites.contains(candidate.url.as_str()),
            )),
        }
    }

    skipped.extend(rejected);
    (insert, delete, skipped)
}
