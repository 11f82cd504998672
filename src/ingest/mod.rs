//! Ingestion entry points: add one feed, refresh one feed, bulk import.
//!
//! Each entry point runs the same pipeline (fetch, normalize, read stored
//! state, reconcile, commit) and differs only in policy and in how failures
//! are reported. Writes for one feed URL are serialized through
//! [`KeyedLocks`]; episode URL uniqueness is enforced by the store.

mod error;
pub mod import;
mod locks;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::config::IngestConfig;
use crate::feed::{normalize, Fetcher, NormalizedFeed};
use crate::reconcile::{
    reconcile, FeedRequest, FeedUpdatePlan, KnownEpisodes, OwnedEpisode, PlanCounts,
    ReconcileOptions, ReconcilePolicy, SkipReason, SkippedEpisode,
};
use crate::storage::{CommitReport, Database, DatabaseError, Feed};
use crate::util::validate_url;

pub use error::IngestError;
pub use locks::KeyedLocks;

/// Result of ingesting one feed.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub feed_id: i64,
    pub feed_url: String,
    pub counts: PlanCounts,
    pub skipped: Vec<SkippedEpisode>,
    /// Items dropped by the normalizer for lack of a valid URL.
    pub dropped_items: usize,
}

impl IngestOutcome {
    fn from_commit(
        feed_url: String,
        plan: FeedUpdatePlan,
        report: CommitReport,
        dropped_items: usize,
    ) -> Self {
        let mut counts = plan.counts();
        counts.new_episodes = report.inserted;
        counts.deleted_episodes = report.deleted;

        let mut skipped = plan.skipped;
        skipped.extend(report.conflicts.into_iter().map(|url| SkippedEpisode {
            url,
            reason: SkipReason::InsertedConcurrently,
        }));
        counts.skipped_episodes = skipped.len();

        Self {
            feed_id: report.feed_id,
            feed_url,
            counts,
            skipped,
            dropped_items,
        }
    }
}

/// Aggregate result of [`Ingestor::bulk_import`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Feeds created.
    pub imported: usize,
    /// Existing feeds whose record was updated.
    pub updated: usize,
    /// Episodes added by the refresh pass.
    pub new_episodes: usize,
    /// Entries that failed before their feed record was written.
    pub failed: usize,
    /// Entries whose feed record was written but whose episodes were not.
    pub refresh_failed: usize,
    /// One line per problem, `"<url>: <error>"`.
    pub errors: Vec<String>,
}

impl ImportSummary {
    pub fn message(&self) -> String {
        let mut message = format!(
            "Imported {} new feed(s) and updated {} existing feed(s). Added {} new episode(s).",
            self.imported, self.updated, self.new_episodes
        );
        if self.failed > 0 {
            message.push_str(&format!(" {} feed(s) failed to import.", self.failed));
        }
        if self.refresh_failed > 0 {
            message.push_str(&format!(
                " {} feed(s) imported without episodes.",
                self.refresh_failed
            ));
        }
        message
    }
}

/// What one bulk-import entry achieved.
struct ImportedFeed {
    created: bool,
    new_episodes: usize,
    /// The refresh pass failed after the feed record was committed.
    episode_error: Option<IngestError>,
}

pub struct Ingestor<F> {
    db: Database,
    fetcher: F,
    config: IngestConfig,
    allow_private_hosts: bool,
    locks: KeyedLocks,
}

impl<F: Fetcher> Ingestor<F> {
    pub fn new(db: Database, fetcher: F, config: IngestConfig) -> Self {
        Self {
            db,
            fetcher,
            config,
            allow_private_hosts: false,
            locks: KeyedLocks::new(),
        }
    }

    /// Accept feed URLs on localhost and private networks.
    pub fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Track a feed, or update it if the URL is already stored.
    ///
    /// Episodes are reconciled additively. The URL is validated before any
    /// network activity.
    pub async fn add_feed(&self, request: FeedRequest) -> Result<IngestOutcome, IngestError> {
        let request = self.validated(request)?;
        let _guard = self.locks.acquire(&request.url).await;

        let normalized = self.fetch_and_normalize(&request.url).await?;
        let existing = self.db.find_feed_by_url(&request.url).await?;
        let plan = self
            .plan(existing.as_ref(), &request, &normalized, ReconcilePolicy::Additive)
            .await?;
        let report = self.db.commit_plan(&plan).await?;

        let outcome = IngestOutcome::from_commit(request.url, plan, report, normalized.dropped);
        tracing::info!(
            feed = %outcome.feed_url,
            feed_id = outcome.feed_id,
            created = outcome.counts.created,
            new = outcome.counts.new_episodes,
            skipped = outcome.counts.skipped_episodes,
            "Feed added"
        );
        Ok(outcome)
    }

    /// Re-fetch a stored, active feed using the configured refresh policy.
    pub async fn refresh_feed(&self, feed_id: i64) -> Result<IngestOutcome, IngestError> {
        let feed = self
            .db
            .get_feed(feed_id)
            .await?
            .ok_or(IngestError::NotFound(feed_id))?;
        if !feed.is_active {
            return Err(IngestError::Inactive(feed_id));
        }

        let _guard = self.locks.acquire(&feed.url).await;
        let normalized = self.fetch_and_normalize(&feed.url).await?;

        // Re-read under the lock; the feed may have been edited or deleted.
        let feed = self
            .db
            .get_feed(feed_id)
            .await?
            .ok_or(IngestError::NotFound(feed_id))?;
        let request = FeedRequest::new(feed.url.clone());
        let plan = self
            .plan(Some(&feed), &request, &normalized, self.config.refresh_policy)
            .await?;
        let report = self.db.commit_plan(&plan).await?;

        let outcome = IngestOutcome::from_commit(feed.url, plan, report, normalized.dropped);
        tracing::info!(
            feed = %outcome.feed_url,
            feed_id,
            policy = ?self.config.refresh_policy,
            new = outcome.counts.new_episodes,
            deleted = outcome.counts.deleted_episodes,
            "Feed refreshed"
        );
        Ok(outcome)
    }

    /// Import many feeds concurrently; one entry's failure never aborts the
    /// others.
    ///
    /// Per entry, the feed record is committed first. For active feeds the
    /// new episodes from the same fetch are then committed additively.
    pub async fn bulk_import(&self, requests: Vec<FeedRequest>) -> ImportSummary {
        let total = requests.len();
        let concurrency = self.config.concurrency.max(1);

        let results: Vec<(String, Result<ImportedFeed, IngestError>)> = stream::iter(requests)
            .map(|request| async move {
                let label = request.url.trim().to_string();
                (label, self.import_one(request).await)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut summary = ImportSummary::default();
        for (url, result) in results {
            let label = if url.is_empty() { "<missing url>" } else { url.as_str() };
            match result {
                Ok(imported) => {
                    if imported.created {
                        summary.imported += 1;
                    } else {
                        summary.updated += 1;
                    }
                    summary.new_episodes += imported.new_episodes;
                    if let Some(e) = imported.episode_error {
                        summary.refresh_failed += 1;
                        summary.errors.push(format!("{label}: {e}"));
                    }
                }
                Err(e) => {
                    tracing::warn!(feed = %label, error = %e, "Import entry failed");
                    summary.failed += 1;
                    summary.errors.push(format!("{label}: {e}"));
                }
            }
        }

        tracing::info!(
            total,
            imported = summary.imported,
            updated = summary.updated,
            new_episodes = summary.new_episodes,
            failed = summary.failed,
            refresh_failed = summary.refresh_failed,
            "Bulk import finished"
        );
        summary
    }

    async fn import_one(&self, request: FeedRequest) -> Result<ImportedFeed, IngestError> {
        let request = self.validated(request)?;
        let _guard = self.locks.acquire(&request.url).await;

        let normalized = self.fetch_and_normalize(&request.url).await?;
        let existing = self.db.find_feed_by_url(&request.url).await?;
        let plan = self
            .plan(existing.as_ref(), &request, &normalized, ReconcilePolicy::Additive)
            .await?;

        let created = plan.feed.feed_id().is_none();
        let feed_id = self.db.commit_feed_write(&plan.feed).await?;

        let is_active = plan
            .feed
            .is_active()
            .or(existing.as_ref().map(|f| f.is_active))
            .unwrap_or(true);
        if !is_active {
            return Ok(ImportedFeed {
                created,
                new_episodes: 0,
                episode_error: None,
            });
        }

        match self.db.commit_episodes(feed_id, &plan.insert).await {
            Ok(report) => Ok(ImportedFeed {
                created,
                new_episodes: report.inserted,
                episode_error: None,
            }),
            Err(e) => {
                tracing::warn!(feed = %request.url, error = %e, "Episode refresh failed after import");
                Ok(ImportedFeed {
                    created,
                    new_episodes: 0,
                    episode_error: Some(e.into()),
                })
            }
        }
    }

    fn validated(&self, mut request: FeedRequest) -> Result<FeedRequest, IngestError> {
        let url = request.url.trim();
        if url.is_empty() {
            return Err(IngestError::Validation("missing feed URL".into()));
        }
        validate_url(url, self.allow_private_hosts)?;
        request.url = url.to_string();
        Ok(request)
    }

    async fn fetch_and_normalize(&self, url: &str) -> Result<NormalizedFeed, IngestError> {
        let bytes = self.fetcher.fetch(url).await?;
        let normalized = normalize(&bytes).inspect_err(|e| {
            tracing::warn!(feed = %url, error = %e, "Feed could not be normalized");
        })?;
        if normalized.dropped > 0 {
            tracing::warn!(feed = %url, dropped = normalized.dropped, "Items without a valid URL skipped");
        }
        Ok(normalized)
    }

    async fn plan(
        &self,
        existing: Option<&Feed>,
        request: &FeedRequest,
        normalized: &NormalizedFeed,
        policy: ReconcilePolicy,
    ) -> Result<FeedUpdatePlan, DatabaseError> {
        let known = self.known_episodes(existing, normalized).await?;
        let options = ReconcileOptions {
            preserve_favorites: self.config.preserve_favorites_on_replace,
            ..ReconcileOptions::default()
        };
        Ok(reconcile(existing, request, normalized, &known, policy, &options))
    }

    async fn known_episodes(
        &self,
        existing: Option<&Feed>,
        normalized: &NormalizedFeed,
    ) -> Result<KnownEpisodes, DatabaseError> {
        let owned = match existing {
            Some(feed) => self
                .db
                .episodes_for_feed(feed.id)
                .await?
                .into_iter()
                .map(|e| OwnedEpisode {
                    id: e.id,
                    url: e.url,
                    is_favorite: e.is_favorite,
                })
                .collect(),
            None => Vec::new(),
        };
        let urls: Vec<String> = normalized.episodes.iter().map(|e| e.url.clone()).collect();
        let owners = self.db.find_episode_owners(&urls).await?;
        Ok(KnownEpisodes::new(owned, owners))
    }
}
