use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashSet;

use super::schema::Database;
use super::types::{format_timestamp, CommitReport, DatabaseError};
use crate::reconcile::{FeedUpdatePlan, FeedWrite, NewEpisode};

/// Rows per multi-row INSERT (7 bound parameters each).
const INSERT_BATCH_SIZE: usize = 50;

impl Database {
    // ========================================================================
    // Plan Commit
    // ========================================================================

    /// Apply a reconciliation plan atomically: feed write, episode deletes,
    /// then episode inserts, in one transaction.
    ///
    /// Episode inserts use `ON CONFLICT(url) DO NOTHING`; URLs stored by a
    /// concurrent writer after the plan was built come back in
    /// [`CommitReport::conflicts`] instead of failing the commit.
    pub async fn commit_plan(&self, plan: &FeedUpdatePlan) -> Result<CommitReport, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let feed_id = write_feed(&mut tx, &plan.feed).await?;
        let deleted = delete_episodes(&mut tx, feed_id, &plan.delete).await?;
        let (inserted, conflicts) = insert_episodes(&mut tx, feed_id, &plan.insert).await?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        tracing::info!(
            feed_id,
            inserted,
            deleted,
            conflicts = conflicts.len(),
            "Committed feed update"
        );
        Ok(CommitReport {
            feed_id,
            inserted,
            deleted,
            conflicts,
        })
    }

    /// Apply only the feed half of a plan. Returns the feed id.
    pub async fn commit_feed_write(&self, write: &FeedWrite) -> Result<i64, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;
        let feed_id = write_feed(&mut tx, write).await?;
        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(feed_id)
    }

    /// Insert episodes under an existing feed in one transaction.
    pub async fn commit_episodes(
        &self,
        feed_id: i64,
        episodes: &[NewEpisode],
    ) -> Result<CommitReport, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;
        let (inserted, conflicts) = insert_episodes(&mut tx, feed_id, episodes).await?;
        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        tracing::debug!(feed_id, inserted, conflicts = conflicts.len(), "Committed episodes");
        Ok(CommitReport {
            feed_id,
            inserted,
            deleted: 0,
            conflicts,
        })
    }
}

async fn write_feed(conn: &mut SqliteConnection, write: &FeedWrite) -> Result<i64, DatabaseError> {
    match write {
        FeedWrite::Create(feed) => {
            let (id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO feeds (url, name, topic, homepage_url, is_active, last_checked)
                VALUES (?, ?, ?, ?, ?, ?)
                RETURNING id
            "#,
            )
            .bind(&feed.url)
            .bind(&feed.name)
            .bind(&feed.topic)
            .bind(&feed.homepage_url)
            .bind(feed.is_active)
            .bind(format_timestamp(&feed.last_checked))
            .fetch_one(&mut *conn)
            .await
            .map_err(DatabaseError::from_sqlx)?;
            Ok(id)
        }
        FeedWrite::Update { id, changes } => {
            let result = sqlx::query(
                r#"
                UPDATE feeds SET
                    name = COALESCE(?, name),
                    topic = COALESCE(?, topic),
                    homepage_url = ?,
                    is_active = COALESCE(?, is_active),
                    last_checked = ?
                WHERE id = ?
            "#,
            )
            .bind(&changes.name)
            .bind(&changes.topic)
            .bind(&changes.homepage_url)
            .bind(changes.is_active)
            .bind(format_timestamp(&changes.last_checked))
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(DatabaseError::from_sqlx)?;
            if result.rows_affected() == 0 {
                return Err(DatabaseError::feed_not_found(*id));
            }
            Ok(*id)
        }
    }
}

async fn delete_episodes(
    conn: &mut SqliteConnection,
    feed_id: i64,
    ids: &[i64],
) -> Result<usize, DatabaseError> {
    let mut deleted = 0;
    for chunk in ids.chunks(INSERT_BATCH_SIZE) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM episodes WHERE feed_id = ");
        builder.push_bind(feed_id);
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        deleted += result.rows_affected() as usize;
    }
    Ok(deleted)
}

/// Returns the number inserted and the URLs that already existed.
async fn insert_episodes(
    conn: &mut SqliteConnection,
    feed_id: i64,
    episodes: &[NewEpisode],
) -> Result<(usize, Vec<String>), DatabaseError> {
    let mut inserted = 0;
    let mut conflicts = Vec::new();

    for chunk in episodes.chunks(INSERT_BATCH_SIZE) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO episodes (feed_id, title, description, pub_date, url, is_favorite, host) ",
        );
        builder.push_values(chunk, |mut b, episode| {
            b.push_bind(feed_id)
                .push_bind(&episode.title)
                .push_bind(&episode.description)
                .push_bind(episode.pub_date.map(|d| d.to_iso8601()))
                .push_bind(&episode.url)
                .push_bind(episode.is_favorite)
                .push_bind(&episode.host);
        });
        builder.push(" ON CONFLICT(url) DO NOTHING RETURNING url");

        let stored: Vec<(String,)> = builder
            .build_query_as()
            .fetch_all(&mut *conn)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        inserted += stored.len();

        let stored: HashSet<String> = stored.into_iter().map(|(url,)| url).collect();
        conflicts.extend(
            chunk
                .iter()
                .filter(|e| !stored.contains(&e.url))
                .map(|e| e.url.clone()),
        );
    }

    Ok((inserted, conflicts))
}
