use sqlx::QueryBuilder;
use std::collections::HashMap;

use super::schema::Database;
use super::types::{
    DatabaseError, Episode, EpisodeDbRow, EpisodeEdit, EpisodeFilter, EPISODE_COLUMNS,
};
use crate::util::clean_text;

/// SQLite caps bound parameters per statement; stay well below it.
const LOOKUP_BATCH_SIZE: usize = 100;

impl Database {
    // ========================================================================
    // Episode Queries
    // ========================================================================

    pub async fn find_episode_by_url(&self, url: &str) -> Result<Option<Episode>, DatabaseError> {
        let row: Option<EpisodeDbRow> =
            sqlx::query_as(&format!("SELECT {EPISODE_COLUMNS} FROM episodes WHERE url = ?"))
                .bind(url)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
        Ok(row.map(EpisodeDbRow::into_episode))
    }

    /// Map each of `urls` that is already stored to the id of the feed that
    /// owns it. Unknown URLs are absent from the result.
    pub async fn find_episode_owners(
        &self,
        urls: &[String],
    ) -> Result<HashMap<String, i64>, DatabaseError> {
        let mut owners = HashMap::new();

        for chunk in urls.chunks(LOOKUP_BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("SELECT url, feed_id FROM episodes WHERE url IN (");
            let mut separated = builder.separated(", ");
            for url in chunk {
                separated.push_bind(url);
            }
            separated.push_unseparated(")");

            let rows: Vec<(String, i64)> = builder
                .build_query_as()
                .fetch_all(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
            owners.extend(rows);
        }

        Ok(owners)
    }

    /// Episodes of one feed, newest first.
    pub async fn episodes_for_feed(&self, feed_id: i64) -> Result<Vec<Episode>, DatabaseError> {
        self.list_episodes(&EpisodeFilter {
            feed_id: Some(feed_id),
            favorites_only: false,
        })
        .await
    }

    /// Episodes matching `filter`, newest first; undated episodes last.
    pub async fn list_episodes(&self, filter: &EpisodeFilter) -> Result<Vec<Episode>, DatabaseError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new(format!("SELECT {EPISODE_COLUMNS} FROM episodes WHERE 1 = 1"));
        if let Some(feed_id) = filter.feed_id {
            builder.push(" AND feed_id = ");
            builder.push_bind(feed_id);
        }
        if filter.favorites_only {
            builder.push(" AND is_favorite = 1");
        }
        builder.push(" ORDER BY pub_date IS NULL, pub_date DESC, id DESC");

        let rows: Vec<EpisodeDbRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(rows.into_iter().map(EpisodeDbRow::into_episode).collect())
    }

    // ========================================================================
    // Manual Curation
    // ========================================================================

    pub async fn set_episode_favorite(
        &self,
        episode_id: i64,
        favorite: bool,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE episodes SET is_favorite = ? WHERE id = ?")
            .bind(favorite)
            .bind(episode_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::episode_not_found(episode_id));
        }
        Ok(())
    }

    /// Apply a partial manual edit and return the updated episode.
    ///
    /// A blank title or description is ignored (both columns are required);
    /// a blank host clears it.
    pub async fn update_episode(
        &self,
        episode_id: i64,
        edit: &EpisodeEdit,
    ) -> Result<Episode, DatabaseError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE episodes SET ");
        let mut fields = builder.separated(", ");
        let mut touched = false;

        for (column, value) in [("title", &edit.title), ("description", &edit.description)] {
            if let Some(value) = value.as_deref().and_then(clean_text) {
                fields.push(format!("{column} = "));
                fields.push_bind_unseparated(value);
                touched = true;
            }
        }
        if let Some(pub_date) = edit.pub_date {
            fields.push("pub_date = ");
            fields.push_bind_unseparated(pub_date.to_iso8601());
            touched = true;
        }
        if let Some(host) = &edit.host {
            fields.push("host = ");
            fields.push_bind_unseparated(clean_text(host));
            touched = true;
        }

        if touched {
            builder.push(" WHERE id = ");
            builder.push_bind(episode_id);
            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
            if result.rows_affected() == 0 {
                return Err(DatabaseError::episode_not_found(episode_id));
            }
        }

        let row: Option<EpisodeDbRow> =
            sqlx::query_as(&format!("SELECT {EPISODE_COLUMNS} FROM episodes WHERE id = ?"))
                .bind(episode_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
        row.map(EpisodeDbRow::into_episode)
            .ok_or_else(|| DatabaseError::episode_not_found(episode_id))
    }

    pub async fn delete_episode(&self, episode_id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM episodes WHERE id = ?")
            .bind(episode_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::episode_not_found(episode_id));
        }
        Ok(())
    }

    /// Remove every episode of a feed atomically. Returns the count removed.
    pub async fn delete_episodes_for_feed(&self, feed_id: i64) -> Result<u64, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;
        let removed = sqlx::query("DELETE FROM episodes WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .rows_affected();
        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        tracing::debug!(feed_id, removed, "Episodes deleted for feed");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use crate::feed::PubDate;
    use crate::reconcile::{FeedWrite, NewEpisode, NewFeed};
    use crate::storage::{Database, DatabaseError, EpisodeEdit, EpisodeFilter};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    async fn create_feed(db: &Database, n: u32) -> i64 {
        db.commit_feed_write(&FeedWrite::Create(NewFeed {
            url: format!("https://feed{n}.example.com/rss"),
            name: None,
            topic: None,
            homepage_url: None,
            is_active: true,
            last_checked: Utc::now(),
        }))
        .await
        .unwrap()
    }

    fn episode(url: &str, pub_date: Option<&str>) -> NewEpisode {
        NewEpisode {
            title: format!("Title {url}"),
            description: "Desc".into(),
            pub_date: pub_date.and_then(PubDate::from_iso8601),
            url: url.into(),
            host: "Host".into(),
            is_favorite: false,
        }
    }

    #[tokio::test]
    async fn test_find_episode_owners() {
        let db = test_db().await;
        let a = create_feed(&db, 1).await;
        let b = create_feed(&db, 2).await;
        db.commit_episodes(a, &[episode("https://e.com/a1", None)])
            .await
            .unwrap();
        db.commit_episodes(b, &[episode("https://e.com/b1", None)])
            .await
            .unwrap();

        let owners = db
            .find_episode_owners(&[
                "https://e.com/a1".to_string(),
                "https://e.com/b1".to_string(),
                "https://e.com/none".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(owners.len(), 2);
        assert_eq!(owners["https://e.com/a1"], a);
        assert_eq!(owners["https://e.com/b1"], b);
    }

    #[tokio::test]
    async fn test_find_episode_owners_batches() {
        let db = test_db().await;
        let feed = create_feed(&db, 1).await;
        let episodes: Vec<NewEpisode> = (0..250)
            .map(|i| episode(&format!("https://e.com/{i}"), None))
            .collect();
        db.commit_episodes(feed, &episodes).await.unwrap();

        let urls: Vec<String> = (0..300).map(|i| format!("https://e.com/{i}")).collect();
        let owners = db.find_episode_owners(&urls).await.unwrap();
        assert_eq!(owners.len(), 250);
    }

    #[tokio::test]
    async fn test_episodes_round_trip_pub_date() {
        let db = test_db().await;
        let feed = create_feed(&db, 1).await;
        db.commit_episodes(
            feed,
            &[
                episode("https://e.com/zoned", Some("2024-01-02T10:00:00+02:00")),
                episode("https://e.com/naive", Some("2024-01-01T09:00:00")),
                episode("https://e.com/undated", None),
            ],
        )
        .await
        .unwrap();

        let episodes = db.episodes_for_feed(feed).await.unwrap();
        let urls: Vec<&str> = episodes.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://e.com/zoned", "https://e.com/naive", "https://e.com/undated"]
        );
        assert_eq!(
            episodes[0].pub_date.map(|d| d.to_iso8601()).as_deref(),
            Some("2024-01-02T10:00:00+02:00")
        );
        assert!(matches!(episodes[1].pub_date, Some(PubDate::Naive(_))));
        assert_eq!(episodes[2].pub_date, None);
        assert_eq!(episodes[0].host.as_deref(), Some("Host"));
    }

    #[tokio::test]
    async fn test_list_favorites() {
        let db = test_db().await;
        let feed = create_feed(&db, 1).await;
        db.commit_episodes(
            feed,
            &[episode("https://e.com/1", None), episode("https://e.com/2", None)],
        )
        .await
        .unwrap();
        let target = db
            .find_episode_by_url("https://e.com/2")
            .await
            .unwrap()
            .unwrap();
        db.set_episode_favorite(target.id, true).await.unwrap();

        let favorites = db
            .list_episodes(&EpisodeFilter {
                favorites_only: true,
                ..EpisodeFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].id, target.id);
        assert!(favorites[0].is_favorite);
    }

    #[tokio::test]
    async fn test_update_episode() {
        let db = test_db().await;
        let feed = create_feed(&db, 1).await;
        db.commit_episodes(feed, &[episode("https://e.com/1", None)])
            .await
            .unwrap();
        let id = db
            .find_episode_by_url("https://e.com/1")
            .await
            .unwrap()
            .unwrap()
            .id;

        let updated = db
            .update_episode(
                id,
                &EpisodeEdit {
                    title: Some("Edited".into()),
                    description: Some("   ".into()),
                    pub_date: PubDate::from_iso8601("2024-05-06"),
                    host: Some(String::new()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Edited");
        assert_eq!(updated.description, "Desc");
        assert_eq!(
            updated.pub_date.map(|d| d.to_iso8601()).as_deref(),
            Some("2024-05-06T00:00:00")
        );
        assert_eq!(updated.host, None);
    }

    #[tokio::test]
    async fn test_missing_episode_operations() {
        let db = test_db().await;
        assert!(matches!(
            db.set_episode_favorite(9, true).await,
            Err(DatabaseError::NotFound { id: 9, .. })
        ));
        assert!(matches!(
            db.delete_episode(9).await,
            Err(DatabaseError::NotFound { .. })
        ));
        assert!(matches!(
            db.update_episode(9, &EpisodeEdit::default()).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_episodes_for_feed() {
        let db = test_db().await;
        let a = create_feed(&db, 1).await;
        let b = create_feed(&db, 2).await;
        db.commit_episodes(a, &[episode("https://e.com/1", None), episode("https://e.com/2", None)])
            .await
            .unwrap();
        db.commit_episodes(b, &[episode("https://e.com/3", None)])
            .await
            .unwrap();

        assert_eq!(db.delete_episodes_for_feed(a).await.unwrap(), 2);
        assert!(db.episodes_for_feed(a).await.unwrap().is_empty());
        assert_eq!(db.episodes_for_feed(b).await.unwrap().len(), 1);
        assert!(db.get_feed(a).await.unwrap().is_some());
    }
}
