use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, Feed, FeedDbRow, FeedEdit, FEED_COLUMNS};
use crate::util::clean_text;

impl Database {
    // ========================================================================
    // Feed Queries
    // ========================================================================

    pub async fn find_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedDbRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"))
                .bind(url.trim())
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
        Ok(row.map(FeedDbRow::into_feed))
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedDbRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"))
                .bind(feed_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
        Ok(row.map(FeedDbRow::into_feed))
    }

    /// All feeds ordered by topic, then name.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let rows: Vec<FeedDbRow> = sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY topic, name, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(rows.into_iter().map(FeedDbRow::into_feed).collect())
    }

    // ========================================================================
    // Manual Curation
    // ========================================================================

    /// Apply a partial manual edit and return the updated feed.
    ///
    /// Blank `name`, `topic` or `homepage_url` clear the stored value.
    pub async fn update_feed(&self, feed_id: i64, edit: &FeedEdit) -> Result<Feed, DatabaseError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE feeds SET ");
        let mut fields = builder.separated(", ");
        let mut touched = false;

        for (column, value) in [
            ("name", &edit.name),
            ("topic", &edit.topic),
            ("homepage_url", &edit.homepage_url),
        ] {
            if let Some(value) = value {
                fields.push(format!("{column} = "));
                fields.push_bind_unseparated(clean_text(value));
                touched = true;
            }
        }
        if let Some(active) = edit.is_active {
            fields.push("is_active = ");
            fields.push_bind_unseparated(active);
            touched = true;
        }

        if touched {
            builder.push(" WHERE id = ");
            builder.push_bind(feed_id);
            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
            if result.rows_affected() == 0 {
                return Err(DatabaseError::feed_not_found(feed_id));
            }
        }

        let feed = self
            .get_feed(feed_id)
            .await?
            .ok_or_else(|| DatabaseError::feed_not_found(feed_id))?;
        tracing::info!(feed_id, "Feed updated");
        Ok(feed)
    }

    pub async fn set_feed_active(&self, feed_id: i64, active: bool) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE feeds SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(feed_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::feed_not_found(feed_id));
        }
        Ok(())
    }

    /// Delete a feed and all of its episodes in one transaction.
    ///
    /// Returns the number of episodes removed.
    pub async fn delete_feed(&self, feed_id: i64) -> Result<u64, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let episodes = sqlx::query("DELETE FROM episodes WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .rows_affected();

        let feeds = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .rows_affected();

        if feeds == 0 {
            // Dropping the transaction rolls it back.
            return Err(DatabaseError::feed_not_found(feed_id));
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        tracing::info!(feed_id, episodes, "Feed deleted");
        Ok(episodes)
    }
}

#[cfg(test)]
mod tests {
    use crate::reconcile::{FeedWrite, NewEpisode, NewFeed};
    use crate::storage::{Database, DatabaseError, FeedEdit};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    async fn create_feed(db: &Database, n: u32, topic: Option<&str>, name: &str) -> i64 {
        db.commit_feed_write(&FeedWrite::Create(NewFeed {
            url: format!("https://feed{n}.example.com/rss"),
            name: Some(name.to_string()),
            topic: topic.map(str::to_string),
            homepage_url: None,
            is_active: true,
            last_checked: Utc::now(),
        }))
        .await
        .unwrap()
    }

    fn episode(url: &str) -> NewEpisode {
        NewEpisode {
            title: "Ep".into(),
            description: "Desc".into(),
            pub_date: None,
            url: url.into(),
            host: "Host".into(),
            is_favorite: false,
        }
    }

    #[tokio::test]
    async fn test_find_feed_by_url() {
        let db = test_db().await;
        let id = create_feed(&db, 1, None, "One").await;

        let feed = db
            .find_feed_by_url("https://feed1.example.com/rss")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(feed.id, id);
        assert_eq!(feed.name.as_deref(), Some("One"));
        assert!(feed.is_active);
        assert!(feed.last_checked.is_some());

        assert!(db
            .find_feed_by_url("https://missing.example.com/rss")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_feeds_orders_by_topic_then_name() {
        let db = test_db().await;
        create_feed(&db, 1, Some("Science"), "Zeta").await;
        create_feed(&db, 2, Some("Comedy"), "Beta").await;
        create_feed(&db, 3, Some("Science"), "Alpha").await;

        let names: Vec<String> = db
            .list_feeds()
            .await
            .unwrap()
            .into_iter()
            .filter_map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["Beta", "Alpha", "Zeta"]);
    }

    #[tokio::test]
    async fn test_update_feed_partial() {
        let db = test_db().await;
        let id = create_feed(&db, 1, Some("Science"), "Original").await;

        let feed = db
            .update_feed(
                id,
                &FeedEdit {
                    name: Some("Renamed".into()),
                    homepage_url: Some("https://example.com/".into()),
                    ..FeedEdit::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(feed.name.as_deref(), Some("Renamed"));
        assert_eq!(feed.topic.as_deref(), Some("Science"));
        assert_eq!(feed.homepage_url.as_deref(), Some("https://example.com/"));

        let feed = db
            .update_feed(
                id,
                &FeedEdit {
                    topic: Some("  ".into()),
                    is_active: Some(false),
                    ..FeedEdit::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(feed.topic, None);
        assert!(!feed.is_active);
    }

    #[tokio::test]
    async fn test_update_missing_feed() {
        let db = test_db().await;
        let err = db
            .update_feed(
                42,
                &FeedEdit {
                    name: Some("x".into()),
                    ..FeedEdit::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { id: 42, .. }));
        assert!(matches!(
            db.set_feed_active(42, false).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_feed_removes_episodes() {
        let db = test_db().await;
        let keep = create_feed(&db, 1, None, "Keep").await;
        let gone = create_feed(&db, 2, None, "Gone").await;
        db.commit_episodes(keep, &[episode("https://e.com/keep")])
            .await
            .unwrap();
        db.commit_episodes(gone, &[episode("https://e.com/a"), episode("https://e.com/b")])
            .await
            .unwrap();

        assert_eq!(db.delete_feed(gone).await.unwrap(), 2);
        assert!(db.get_feed(gone).await.unwrap().is_none());
        assert!(db.find_episode_by_url("https://e.com/a").await.unwrap().is_none());
        assert_eq!(db.episodes_for_feed(keep).await.unwrap().len(), 1);

        assert!(matches!(
            db.delete_feed(gone).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }
}
