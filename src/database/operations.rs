//! Database CRUD operations

use crate::database::store::RequestStore;
use crate::models::{content_hash, DownloadRequest, Feed};
use crate::utils::error::RelayError;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

/// A locator discovered in a feed, not yet persisted
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub feed_id: i64,
    pub title: String,
    pub content_locator: String,
}

/// Database manager
#[derive(Debug, Clone)]
pub struct DatabaseManager {
    pool: Pool<Sqlite>,
}

impl DatabaseManager {
    /// Create new database manager
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Create a feed
    pub async fn create_feed(&self, name: &str, url: &str) -> Result<Feed> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO feeds (name, url, last_updated, should_update) VALUES (?, ?, ?, TRUE)",
        )
        .bind(name)
        .bind(url)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(RelayError::from)?
        .last_insert_rowid();

        info!("Created feed {} ({})", id, name);
        Ok(Feed {
            id,
            name: name.to_string(),
            url: url.to_string(),
            last_updated: now,
            should_update: true,
        })
    }

    /// Get feed by ID
    pub async fn get_feed(&self, id: i64) -> Result<Option<Feed>> {
        let row = sqlx::query("SELECT * FROM feeds WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row_into_feed(row)?)),
            None => Ok(None),
        }
    }

    /// Get all feeds
    pub async fn list_feeds(&self) -> Result<Vec<Feed>> {
        let rows = sqlx::query("SELECT * FROM feeds ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_into_feed).collect()
    }

    /// Change a feed's name (and so its save directory). Returns false if the feed does not exist.
    pub async fn rename_feed(&self, id: i64, name: &str) -> Result<bool> {
        let updated = sqlx::query("UPDATE feeds SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        debug!("Renamed feed {} to {}: {}", id, name, updated > 0);
        Ok(updated > 0)
    }

    /// Include or exclude a feed from periodic refreshes
    pub async fn set_should_update(&self, id: i64, should_update: bool) -> Result<bool> {
        let updated = sqlx::query("UPDATE feeds SET should_update = ? WHERE id = ?")
            .bind(should_update)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(updated > 0)
    }

    /// Record a successful refresh
    pub async fn touch_feed(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE feeds SET last_updated = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a feed together with its requests. Returns false if the feed does not exist.
    pub async fn delete_feed(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM requests WHERE feed_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        debug!("Deleted feed {}: {}", id, deleted > 0);
        Ok(deleted > 0)
    }

    /// Persist newly discovered requests, skipping locators already known.
    ///
    /// Returns the number of rows actually inserted.
    pub async fn save_requests(&self, requests: &[NewRequest]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for request in requests {
            inserted += sqlx::query(
                r#"
                INSERT OR IGNORE INTO requests
                (feed_id, title, name, content_locator, content_hash, completed, created_at)
                VALUES (?, ?, ?, ?, ?, FALSE, ?)
                "#,
            )
            .bind(request.feed_id)
            .bind(&request.title)
            .bind(&request.title)
            .bind(&request.content_locator)
            .bind(content_hash(&request.content_locator))
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?
            .rows_affected() as usize;
        }

        tx.commit().await?;
        debug!("Saved {} of {} requests", inserted, requests.len());
        Ok(inserted)
    }

    /// Get request by ID
    pub async fn get_request(&self, id: i64) -> Result<Option<DownloadRequest>> {
        let row = sqlx::query("SELECT * FROM requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row_into_request(row)?)),
            None => Ok(None),
        }
    }

    /// Requests not yet completed, oldest first
    pub async fn pending_requests(&self) -> Result<Vec<DownloadRequest>> {
        let rows = sqlx::query("SELECT * FROM requests WHERE completed = FALSE ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_into_request).collect()
    }

    /// Every request of one feed
    pub async fn requests_by_feed(&self, feed_id: i64) -> Result<Vec<DownloadRequest>> {
        let rows = sqlx::query("SELECT * FROM requests WHERE feed_id = ? ORDER BY id")
            .bind(feed_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_into_request).collect()
    }

    /// Ask the running daemon to retry a request ahead of the queue
    pub async fn request_retry(&self, request_id: i64) -> Result<()> {
        if self.get_request(request_id).await?.is_none() {
            return Err(RelayError::NotFound(format!("request {}", request_id)).into());
        }

        sqlx::query("INSERT INTO retry_requests (request_id, requested_at) VALUES (?, ?)")
            .bind(request_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        info!("Queued retry of request {}", request_id);
        Ok(())
    }

    /// Flip the completion flag. Returns false if the request does not exist.
    pub async fn set_completed(&self, id: i64, completed: bool) -> Result<bool> {
        let updated = sqlx::query("UPDATE requests SET completed = ? WHERE id = ?")
            .bind(completed)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        debug!("Set request {} completed={}", id, completed);
        Ok(updated > 0)
    }
}

#[async_trait]
impl RequestStore for DatabaseManager {
    async fn pending_requests(&self) -> Result<Vec<DownloadRequest>> {
        DatabaseManager::pending_requests(self).await
    }

    async fn get_request(&self, id: i64) -> Result<Option<DownloadRequest>> {
        DatabaseManager::get_request(self, id).await
    }

    async fn feed_name(&self, feed_id: i64) -> Result<Option<String>> {
        Ok(self.get_feed(feed_id).await?.map(|feed| feed.name))
    }

    async fn mark_completed(&self, id: i64) -> Result<()> {
        if !self.set_completed(id, true).await? {
            return Err(RelayError::NotFound(format!("request {}", id)).into());
        }
        Ok(())
    }

    async fn take_retry_requests(&self) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query("SELECT id, request_id FROM retry_requests ORDER BY id")
            .fetch_all(&mut *tx)
            .await?;
        let mut request_ids = Vec::with_capacity(rows.len());
        for row in &rows {
            let request_id: i64 = row.try_get("request_id")?;
            request_ids.push(request_id);
        }

        if let Some(last) = rows.last() {
            let last_id: i64 = last.try_get("id")?;
            sqlx::query("DELETE FROM retry_requests WHERE id <= ?")
                .bind(last_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(request_ids)
    }
}

/// Convert database row to feed
fn row_into_feed(row: sqlx::sqlite::SqliteRow) -> Result<Feed> {
    Ok(Feed {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        last_updated: row.try_get("last_updated")?,
        should_update: row.try_get("should_update")?,
    })
}

/// Convert database row to download request
fn row_into_request(row: sqlx::sqlite::SqliteRow) -> Result<DownloadRequest> {
    Ok(DownloadRequest {
        id: row.try_get("id")?,
        feed_id: row.try_get("feed_id")?,
        title: row.try_get("title")?,
        name: row.try_get("name")?,
        content_locator: row.try_get("content_locator")?,
        content_hash: row.try_get("content_hash")?,
        completed: row.try_get("completed")?,
        created_at: row.try_get("created_at")?,
    })
}
