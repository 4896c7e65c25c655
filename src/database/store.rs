use crate::models::DownloadRequest;
use anyhow::Result;
use async_trait::async_trait;

/// Persistence seen by the scheduler, the monitor and the periodic trigger
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Every request not yet marked completed, oldest first
    async fn pending_requests(&self) -> Result<Vec<DownloadRequest>>;

    async fn get_request(&self, id: i64) -> Result<Option<DownloadRequest>>;

    /// Name of the owning feed, which is also its save directory
    async fn feed_name(&self, feed_id: i64) -> Result<Option<String>>;

    async fn mark_completed(&self, id: i64) -> Result<()>;

    /// Drain the retries requested since the last call, oldest first
    async fn take_retry_requests(&self) -> Result<Vec<i64>>;
}
