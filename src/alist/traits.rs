use crate::alist::task::{ExecutionState, ExternalTask, OfflineDownload, TaskKind};
use anyhow::Result;
use async_trait::async_trait;

/// Remote task API of the offline-download service
///
/// This trait isolates the scheduler and the monitor from the HTTP client so
/// they can be driven against an in-memory service in tests.
#[async_trait]
pub trait TaskService: Send + Sync {
    /// List tasks of one kind, filtered by execution state
    async fn list_tasks(&self, kind: TaskKind, state: ExecutionState) -> Result<Vec<ExternalTask>>;

    /// Cancel a single in-progress task
    async fn cancel(&self, kind: TaskKind, task_id: &str) -> Result<()>;

    /// Drop every finished task of one kind
    async fn clear_completed(&self, kind: TaskKind) -> Result<()>;

    /// Submit an offline download; returns the task descriptors the service created
    async fn submit_offline_download(&self, download: &OfflineDownload) -> Result<Vec<ExternalTask>>;
}

/// Remote directory tree of the offline-download service
#[async_trait]
pub trait DirectoryService: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool>;

    async fn create(&self, path: &str) -> Result<()>;

    /// Rename the last component of `path` to `new_name`
    async fn rename(&self, path: &str, new_name: &str) -> Result<()>;

    /// Remove `names` from directory `dir`
    async fn remove(&self, dir: &str, names: &[String]) -> Result<()>;
}
