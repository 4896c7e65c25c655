//! Higher-level operations composed from the remote task and directory APIs

use crate::alist::task::{
    DeletePolicy, DownloaderTool, ExecutionState, ExternalTask, OfflineDownload, TaskKind,
};
use crate::alist::traits::{DirectoryService, TaskService};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Submission settings plus handles to both remote APIs
#[derive(Clone)]
pub struct OfflineTasks {
    tasks: Arc<dyn TaskService>,
    directories: Arc<dyn DirectoryService>,
    root_save_path: String,
    delete_policy: DeletePolicy,
    tool: DownloaderTool,
}

impl OfflineTasks {
    pub fn new(
        tasks: Arc<dyn TaskService>,
        directories: Arc<dyn DirectoryService>,
        root_save_path: impl Into<String>,
        delete_policy: DeletePolicy,
        tool: DownloaderTool,
    ) -> Self {
        Self {
            tasks,
            directories,
            root_save_path: root_save_path.into(),
            delete_policy,
            tool,
        }
    }

    pub fn task_service(&self) -> Arc<dyn TaskService> {
        Arc::clone(&self.tasks)
    }

    /// Cancel every in-progress task of `kind`, returning how many cancels succeeded.
    ///
    /// One failing cancel does not stop the others.
    pub async fn cancel_all(&self, kind: TaskKind) -> Result<usize> {
        let pending = self.tasks.list_tasks(kind, ExecutionState::Undone).await?;
        let mut cancelled = 0;

        for task in &pending {
            match self.tasks.cancel(kind, &task.task_id).await {
                Ok(()) => cancelled += 1,
                Err(e) => error!("Failed to cancel {} task {}: {}", kind, task.task_id, e),
            }
        }
        Ok(cancelled)
    }

    /// Bring the remote service to a clean baseline: cancel every unfinished
    /// download and transfer, then clear every finished one.
    ///
    /// Each step is attempted even if an earlier one failed; failures are logged.
    pub async fn reset_all(&self) {
        for kind in [TaskKind::Download, TaskKind::Transfer] {
            match self.cancel_all(kind).await {
                Ok(n) if n > 0 => info!("Cancelled {} unfinished {} tasks", n, kind),
                Ok(_) => {}
                Err(e) => error!("Failed to list unfinished {} tasks: {}", kind, e),
            }
        }
        for kind in [TaskKind::Download, TaskKind::Transfer] {
            if let Err(e) = self.tasks.clear_completed(kind).await {
                error!("Failed to clear finished {} tasks: {}", kind, e);
            }
        }
        debug!("Remote task lists reset");
    }

    /// Save path for a feed: `<root>/<feed name>`, created remotely if absent
    pub async fn resolve_save_path(&self, feed_name: &str) -> Result<String> {
        let save_path = format!("{}/{}", self.root_save_path, feed_name);

        if !self.directories.exists(&save_path).await? {
            info!("Save path {} missing, creating it", save_path);
            self.directories.create(&save_path).await?;
        }
        Ok(save_path)
    }

    /// Rename a feed's save directory. Returns false if it does not exist yet.
    pub async fn rename_feed_dir(&self, old_name: &str, new_name: &str) -> Result<bool> {
        let old_path = format!("{}/{}", self.root_save_path, old_name);

        if !self.directories.exists(&old_path).await? {
            info!("Save path {} does not exist, nothing to rename", old_path);
            return Ok(false);
        }
        self.directories.rename(&old_path, new_name).await?;
        Ok(true)
    }

    /// Delete a feed's save directory and everything in it
    pub async fn remove_feed_dir(&self, feed_name: &str) -> Result<()> {
        self.directories
            .remove(&self.root_save_path, &[feed_name.to_string()])
            .await
    }

    /// Reset remote state, then submit one offline download of `locator` into `save_path`
    pub async fn submit(&self, save_path: &str, locator: &str) -> Result<Vec<ExternalTask>> {
        self.reset_all().await;

        let download = OfflineDownload {
            path: save_path.to_string(),
            urls: vec![locator.to_string()],
            tool: self.tool,
            delete_policy: self.delete_policy,
        };
        self.tasks.submit_offline_download(&download).await
    }
}
