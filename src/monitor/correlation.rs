use crate::alist::{ExecutionState, TaskKind, TaskService, TaskStatus};
use crate::models::DownloadRequest;
use anyhow::Result;
use tracing::{debug, warn};

/// True when the remote service reports `request` as downloaded and transferred.
///
/// Only the first finished record of each kind is considered; the service is
/// expected to run nothing but this relay's single request. The download
/// record is tied back to `request` by re-hashing the locator it reports.
pub async fn check_completion(tasks: &dyn TaskService, request: &DownloadRequest) -> Result<bool> {
    let downloads = tasks.list_tasks(TaskKind::Download, ExecutionState::Done).await?;
    let transfers = tasks.list_tasks(TaskKind::Transfer, ExecutionState::Done).await?;

    if downloads.len() > 1 || transfers.len() > 1 {
        warn!(
            "Ambiguous completion for request {}: {} finished downloads, {} finished transfers; using the first of each",
            request.id,
            downloads.len(),
            transfers.len()
        );
    }

    let (Some(download), Some(transfer)) = (downloads.first(), transfers.first()) else {
        return Ok(false);
    };

    if !request.matches_locator(&download.reported_locator) {
        debug!(
            "Finished download {} belongs to another locator, still waiting for request {}",
            download.task_id, request.id
        );
        return Ok(false);
    }

    Ok(download.status == TaskStatus::Succeeded && transfer.status == TaskStatus::Succeeded)
}
