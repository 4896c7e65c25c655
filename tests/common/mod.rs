//! In-memory stand-ins for the remote service and the persistence layer.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use magnet_relay::alist::{
    DeletePolicy, DirectoryService, DownloaderTool, ExecutionState, ExternalTask,
    OfflineDownload, TaskKind, TaskService, TaskStatus,
};
use magnet_relay::{
    DownloadRequest, EventLog, MonitorConfig, OfflineTasks, QueueManager, RelayError,
    RequestStore,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const ROOT: &str = "/downloads";
pub const FEED_ID: i64 = 1;
pub const FEED_NAME: &str = "Show";

#[derive(Default)]
struct RemoteState {
    next_id: u64,
    undone: Vec<ExternalTask>,
    done_downloads: Vec<ExternalTask>,
    done_transfers: Vec<ExternalTask>,
    submissions: Vec<OfflineDownload>,
    dirs: HashSet<String>,
    cancels: usize,
    clears: usize,
    fail_lists: bool,
    fail_dirs: bool,
}

/// Offline-download service that only completes tasks when a test says so
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<RemoteState>,
}

fn task(id: u64, kind: TaskKind, locator: &str, status: TaskStatus) -> ExternalTask {
    ExternalTask {
        task_id: format!("task-{}", id),
        kind,
        action: "download".to_string(),
        reported_locator: locator.to_string(),
        target_path: ROOT.to_string(),
        status,
        progress: if status == TaskStatus::Succeeded { 100.0 } else { 0.0 },
        error_message: None,
    }
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Report a finished download of `locator` plus a finished transfer
    pub fn finish(&self, locator: &str, download: TaskStatus, transfer: TaskStatus) {
        let mut state = self.state.lock().unwrap();
        state.undone.retain(|t| t.reported_locator != locator);
        state.next_id += 2;
        let id = state.next_id;
        state
            .done_downloads
            .push(task(id, TaskKind::Download, locator, download));
        state
            .done_transfers
            .push(task(id + 1, TaskKind::Transfer, locator, transfer));
    }

    pub fn succeed(&self, locator: &str) {
        self.finish(locator, TaskStatus::Succeeded, TaskStatus::Succeeded);
    }

    /// Make every task listing fail until switched back
    pub fn set_fail_lists(&self, fail: bool) {
        self.state.lock().unwrap().fail_lists = fail;
    }

    /// Make directory lookups answer with a server error until switched back
    pub fn set_fail_dirs(&self, fail: bool) {
        self.state.lock().unwrap().fail_dirs = fail;
    }

    /// Locators in submission order
    pub fn submitted(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .submissions
            .iter()
            .flat_map(|s| s.urls.iter().cloned())
            .collect()
    }

    pub fn submissions(&self) -> Vec<OfflineDownload> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn undone_count(&self) -> usize {
        self.state.lock().unwrap().undone.len()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().unwrap().dirs.contains(path)
    }

    pub fn cancels(&self) -> usize {
        self.state.lock().unwrap().cancels
    }

    pub fn clears(&self) -> usize {
        self.state.lock().unwrap().clears
    }
}

#[async_trait]
impl TaskService for FakeRemote {
    async fn list_tasks(&self, kind: TaskKind, state: ExecutionState) -> Result<Vec<ExternalTask>> {
        let remote = self.state.lock().unwrap();
        if remote.fail_lists {
            return Err(anyhow!("connection reset"));
        }
        Ok(match (kind, state) {
            (TaskKind::Download, ExecutionState::Done) => remote.done_downloads.clone(),
            (TaskKind::Transfer, ExecutionState::Done) => remote.done_transfers.clone(),
            (TaskKind::Download, ExecutionState::Undone) => remote.undone.clone(),
            (TaskKind::Transfer, ExecutionState::Undone) => Vec::new(),
        })
    }

    async fn cancel(&self, _kind: TaskKind, task_id: &str) -> Result<()> {
        let mut remote = self.state.lock().unwrap();
        remote.undone.retain(|t| t.task_id != task_id);
        remote.cancels += 1;
        Ok(())
    }

    async fn clear_completed(&self, kind: TaskKind) -> Result<()> {
        let mut remote = self.state.lock().unwrap();
        match kind {
            TaskKind::Download => remote.done_downloads.clear(),
            TaskKind::Transfer => remote.done_transfers.clear(),
        }
        remote.clears += 1;
        Ok(())
    }

    async fn submit_offline_download(&self, download: &OfflineDownload) -> Result<Vec<ExternalTask>> {
        let mut remote = self.state.lock().unwrap();
        remote.submissions.push(download.clone());

        let mut created = Vec::new();
        for url in &download.urls {
            remote.next_id += 1;
            let pending = task(remote.next_id, TaskKind::Download, url, TaskStatus::Running);
            remote.undone.push(pending.clone());
            created.push(pending);
        }
        Ok(created)
    }
}

#[async_trait]
impl DirectoryService for FakeRemote {
    async fn exists(&self, path: &str) -> Result<bool> {
        let remote = self.state.lock().unwrap();
        if remote.fail_dirs {
            return Err(RelayError::Api {
                code: 503,
                message: "storage not ready".to_string(),
            }
            .into());
        }
        Ok(remote.dirs.contains(path))
    }

    async fn create(&self, path: &str) -> Result<()> {
        self.state.lock().unwrap().dirs.insert(path.to_string());
        Ok(())
    }

    async fn rename(&self, path: &str, new_name: &str) -> Result<()> {
        let mut remote = self.state.lock().unwrap();
        if !remote.dirs.remove(path) {
            return Err(anyhow!("no such directory {}", path));
        }
        let parent = path.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
        remote.dirs.insert(format!("{}/{}", parent, new_name));
        Ok(())
    }

    async fn remove(&self, dir: &str, names: &[String]) -> Result<()> {
        let mut remote = self.state.lock().unwrap();
        for name in names {
            remote.dirs.remove(&format!("{}/{}", dir, name));
        }
        Ok(())
    }
}

/// Request store backed by plain maps; remembers completion order
#[derive(Default)]
pub struct MemoryStore {
    feeds: Mutex<HashMap<i64, String>>,
    requests: Mutex<BTreeMap<i64, DownloadRequest>>,
    completed: Mutex<Vec<i64>>,
    retries: Mutex<Vec<i64>>,
    completion_delay: Mutex<Duration>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        let store = Self::default();
        store
            .feeds
            .lock()
            .unwrap()
            .insert(FEED_ID, FEED_NAME.to_string());
        Arc::new(store)
    }

    pub fn insert(&self, request: DownloadRequest) {
        self.requests.lock().unwrap().insert(request.id, request);
    }

    /// Hold every `mark_completed` call for `delay`
    pub fn set_completion_delay(&self, delay: Duration) {
        *self.completion_delay.lock().unwrap() = delay;
    }

    pub fn request_retry(&self, id: i64) {
        self.retries.lock().unwrap().push(id);
    }

    pub fn completed_order(&self) -> Vec<i64> {
        self.completed.lock().unwrap().clone()
    }

    pub fn is_completed(&self, id: i64) -> bool {
        self.requests
            .lock()
            .unwrap()
            .get(&id)
            .map(|r| r.completed)
            .unwrap_or(false)
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn pending_requests(&self) -> Result<Vec<DownloadRequest>> {
        Ok(self
            .requests
            .lock()
            .unwrap()
            .values()
            .filter(|r| !r.completed)
            .cloned()
            .collect())
    }

    async fn get_request(&self, id: i64) -> Result<Option<DownloadRequest>> {
        Ok(self.requests.lock().unwrap().get(&id).cloned())
    }

    async fn feed_name(&self, feed_id: i64) -> Result<Option<String>> {
        Ok(self.feeds.lock().unwrap().get(&feed_id).cloned())
    }

    async fn mark_completed(&self, id: i64) -> Result<()> {
        let delay = *self.completion_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(request) = self.requests.lock().unwrap().get_mut(&id) {
            request.completed = true;
        }
        self.completed.lock().unwrap().push(id);
        Ok(())
    }

    async fn take_retry_requests(&self) -> Result<Vec<i64>> {
        Ok(std::mem::take(&mut *self.retries.lock().unwrap()))
    }
}

pub fn request(id: i64) -> DownloadRequest {
    DownloadRequest::new(
        id,
        FEED_ID,
        format!("Episode {:02}", id),
        format!("magnet:?xt=urn:btih:{:040X}", id),
    )
}

pub fn fast_monitor() -> MonitorConfig {
    MonitorConfig {
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_secs(30),
    }
}

pub struct Harness {
    pub remote: Arc<FakeRemote>,
    pub store: Arc<MemoryStore>,
    pub manager: Arc<QueueManager>,
    pub event_log: Arc<EventLog>,
    _dir: TempDir,
}

pub async fn harness(config: MonitorConfig) -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let remote = FakeRemote::new();
    let store = MemoryStore::new();
    let event_log = Arc::new(EventLog::new(dir.path()).await.expect("event log"));

    let offline = OfflineTasks::new(
        remote.clone(),
        remote.clone(),
        ROOT,
        DeletePolicy::DeleteAlways,
        DownloaderTool::QBittorrent,
    );
    let manager = QueueManager::new(offline, store.clone(), config, event_log.clone());

    Harness {
        remote,
        store,
        manager,
        event_log,
        _dir: dir,
    }
}

/// Poll `check` until it holds or five seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Wait until the scheduler slot holds `expected`
pub async fn current_becomes(manager: &Arc<QueueManager>, expected: Option<i64>) -> bool {
    eventually(|| {
        let manager = Arc::clone(manager);
        async move { manager.snapshot().await.current == expected }
    })
    .await
}
