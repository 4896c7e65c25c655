//! Remote task vocabulary of the offline-download service

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Which task list a remote task belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// Fetching the content onto the service host
    #[serde(rename = "offline_download")]
    Download,
    /// Moving the fetched content into the target storage
    #[serde(rename = "offline_download_transfer")]
    Transfer,
}

impl TaskKind {
    /// Path segment used by the task admin API
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Download => "offline_download",
            TaskKind::Transfer => "offline_download_transfer",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Download => f.write_str("download"),
            TaskKind::Transfer => f.write_str("transfer"),
        }
    }
}

/// Task list filter: finished (any terminal status) or still in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Done,
    Undone,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Done => "done",
            ExecutionState::Undone => "undone",
        }
    }
}

/// Remote task status. The numeric codes are the service's wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Canceling,
    Canceled,
    Errored,
    Failing,
    Failed,
    WaitingRetry,
    BeforeRetry,
    Unknown,
}

impl TaskStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => TaskStatus::Pending,
            1 => TaskStatus::Running,
            2 => TaskStatus::Succeeded,
            3 => TaskStatus::Canceling,
            4 => TaskStatus::Canceled,
            5 => TaskStatus::Errored,
            6 => TaskStatus::Failing,
            7 => TaskStatus::Failed,
            8 => TaskStatus::WaitingRetry,
            9 => TaskStatus::BeforeRetry,
            _ => TaskStatus::Unknown,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Succeeded => 2,
            TaskStatus::Canceling => 3,
            TaskStatus::Canceled => 4,
            TaskStatus::Errored => 5,
            TaskStatus::Failing => 6,
            TaskStatus::Failed => 7,
            TaskStatus::WaitingRetry => 8,
            TaskStatus::BeforeRetry => 9,
            TaskStatus::Unknown => 10,
        }
    }
}

/// What the service does with the downloaded copy after the transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    DeleteOnUploadSucceed,
    DeleteOnUploadFailed,
    DeleteNever,
    DeleteAlways,
}

impl Default for DeletePolicy {
    fn default() -> Self {
        Self::DeleteAlways
    }
}

/// Downloader backend the service delegates to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloaderTool {
    #[serde(rename = "aria2")]
    Aria2,
    #[serde(rename = "qBittorrent")]
    QBittorrent,
}

impl Default for DownloaderTool {
    fn default() -> Self {
        Self::QBittorrent
    }
}

/// Task record as returned by the service
#[derive(Debug, Clone, Deserialize)]
pub struct RawTask {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: serde_json::Value,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Read-only mirror of a remote task
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalTask {
    pub task_id: String,
    pub kind: TaskKind,
    pub action: String,
    /// Locator (or file name) the service reports for this task
    pub reported_locator: String,
    pub target_path: String,
    pub status: TaskStatus,
    pub progress: f64,
    pub error_message: Option<String>,
}

impl ExternalTask {
    pub fn from_raw(kind: TaskKind, raw: RawTask) -> Self {
        let status = match raw.state.as_i64() {
            Some(code) if (0..=10).contains(&code) => TaskStatus::from_code(code),
            _ => {
                warn!("Unknown task status '{}' for task {}", raw.state, raw.id);
                TaskStatus::Unknown
            }
        };
        let (action, reported_locator, target_path) =
            parse_description(raw.name.as_deref().unwrap_or_default());

        Self {
            task_id: raw.id,
            kind,
            action,
            reported_locator,
            target_path,
            status,
            progress: raw.progress.unwrap_or_default(),
            error_message: raw.error.filter(|e| !e.is_empty()),
        }
    }
}

/// Split a task description of the form `"<action> <locator> to (<path>)"`.
pub fn parse_description(description: &str) -> (String, String, String) {
    let unknown = || "unknown".to_string();

    let Some((action, rest)) = description.split_once(' ') else {
        return (unknown(), unknown(), unknown());
    };

    match rest.find(" to ") {
        Some(idx) => {
            let locator = &rest[..idx];
            let path = rest[idx + 4..].trim_matches(|c| matches!(c, '[' | ']' | '(' | ')'));
            (action.to_string(), locator.to_string(), path.to_string())
        }
        None => (action.to_string(), rest.to_string(), unknown()),
    }
}

/// Offline download submission
#[derive(Debug, Clone, Serialize)]
pub struct OfflineDownload {
    pub path: String,
    pub urls: Vec<String>,
    pub tool: DownloaderTool,
    pub delete_policy: DeletePolicy,
}
