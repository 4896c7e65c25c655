use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

/// Scheduler transitions, appended to the event log as JSON lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A request entered the primary queue
    RequestQueued {
        request_id: i64,
        name: String,
        timestamp: DateTime<Utc>,
    },
    /// A request was submitted to the remote service and is being watched
    RequestPushed {
        request_id: i64,
        save_path: String,
        timestamp: DateTime<Utc>,
    },
    /// Submitting a request failed; the slot keeps it until a retry
    PushFailed {
        request_id: i64,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// The running request was moved to the suspended queue by a preemption
    RequestSuspended {
        request_id: i64,
        preempted_by: i64,
        timestamp: DateTime<Utc>,
    },
    /// Download and transfer both succeeded
    RequestCompleted {
        request_id: i64,
        timestamp: DateTime<Utc>,
    },
    /// The watch gave up; the request stays pending
    WatchTimedOut {
        request_id: i64,
        timestamp: DateTime<Utc>,
    },
}

impl QueueEvent {
    pub fn request_id(&self) -> i64 {
        match self {
            QueueEvent::RequestQueued { request_id, .. }
            | QueueEvent::RequestPushed { request_id, .. }
            | QueueEvent::PushFailed { request_id, .. }
            | QueueEvent::RequestSuspended { request_id, .. }
            | QueueEvent::RequestCompleted { request_id, .. }
            | QueueEvent::WatchTimedOut { request_id, .. } => *request_id,
        }
    }
}

/// Helper to manage the persistent event log
#[derive(Debug, Clone)]
pub struct EventLog {
    file_path: PathBuf,
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl EventLog {
    pub async fn new(base_dir: &Path) -> Result<Self> {
        let file_path = base_dir.join("events.jsonl");

        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .await
            .context("Failed to open event log")?;

        Ok(Self {
            file_path,
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    /// Append an event to the log
    pub async fn log(&self, event: QueueEvent) -> Result<()> {
        let json = serde_json::to_string(&event)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read back every event, skipping lines that fail to parse
    pub async fn read_events(&self) -> Result<Vec<QueueEvent>> {
        if !self.file_path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&self.file_path).await?;
        let mut events = Vec::new();

        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<QueueEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!("Failed to parse event log line: {}. Error: {}", line, e);
                }
            }
        }
        Ok(events)
    }
}
