//! magnet-relay library
//!
//! Feeds pending content locators, one at a time, to a remote offline-download
//! service and watches the service until each download-and-transfer pair
//! finishes or times out.

pub mod alist;
pub mod backend;
pub mod database;
pub mod feeds;
pub mod models;
pub mod monitor;
pub mod queue;
pub mod utils;

// Re-export main types for easier use
pub use alist::{AlistClient, OfflineTasks};
pub use backend::{RelayActor, RelayCommand};
pub use database::{DatabaseManager, RequestStore};
pub use feeds::FeedRefresher;
pub use models::{content_hash, DownloadRequest, Feed};
pub use monitor::{Monitor, MonitorConfig, StopOutcome, WatchOutcome, WatchState};
pub use queue::{DedupQueue, EventLog, QueueManager, SchedulerSnapshot};
pub use utils::{AppSettings, RelayError};
