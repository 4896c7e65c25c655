//! Application configuration

use crate::alist::{DeletePolicy, DownloaderTool};
use crate::utils::error::RelayError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Environment override for the API token
pub const TOKEN_ENV: &str = "MAGNET_RELAY_TOKEN";
/// Environment override for the service address
pub const BASE_URL_ENV: &str = "MAGNET_RELAY_BASE_URL";

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Offline-download service address
    pub base_url: String,

    /// Value of the `Authorization` header
    pub token: String,

    /// Remote directory under which one folder per feed is created
    pub root_save_path: String,

    /// What the remote service does with local copies after transfer
    pub delete_policy: DeletePolicy,

    /// Remote downloader backend
    pub tool: DownloaderTool,

    /// Seconds between completion checks
    pub poll_interval_secs: u64,

    /// Seconds before a watched request is released unmarked
    pub watch_timeout_secs: u64,

    /// Seconds between feed refreshes and scans for pending requests
    pub scan_interval_secs: u64,

    /// Seconds between checks for retries requested from the command line
    pub control_interval_secs: u64,

    /// Feed items whose title contains any of these (case-insensitive) are skipped
    pub blocked_words: Vec<String>,

    /// Proxy used to fetch a feed again when a direct fetch fails
    pub feed_proxy: Option<String>,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Directory holding the scheduler event log
    pub data_dir: PathBuf,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5244".to_string(),
            token: String::new(),
            root_save_path: "/downloads".to_string(),
            delete_policy: DeletePolicy::DeleteAlways,
            tool: DownloaderTool::QBittorrent,
            poll_interval_secs: 10,
            watch_timeout_secs: 90 * 60,
            scan_interval_secs: 30 * 60,
            control_interval_secs: 5,
            blocked_words: Vec::new(),
            feed_proxy: None,
            database_path: crate::utils::get_database_path(),
            data_dir: crate::utils::get_data_dir(),
        }
    }
}

impl AppSettings {
    /// Load settings from a JSON file, then apply environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str::<AppSettings>(&raw).map_err(RelayError::from)?
            }
            Some(path) => {
                warn!("Config file {} not found, using defaults", path.display());
                AppSettings::default()
            }
            None => AppSettings::default(),
        };

        settings.apply_env();
        settings.validate()?;
        debug!("Loaded settings: base_url={}", settings.base_url);
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            self.token = token;
        }
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            self.base_url = base_url;
        }
    }

    /// Enforce sane minimums and reject unusable values
    pub fn validate(&mut self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(RelayError::Config("base_url must not be empty".to_string()).into());
        }
        if self.poll_interval_secs == 0 {
            self.poll_interval_secs = 1;
        }
        if self.scan_interval_secs == 0 {
            self.scan_interval_secs = 1;
        }
        if self.control_interval_secs == 0 {
            self.control_interval_secs = 1;
        }
        self.blocked_words.retain(|word| !word.trim().is_empty());
        if self.feed_proxy.as_deref().is_some_and(|proxy| proxy.trim().is_empty()) {
            self.feed_proxy = None;
        }
        if self.watch_timeout_secs < self.poll_interval_secs {
            self.watch_timeout_secs = self.poll_interval_secs;
        }
        self.root_save_path = self.root_save_path.trim_end_matches('/').to_string();
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn watch_timeout(&self) -> Duration {
        Duration::from_secs(self.watch_timeout_secs)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn control_interval(&self) -> Duration {
        Duration::from_secs(self.control_interval_secs)
    }
}
