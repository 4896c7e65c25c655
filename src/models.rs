//! Data structures for feeds and download requests

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// A subscribed source of content locators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    /// Also the directory name under the configured root save path
    pub name: String,
    pub url: String,
    pub last_updated: DateTime<Utc>,
    pub should_update: bool,
}

/// A single content reference awaiting offline download + transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub name: String,
    /// The magnet-style link handed to the remote service
    pub content_locator: String,
    /// Hex MD5 of `content_locator`, used to correlate remote tasks
    pub content_hash: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl DownloadRequest {
    /// Create a new, not yet completed request. `name` defaults to `title`.
    pub fn new(
        id: i64,
        feed_id: i64,
        title: impl Into<String>,
        content_locator: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let content_locator = content_locator.into();

        Self {
            id,
            feed_id,
            name: title.clone(),
            title,
            content_hash: content_hash(&content_locator),
            content_locator,
            completed: false,
            created_at: Utc::now(),
        }
    }

    /// True iff the digest of `reported` equals this request's hash exactly.
    ///
    /// The comparison is case-sensitive on the locator: a reported locator that
    /// differs only by letter case produces a different digest.
    pub fn matches_locator(&self, reported: &str) -> bool {
        if reported.is_empty() {
            return false;
        }
        content_hash(reported) == self.content_hash
    }
}

/// Stable digest of a content locator (lowercase hex MD5 of its UTF-8 bytes)
pub fn content_hash(locator: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(locator.as_bytes());
    hex::encode(hasher.finalize())
}
