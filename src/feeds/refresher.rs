use super::parser::parse_channel;
use crate::database::{DatabaseManager, NewRequest};
use crate::models::Feed;
use crate::utils::error::RelayError;
use anyhow::{Context, Result};
use reqwest::{Client, Proxy};
use std::time::Duration;
use tracing::{error, info, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches subscribed feeds and stores the requests they announce
pub struct FeedRefresher {
    http: Client,
    /// Same client routed through the configured proxy, for a second attempt
    proxied: Option<Client>,
    db: DatabaseManager,
    blocked_words: Vec<String>,
}

impl FeedRefresher {
    pub fn new(db: DatabaseManager, blocked_words: Vec<String>, proxy: Option<&str>) -> Result<Self> {
        let http = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(RelayError::from)?;

        let proxied = match proxy {
            Some(url) => Some(
                Client::builder()
                    .timeout(FETCH_TIMEOUT)
                    .proxy(Proxy::all(url).with_context(|| format!("Invalid feed proxy {}", url))?)
                    .build()
                    .map_err(RelayError::from)?,
            ),
            None => None,
        };

        Ok(Self {
            http,
            proxied,
            db,
            blocked_words,
        })
    }

    /// Refresh every feed flagged for updates. Returns how many new requests were stored.
    ///
    /// A failing feed is logged and skipped.
    pub async fn refresh_all(&self) -> usize {
        let feeds = match self.db.list_feeds().await {
            Ok(feeds) => feeds,
            Err(e) => {
                error!("Failed to load feeds: {}", e);
                return 0;
            }
        };

        let mut total = 0;
        for feed in feeds.iter().filter(|feed| feed.should_update) {
            match self.refresh(feed).await {
                Ok(added) => total += added,
                Err(e) => error!("Failed to refresh feed {} ({}): {}", feed.id, feed.name, e),
            }
        }

        info!("Feed refresh stored {} new requests", total);
        total
    }

    /// Refresh one feed by id, whether or not it is flagged for updates
    pub async fn refresh_feed(&self, feed_id: i64) -> Result<usize> {
        let feed = self
            .db
            .get_feed(feed_id)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("feed {}", feed_id)))?;
        self.refresh(&feed).await
    }

    async fn refresh(&self, feed: &Feed) -> Result<usize> {
        let requests = self.fetch_requests(feed).await?;
        let added = self.db.save_requests(&requests).await?;
        self.db.touch_feed(feed.id).await?;

        info!(
            "Feed {} ({}): {} items, {} new",
            feed.id,
            feed.name,
            requests.len(),
            added
        );
        Ok(added)
    }

    /// Fetch and parse a feed, trying once more through the proxy on failure
    pub async fn fetch_requests(&self, feed: &Feed) -> Result<Vec<NewRequest>> {
        match self.fetch_with(&self.http, feed).await {
            Ok(requests) => Ok(requests),
            Err(e) => match &self.proxied {
                Some(proxied) => {
                    warn!("Fetching feed {} failed ({}), retrying through proxy", feed.url, e);
                    self.fetch_with(proxied, feed).await
                }
                None => Err(e),
            },
        }
    }

    async fn fetch_with(&self, client: &Client, feed: &Feed) -> Result<Vec<NewRequest>> {
        let body = client
            .get(&feed.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(RelayError::from)?
            .bytes()
            .await
            .map_err(RelayError::from)?;

        parse_channel(&body, feed.id, &self.blocked_words)
    }
}
