use super::messages::RelayCommand;
use crate::database::RequestStore;
use crate::feeds::FeedRefresher;
use crate::queue::QueueManager;
use crate::utils::error::RelayError;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

const DEFAULT_CONTROL_INTERVAL: Duration = Duration::from_secs(5);

/// Periodic trigger around the scheduler.
///
/// Every scan interval (and on `RelayCommand::Scan`) feeds are refreshed,
/// pending requests are loaded from the store and handed to the scheduler,
/// which is kicked if idle or re-pushed if its slot stalled. Every control
/// interval, retries requested through the store are run.
pub struct RelayActor {
    receiver: mpsc::Receiver<RelayCommand>,
    queue_manager: Arc<QueueManager>,
    store: Arc<dyn RequestStore>,
    feeds: Option<FeedRefresher>,
    scan_interval: Duration,
    control_interval: Duration,
}

impl RelayActor {
    pub fn new(
        receiver: mpsc::Receiver<RelayCommand>,
        queue_manager: Arc<QueueManager>,
        store: Arc<dyn RequestStore>,
        scan_interval: Duration,
    ) -> Self {
        Self {
            receiver,
            queue_manager,
            store,
            feeds: None,
            scan_interval,
            control_interval: DEFAULT_CONTROL_INTERVAL,
        }
    }

    /// Refresh subscribed feeds before every scan
    pub fn with_feed_refresher(mut self, feeds: FeedRefresher) -> Self {
        self.feeds = Some(feeds);
        self
    }

    pub fn with_control_interval(mut self, control_interval: Duration) -> Self {
        self.control_interval = control_interval;
        self
    }

    pub async fn run(mut self) {
        info!("RelayActor started, scanning every {:?}", self.scan_interval);

        let mut ticker = tokio::time::interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut control = tokio::time::interval(self.control_interval);
        control.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.handle_scan().await;
                }
                _ = control.tick() => {
                    self.handle_requested_retries().await;
                }
                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(RelayCommand::Scan) => self.handle_scan().await,
                        Some(RelayCommand::Retry(id)) => {
                            if let Err(e) = self.handle_retry(id).await {
                                error!("Retry of request {} failed: {}", id, e);
                            }
                        }
                        Some(RelayCommand::Snapshot(reply)) => {
                            let _ = reply.send(self.queue_manager.snapshot().await);
                        }
                        Some(RelayCommand::Shutdown) | None => {
                            info!("RelayActor shutting down");
                            break;
                        }
                    }
                }
            }
        }

        self.queue_manager.shutdown().await;
    }

    async fn handle_scan(&self) {
        if let Some(feeds) = &self.feeds {
            feeds.refresh_all().await;
        }

        let pending = match self.store.pending_requests().await {
            Ok(pending) => pending,
            Err(e) => {
                error!("Failed to load pending requests: {}", e);
                return;
            }
        };

        self.queue_manager.enqueue_batch(pending).await;

        if self.queue_manager.is_idle().await {
            self.queue_manager.advance().await;
        } else {
            self.queue_manager.recover_stalled().await;
        }
    }

    async fn handle_requested_retries(&self) {
        let ids = match self.store.take_retry_requests().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Failed to read requested retries: {}", e);
                return;
            }
        };

        for id in ids {
            info!("Running requested retry of request {}", id);
            if let Err(e) = self.handle_retry(id).await {
                error!("Retry of request {} failed: {}", id, e);
            }
        }
    }

    async fn handle_retry(&self, id: i64) -> Result<()> {
        let request = self
            .store
            .get_request(id)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("request {}", id)))?;

        if request.completed {
            warn!("Retrying request {} which is already marked completed", id);
        }
        self.queue_manager.preempt(request).await
    }
}
