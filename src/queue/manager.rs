//! Single-slot download scheduler with preemption

use crate::alist::OfflineTasks;
use crate::database::RequestStore;
use crate::models::DownloadRequest;
use crate::monitor::{Monitor, MonitorConfig, OnFinished, StopOutcome, WatchOutcome};
use crate::queue::events::{EventLog, QueueEvent};
use crate::queue::unique::DedupQueue;
use crate::utils::error::{is_transient, RelayError};
use anyhow::Result;
use chrono::Utc;
use futures::FutureExt;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub current: Option<i64>,
    pub suspended: Vec<i64>,
    pub primary: Vec<i64>,
    pub watching: bool,
}

/// Keeps at most one request in flight against the remote service.
///
/// `current` is only read or written while holding `slot`, so the monitor's
/// completion callback and external calls are serialized against each other.
pub struct QueueManager {
    slot: Mutex<Option<DownloadRequest>>,
    primary: DedupQueue<DownloadRequest>,
    suspended: DedupQueue<DownloadRequest>,
    remote: OfflineTasks,
    store: Arc<dyn RequestStore>,
    monitor: Monitor,
    event_log: Arc<EventLog>,
}

impl QueueManager {
    /// Create a scheduler together with the monitor that reports back to it
    pub fn new(
        remote: OfflineTasks,
        store: Arc<dyn RequestStore>,
        monitor_config: MonitorConfig,
        event_log: Arc<EventLog>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|manager: &Weak<QueueManager>| {
            let manager = manager.clone();
            let on_finished: OnFinished = Arc::new(move |outcome: WatchOutcome| {
                let manager = manager.clone();
                async move {
                    if let Some(manager) = manager.upgrade() {
                        manager.on_watch_finished(outcome).await;
                    }
                }
                .boxed()
            });

            let monitor = Monitor::new(
                remote.task_service(),
                Arc::clone(&store),
                monitor_config,
                on_finished,
            );

            Self {
                slot: Mutex::new(None),
                primary: DedupQueue::new(),
                suspended: DedupQueue::new(),
                remote,
                store,
                monitor,
                event_log,
            }
        })
    }

    /// Add every request not already known to the scheduler to the primary queue.
    ///
    /// Returns how many were actually added.
    pub async fn enqueue_batch(&self, requests: Vec<DownloadRequest>) -> usize {
        let slot = self.slot.lock().await;
        let total = requests.len();
        let mut added = 0;

        for request in requests {
            let id = request.id;
            if slot.as_ref().is_some_and(|current| current.id == id)
                || self.suspended.contains(&id).await
            {
                debug!("Request {} is already scheduled", id);
                continue;
            }

            let name = request.name.clone();
            if self.primary.enqueue(request).await {
                added += 1;
                debug!("Queued request {} ({})", id, name);
                self.record(QueueEvent::RequestQueued {
                    request_id: id,
                    name,
                    timestamp: Utc::now(),
                })
                .await;
            }
        }

        info!("Queued {} new requests out of {} offered", added, total);
        added
    }

    /// Release the slot (if held) and start the next request, if any.
    ///
    /// Suspended requests are served before the primary queue.
    pub async fn advance(&self) {
        let mut slot = self.slot.lock().await;
        self.advance_locked(&mut slot).await;
    }

    async fn advance_locked(&self, slot: &mut Option<DownloadRequest>) {
        if let Some(finished) = slot.take() {
            self.monitor.stop().await;
            info!("Released slot held by request {} ({})", finished.id, finished.name);
            self.remote.reset_all().await;
        }

        let next = match self.suspended.try_dequeue().await {
            Ok(request) => {
                info!("Resuming suspended request {} ({})", request.id, request.name);
                Some(request)
            }
            Err(_) => self.primary.try_dequeue().await.ok(),
        };

        let Some(request) = next else {
            info!("No pending requests, scheduler idle");
            return;
        };

        *slot = Some(request.clone());
        if let Err(e) = self.push_to_task(&request).await {
            error!("Failed to push request {} ({}): {}", request.id, request.name, e);
        }
    }

    /// Run `request` right now, ahead of everything queued.
    ///
    /// A different running request is suspended and resumes first on the next
    /// `advance`; the same request is simply pushed again. A running request
    /// whose watch has already ended is released instead of suspended. A push
    /// error is returned to the caller and the slot keeps `request` for a later retry.
    pub async fn preempt(&self, request: DownloadRequest) -> Result<()> {
        let mut slot = self.slot.lock().await;

        // the request may also be waiting in a queue
        self.primary.remove(&request.id).await;
        self.suspended.remove(&request.id).await;

        let stopped = match slot.as_ref() {
            Some(_) => self.monitor.stop().await,
            None => StopOutcome::Idle,
        };

        match slot.take() {
            None => info!("Running request {} ({}) immediately", request.id, request.name),
            Some(current) if current.id == request.id => {
                info!("Retrying request {} ({}) in place", request.id, request.name);
            }
            Some(current) if stopped == StopOutcome::Finishing(current.id) => {
                info!(
                    "Request {} ({}) already finished its watch, releasing it for request {}",
                    current.id, current.name, request.id
                );
            }
            Some(current) => {
                info!(
                    "Suspending request {} ({}) for request {} ({})",
                    current.id, current.name, request.id, request.name
                );
                let current_id = current.id;
                self.suspended.push_front(current).await;
                self.record(QueueEvent::RequestSuspended {
                    request_id: current_id,
                    preempted_by: request.id,
                    timestamp: Utc::now(),
                })
                .await;
            }
        }

        *slot = Some(request.clone());
        self.push_to_task(&request).await
    }

    /// Push the slot's request again if it holds one that is not being watched.
    ///
    /// This is the state a failed push leaves behind. A transient failure keeps
    /// the slot for the next pass; any other failure releases it and advances.
    pub async fn recover_stalled(&self) {
        let mut slot = self.slot.lock().await;
        let Some(request) = slot.clone() else {
            return;
        };
        if self.monitor.is_active().await {
            return;
        }

        warn!(
            "Request {} ({}) holds the slot without a watch, pushing it again",
            request.id, request.name
        );
        match self.push_to_task(&request).await {
            Ok(()) => {}
            Err(e) if is_transient(&e) => {
                warn!("Push of request {} failed again, keeping it: {}", request.id, e);
            }
            Err(e) => {
                error!("Giving up on request {} ({}): {}", request.id, request.name, e);
                self.advance_locked(&mut slot).await;
            }
        }
    }

    /// Resolve the save path, reset the remote task lists, submit, and start watching
    async fn push_to_task(&self, request: &DownloadRequest) -> Result<()> {
        match self.try_push(request).await {
            Ok(save_path) => {
                self.record(QueueEvent::RequestPushed {
                    request_id: request.id,
                    save_path,
                    timestamp: Utc::now(),
                })
                .await;
                Ok(())
            }
            Err(e) => {
                self.record(QueueEvent::PushFailed {
                    request_id: request.id,
                    error: e.to_string(),
                    timestamp: Utc::now(),
                })
                .await;
                Err(e)
            }
        }
    }

    async fn try_push(&self, request: &DownloadRequest) -> Result<String> {
        let feed_name = self
            .store
            .feed_name(request.feed_id)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("feed {}", request.feed_id)))?;

        let save_path = self.remote.resolve_save_path(&feed_name).await?;
        self.remote
            .submit(&save_path, &request.content_locator)
            .await?;
        info!("Pushed request {} ({}) to {}", request.id, request.name, save_path);

        self.monitor.start(request.clone()).await;
        Ok(save_path)
    }

    /// Completion callback from the monitor
    async fn on_watch_finished(&self, outcome: WatchOutcome) {
        let mut slot = self.slot.lock().await;

        let request_id = outcome.request_id();
        if slot.as_ref().map(|current| current.id) != Some(request_id) {
            warn!("Ignoring stale watch result for request {}", request_id);
            return;
        }

        let event = match outcome {
            WatchOutcome::Completed(_) => QueueEvent::RequestCompleted {
                request_id,
                timestamp: Utc::now(),
            },
            WatchOutcome::TimedOut(_) => QueueEvent::WatchTimedOut {
                request_id,
                timestamp: Utc::now(),
            },
        };
        self.record(event).await;

        self.advance_locked(&mut slot).await;
    }

    async fn record(&self, event: QueueEvent) {
        if let Err(e) = self.event_log.log(event).await {
            warn!("Failed to write event log: {}", e);
        }
    }

    /// The request holding the slot, if any
    pub async fn current(&self) -> Option<DownloadRequest> {
        self.slot.lock().await.clone()
    }

    pub async fn is_idle(&self) -> bool {
        self.slot.lock().await.is_none()
    }

    pub async fn snapshot(&self) -> SchedulerSnapshot {
        let slot = self.slot.lock().await;
        SchedulerSnapshot {
            current: slot.as_ref().map(|r| r.id),
            suspended: self.suspended.ids().await,
            primary: self.primary.ids().await,
            watching: self.monitor.is_watching().await,
        }
    }

    /// Stop watching without touching the slot; used on shutdown
    pub async fn shutdown(&self) {
        self.monitor.stop().await;
    }
}
