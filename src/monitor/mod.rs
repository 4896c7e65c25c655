//! Completion watchdog for the request currently occupying the remote slot
//!
//! The remote service offers no push notifications, so completion is
//! discovered by polling its finished task lists. The monitor never touches
//! scheduler state: it reports a [`WatchOutcome`] through the callback it was
//! constructed with and goes back to idle.

mod correlation;

pub use correlation::check_completion;

use crate::alist::TaskService;
use crate::database::RequestStore;
use crate::models::DownloadRequest;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Callback invoked once per finished watch
pub type OnFinished = Arc<dyn Fn(WatchOutcome) -> BoxFuture<'static, ()> + Send + Sync>;

/// How a watch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Download and transfer both succeeded; the request was marked completed
    Completed(i64),
    /// No success within the timeout; the request was left pending
    TimedOut(i64),
}

impl WatchOutcome {
    pub fn request_id(&self) -> i64 {
        match self {
            WatchOutcome::Completed(id) | WatchOutcome::TimedOut(id) => *id,
        }
    }
}

/// Poll timing
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(90 * 60),
        }
    }
}

/// What `Monitor::stop` found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was being watched
    Idle,
    /// A live watch on this request was cancelled
    Cancelled(i64),
    /// The watch on this request already ended and its outcome is being delivered
    Finishing(i64),
}

/// Observable monitor state
#[derive(Debug, Clone, PartialEq)]
pub enum WatchState {
    Idle,
    Watching { request_id: i64, elapsed: Duration },
}

struct ActiveWatch {
    request_id: i64,
    started_at: Instant,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

struct Shared {
    tasks: Arc<dyn TaskService>,
    store: Arc<dyn RequestStore>,
    config: MonitorConfig,
    on_finished: OnFinished,
    state: Mutex<MonitorState>,
}

#[derive(Default)]
struct MonitorState {
    next_generation: u64,
    watch: Option<ActiveWatch>,
    /// Request whose outcome callback has not returned yet
    finishing: Option<i64>,
}

impl Shared {
    async fn is_current(&self, generation: u64) -> bool {
        let state = self.state.lock().await;
        matches!(&state.watch, Some(w) if w.generation == generation)
    }

    /// Go idle if `generation` is still the active watch, marking its request as finishing.
    ///
    /// The join handle is dropped, not aborted: this runs on the watch task itself.
    async fn finish(&self, generation: u64) -> bool {
        let mut state = self.state.lock().await;
        match &state.watch {
            Some(w) if w.generation == generation => {}
            _ => return false,
        }
        state.finishing = state.watch.take().map(|w| w.request_id);
        true
    }

    /// Deliver `outcome` and clear the finishing mark
    async fn report(&self, outcome: WatchOutcome) {
        (self.on_finished)(outcome).await;

        let mut state = self.state.lock().await;
        if state.finishing == Some(outcome.request_id()) {
            state.finishing = None;
        }
    }
}

/// Polling watchdog. At most one request is watched at a time.
pub struct Monitor {
    shared: Arc<Shared>,
}

impl Monitor {
    pub fn new(
        tasks: Arc<dyn TaskService>,
        store: Arc<dyn RequestStore>,
        config: MonitorConfig,
        on_finished: OnFinished,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                tasks,
                store,
                config,
                on_finished,
                state: Mutex::new(MonitorState::default()),
            }),
        }
    }

    /// Start watching `request`, replacing any watch in progress
    pub async fn start(&self, request: DownloadRequest) {
        let mut state = self.shared.state.lock().await;

        if let Some(previous) = state.watch.take() {
            warn!(
                "Replacing watch on request {} with request {}",
                previous.request_id, request.id
            );
            if let Some(handle) = previous.handle {
                handle.abort();
            }
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        let started_at = Instant::now();
        info!("Watching request {} ({})", request.id, request.name);

        let handle = tokio::spawn(watch_loop(
            Arc::clone(&self.shared),
            request.clone(),
            generation,
            started_at,
        ));

        state.watch = Some(ActiveWatch {
            request_id: request.id,
            started_at,
            generation,
            handle: Some(handle),
        });
    }

    /// Go idle without reporting anything.
    ///
    /// A watch that already ended is reported as `Finishing`: its outcome
    /// callback is still on its way and cannot be cancelled.
    pub async fn stop(&self) -> StopOutcome {
        let mut state = self.shared.state.lock().await;
        match state.watch.take() {
            Some(watch) => {
                info!("Stopped watching request {}", watch.request_id);
                if let Some(handle) = watch.handle {
                    handle.abort();
                }
                StopOutcome::Cancelled(watch.request_id)
            }
            None => match state.finishing {
                Some(request_id) => StopOutcome::Finishing(request_id),
                None => StopOutcome::Idle,
            },
        }
    }

    pub async fn state(&self) -> WatchState {
        let state = self.shared.state.lock().await;
        match &state.watch {
            Some(w) => WatchState::Watching {
                request_id: w.request_id,
                elapsed: w.started_at.elapsed(),
            },
            None => WatchState::Idle,
        }
    }

    pub async fn is_watching(&self) -> bool {
        self.shared.state.lock().await.watch.is_some()
    }

    /// Watching, or still delivering the outcome of a finished watch
    pub async fn is_active(&self) -> bool {
        let state = self.shared.state.lock().await;
        state.watch.is_some() || state.finishing.is_some()
    }
}

async fn watch_loop(shared: Arc<Shared>, request: DownloadRequest, generation: u64, started_at: Instant) {
    let MonitorConfig {
        poll_interval,
        timeout,
    } = shared.config;

    loop {
        tokio::time::sleep(poll_interval).await;

        if !shared.is_current(generation).await {
            debug!("Watch {} on request {} superseded", generation, request.id);
            return;
        }

        match check_completion(shared.tasks.as_ref(), &request).await {
            Ok(true) => {
                if !shared.finish(generation).await {
                    return;
                }
                info!("Request {} ({}) downloaded and transferred", request.id, request.name);
                if let Err(e) = shared.store.mark_completed(request.id).await {
                    error!("Failed to mark request {} completed: {}", request.id, e);
                }
                shared.report(WatchOutcome::Completed(request.id)).await;
                return;
            }
            Ok(false) => {}
            Err(e) => warn!("Failed to check remote tasks for request {}: {}", request.id, e),
        }

        if started_at.elapsed() > timeout {
            if !shared.finish(generation).await {
                return;
            }
            warn!(
                "Request {} ({}) not finished after {:?}, releasing it",
                request.id, request.name, timeout
            );
            shared.report(WatchOutcome::TimedOut(request.id)).await;
            return;
        }
    }
}
