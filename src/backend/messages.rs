use crate::queue::SchedulerSnapshot;
use tokio::sync::oneshot;

/// Commands accepted by the relay actor
#[derive(Debug)]
pub enum RelayCommand {
    /// Load pending requests now instead of waiting for the next tick
    Scan,
    /// Run a request ahead of the queue (retry)
    Retry(i64),
    /// Report the scheduler state
    Snapshot(oneshot::Sender<SchedulerSnapshot>),
    // System
    Shutdown,
}
