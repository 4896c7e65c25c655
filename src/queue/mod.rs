pub mod events;
pub mod manager;
pub mod unique;

pub use events::{EventLog, QueueEvent};
pub use manager::{QueueManager, SchedulerSnapshot};
pub use unique::{DedupQueue, QueueItem};
