pub mod client;
pub mod service;
pub mod task;
pub mod traits;

pub use client::AlistClient;
pub use service::OfflineTasks;
pub use task::{
    DeletePolicy, DownloaderTool, ExecutionState, ExternalTask, OfflineDownload, TaskKind,
    TaskStatus,
};
pub use traits::{DirectoryService, TaskService};
