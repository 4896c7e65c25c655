//! Utility modules for error handling, configuration and local paths

pub mod config;
pub mod error;
pub mod paths;

// Re-export for convenience
pub use config::AppSettings;
pub use error::{is_transient, RelayError};
pub use paths::{ensure_dir, get_data_dir, get_database_path, sqlite_url};
