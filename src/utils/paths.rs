//! Local data directory resolution
//!
//! All local state (SQLite database, scheduler event log) lives in one
//! per-user data directory, resolved through `dirs` so the daemon never
//! depends on the working directory it was started from:
//! - Linux: `$XDG_DATA_HOME/magnet-relay/` (usually `~/.local/share/magnet-relay/`)
//! - macOS: `~/Library/Application Support/magnet-relay/`
//! - Windows: `%APPDATA%\magnet-relay\`

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const APP_DIR: &str = "magnet-relay";

/// Get the data directory for magnet-relay. Does not create it.
pub fn get_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .or_else(|| dirs::home_dir().map(|home| home.join(format!(".{}", APP_DIR))))
        .unwrap_or_else(|| {
            warn!("Could not determine a data directory, using /tmp");
            PathBuf::from("/tmp").join(APP_DIR)
        })
}

/// Get the default database path: `<data dir>/relay.db`
pub fn get_database_path() -> PathBuf {
    get_data_dir().join("relay.db")
}

/// Create `dir` (and parents) if missing
pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    debug!("Data directory ready: {:?}", dir);
    Ok(())
}

/// SQLite connection URL for a database file
pub fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}
