//! Session snapshot persistence
//!
//! Persists the last authoritative user record so a restart can show
//! a provisional session before the network answers. The snapshot is
//! a cache: any failure to read it degrades to "no snapshot" and the
//! authoritative fetch proceeds as usual.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use atrium_core::{AtriumError, AtriumResult, ErrorContext, User};
use tracing::{debug, warn};

const SNAPSHOT_FILE: &str = "session.json";

pub struct SnapshotStorage {
    path: PathBuf,
}

impl SnapshotStorage {
    /// Prepare snapshot storage under `dir`, creating the directory if
    /// needed.
    pub fn new(dir: impl AsRef<Path>) -> AtriumResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| AtriumError::Storage {
            message: format!("Failed to create snapshot directory: {}", dir.display()),
            source: Some(Box::new(e)),
            context: ErrorContext::new("storage")
                .with_operation("create_snapshot_dir")
                .with_suggestion("Check permissions on the data directory")
                .with_suggestion("Point session.snapshot_dir at a writable location"),
        })?;

        Ok(Self {
            path: dir.join(SNAPSHOT_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, user: &User) -> AtriumResult<()> {
        let encoded = serde_json::to_string_pretty(user)?;
        fs::write(&self.path, encoded)?;
        debug!(path = %self.path.display(), "session snapshot written");
        Ok(())
    }

    /// Read the stored snapshot. A missing file is the normal first-run
    /// case; unreadable or unparseable snapshots are logged and treated
    /// as absent.
    pub fn load(&self) -> Option<User> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), "failed to read session snapshot: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(path = %self.path.display(), "discarding malformed session snapshot: {}", e);
                None
            }
        }
    }

    pub fn clear(&self) -> AtriumResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
