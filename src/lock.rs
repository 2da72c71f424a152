/// Lock Marker Module
///
/// A file at a fixed path signals that a processing run is in flight. The file
/// is created exclusively, so two invocations racing for it cannot both win.

use chrono::Utc;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Held lock marker. Removing the file is done through [`LockMarker::release`];
/// a marker dropped without release is removed on drop.
#[derive(Debug)]
pub struct LockMarker {
    path: PathBuf,
    released: bool,
}

impl LockMarker {
    /// Whether a marker currently exists at `path`
    pub fn is_held(path: &Path) -> bool {
        path.exists()
    }

    /// Remove a marker last modified more than `max_age` ago.
    ///
    /// A run that was killed before it could release its marker leaves the
    /// file behind; once it is older than any run can last it is stale.
    /// Returns whether a stale marker was removed.
    pub fn clear_if_stale(path: &Path, max_age: Duration) -> std::io::Result<bool> {
        let modified = match std::fs::metadata(path) {
            Ok(metadata) => metadata.modified()?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age <= max_age {
            return Ok(false);
        }

        log::warn!(
            "Removing stale lock marker {} ({}s old, limit {}s)",
            path.display(),
            age.as_secs(),
            max_age.as_secs()
        );
        remove_if_exists(path)?;
        Ok(true)
    }

    /// Create the marker at `path`, writing the current time into it.
    ///
    /// Returns `Ok(None)` if another run already holds the marker.
    pub fn acquire(path: &Path) -> std::io::Result<Option<Self>> {
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(e),
        };

        let marker = Self {
            path: path.to_path_buf(),
            released: false,
        };

        // The marker is already in place; a failed write only loses the timestamp
        if let Err(e) = file.write_all(Utc::now().to_rfc3339().as_bytes()) {
            log::warn!("Could not write timestamp to lock marker {}: {}", path.display(), e);
        }

        log::debug!("Acquired lock marker {}", path.display());
        Ok(Some(marker))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the marker. A marker that is already gone counts as released.
    pub fn release(mut self) -> std::io::Result<()> {
        self.released = true;
        remove_if_exists(&self.path)?;
        log::debug!("Released lock marker {}", self.path.display());
        Ok(())
    }
}

impl Drop for LockMarker {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_if_exists(&self.path) {
            log::error!("Failed to remove lock marker {}: {}", self.path.display(), e);
        }
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
