//! File-system backed output locations.
//!
//! Every session gets its own directory under a common root, and every chunk
//! a file inside it:
//!
//! ```text
//! <root>/<session>/<prefix>_<index>.<ext>
//! ```
//!
//! Network surfaces can turn a location into a URL relative to the root with
//! [`FileResourceTracker::audio_url`].

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::errors::ResourceError;
use crate::traits::ResourceTracker;
use crate::types::{AudioFormat, OutputLocation, SessionId};

/// File name prefix used when none is configured.
pub const DEFAULT_FILE_PREFIX: &str = "chunk";

#[derive(Debug, Default)]
struct Bookkeeping {
    slots: HashSet<(SessionId, usize)>,
    locations: HashMap<OutputLocation, (SessionId, usize)>,
}

impl Bookkeeping {
    fn forget_session(&mut self, session: &SessionId) -> usize {
        let before = self.locations.len();
        self.locations.retain(|_, (owner, _)| owner != session);
        self.slots.retain(|(owner, _)| owner != session);
        before - self.locations.len()
    }
}

/// [`ResourceTracker`] that writes chunk audio below a root directory.
#[derive(Debug)]
pub struct FileResourceTracker {
    root: PathBuf,
    prefix: String,
    format: AudioFormat,
    state: Mutex<Bookkeeping>,
}

impl FileResourceTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            prefix: DEFAULT_FILE_PREFIX.to_string(),
            format: AudioFormat::default(),
            state: Mutex::new(Bookkeeping::default()),
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Audio format the synthesizer will write; decides the file extension.
    #[must_use]
    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session: &SessionId) -> PathBuf {
        self.root.join(session.as_str())
    }

    /// Number of locations currently tracked across all sessions.
    pub fn tracked(&self) -> usize {
        self.lock().locations.len()
    }

    /// Map a location to `{base_url}/{path relative to root}`.
    ///
    /// Returns `None` for locations outside the root.
    ///
    /// ## Examples
    ///
    /// ```
    /// use speak_stream::{FileResourceTracker, OutputLocation};
    ///
    /// let tracker = FileResourceTracker::new("/srv/audio");
    /// let location = OutputLocation::new("/srv/audio/session_1/chunk_0.wav");
    /// assert_eq!(
    ///     tracker.audio_url(&location, "/audio/").as_deref(),
    ///     Some("/audio/session_1/chunk_0.wav")
    /// );
    /// ```
    pub fn audio_url(&self, location: &OutputLocation, base_url: &str) -> Option<String> {
        let relative = location.path().strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(format!("{}/{}", base_url.trim_end_matches('/'), parts.join("/")))
    }

    /// Remove session directories last modified more than `age` ago.
    ///
    /// A missing root is not an error. Returns the number of directories removed.
    ///
    /// ## Errors
    ///
    /// Returns [`ResourceError::Scan`] if the root cannot be listed and
    /// [`ResourceError::Remove`] if a stale directory cannot be deleted.
    pub fn cleanup_older_than(&self, age: Duration) -> Result<usize, ResourceError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(ResourceError::Scan {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|source| ResourceError::Scan {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_dir() {
                continue;
            }
            let stale = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|elapsed| elapsed > age);
            if !stale {
                continue;
            }

            fs::remove_dir_all(&path).map_err(|source| ResourceError::Remove {
                path: path.clone(),
                source,
            })?;
            if let Some(name) = path.file_name() {
                self.lock()
                    .forget_session(&SessionId::new(name.to_string_lossy()));
            }
            debug!(path = %path.display(), "Removed stale session directory");
            removed += 1;
        }

        if removed > 0 {
            info!(root = %self.root.display(), removed, "Purged stale sessions");
        }
        Ok(removed)
    }

    fn lock(&self) -> MutexGuard<'_, Bookkeeping> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResourceTracker for FileResourceTracker {
    fn allocate(&self, session: &SessionId, index: usize) -> Result<OutputLocation, ResourceError> {
        let dir = self.session_dir(session);
        let location = OutputLocation::new(dir.join(format!(
            "{}_{}.{}",
            self.prefix,
            index,
            self.format.extension()
        )));

        {
            let mut state = self.lock();
            if !state.slots.insert((session.clone(), index)) {
                return Err(ResourceError::AlreadyAllocated {
                    session: session.to_string(),
                    index,
                });
            }
            state
                .locations
                .insert(location.clone(), (session.clone(), index));
        }

        if let Err(source) = fs::create_dir_all(&dir) {
            let mut state = self.lock();
            state.slots.remove(&(session.clone(), index));
            state.locations.remove(&location);
            return Err(ResourceError::CreateDir { path: dir, source });
        }
        Ok(location)
    }

    fn release(&self, location: &OutputLocation) {
        {
            let mut state = self.lock();
            if let Some(slot) = state.locations.remove(location) {
                state.slots.remove(&slot);
            }
        }

        match fs::remove_file(location.path()) {
            Ok(()) => debug!(location = %location, "Released output location"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(location = %location, error = %e, "Failed to remove released audio"),
        }
    }

    fn cleanup_session(&self, session: &SessionId) -> Result<usize, ResourceError> {
        let forgotten = self.lock().forget_session(session);
        let dir = self.session_dir(session);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(ResourceError::Remove { path: dir, source }),
        }
        debug!(session = %session, forgotten, "Cleaned up session");
        Ok(forgotten)
    }
}

// ============================================================================
// Tests
// ============================================================================
