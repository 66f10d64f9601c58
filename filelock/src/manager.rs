use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cortex_core::{
    models::{AccessType, FileLockRecord},
    repository::FileLockStore,
};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::FileLockError;

/// Delay between acquisition attempts
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Default registry entry age before the expiry sweep reclaims it
pub const DEFAULT_SWEEP_AGE_HOURS: i64 = 24;

/// One holder of a path in the in-process registry.
///
/// Holders are kept as a multiset per canonical path: two concurrent read
/// holders are two entries, and releasing one leaves the other intact.
#[derive(Debug, Clone)]
pub struct LockHolder {
    pub access_type: AccessType,
    pub client_id: Option<String>,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Default)]
struct Registry {
    holders: HashMap<PathBuf, Vec<LockHolder>>,
}

impl Registry {
    fn can_acquire(&self, path: &Path, requested: AccessType) -> bool {
        match self.holders.get(path) {
            None => true,
            Some(holders) => holders
                .iter()
                .all(|holder| holder.access_type.is_compatible_with(requested)),
        }
    }

    fn register(&mut self, path: &Path, access_type: AccessType, client_id: Option<&str>) {
        self.holders.entry(path.to_path_buf()).or_default().push(LockHolder {
            access_type,
            client_id: client_id.map(|c| c.to_string()),
            acquired_at: Utc::now(),
        });
    }

    fn unregister(&mut self, path: &Path, access_type: AccessType, client_id: Option<&str>) {
        if let Some(holders) = self.holders.get_mut(path) {
            if let Some(index) = holders.iter().position(|holder| {
                holder.access_type == access_type && holder.client_id.as_deref() == client_id
            }) {
                holders.remove(index);
            }
            if holders.is_empty() {
                self.holders.remove(path);
            }
        }
    }
}

/// Two-layer file access coordination for concurrent workers.
///
/// The in-process registry short-circuits conflicts inside one process; the
/// OS advisory lock (shared for `read`, exclusive for `write`/`exclusive`)
/// coordinates across processes on the same host. When a [`FileLockStore`]
/// is attached, every acquisition is additionally mirrored into the
/// database so external observers can see live locks, and a database-side
/// conflict is treated like an unavailable lock.
pub struct FileAccessManager {
    registry: Mutex<Registry>,
    store: Option<Arc<dyn FileLockStore>>,
}

impl FileAccessManager {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            store: None,
        }
    }

    /// Attach a database-side record store.
    pub fn with_store(store: Arc<dyn FileLockStore>) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            store: Some(store),
        }
    }

    /// Acquire a lock on `path` with the requested access type.
    ///
    /// Loops until `timeout`: when the registry allows, the file is opened
    /// (append-plus-read for mutating types, read-only otherwise) and the
    /// OS lock attempted; transient failures back off and retry. Release is
    /// automatic when the returned guard drops.
    ///
    /// # Errors
    /// * [`FileLockError::Timeout`] - the lock was not acquired in time
    /// * [`FileLockError::Lock`] - genuine OS-level lock failure
    pub async fn acquire(
        self: &Arc<Self>,
        path: impl AsRef<Path>,
        access_type: AccessType,
        timeout: Duration,
        client_id: Option<&str>,
    ) -> Result<FileLockGuard, FileLockError> {
        let path = canonicalize_for_lock(path.as_ref())?;
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(file) = self.try_acquire_once(&path, access_type, client_id).await? {
                tracing::debug!(
                    path = %path.display(),
                    access_type = %access_type,
                    client_id = client_id.unwrap_or("-"),
                    "File lock acquired"
                );
                return Ok(FileLockGuard {
                    file: Some(file),
                    path,
                    access_type,
                    client_id: client_id.map(|c| c.to_string()),
                    manager: Arc::clone(self),
                });
            }

            if Instant::now() + RETRY_BACKOFF > deadline {
                return Err(FileLockError::Timeout {
                    path,
                    access_type,
                    timeout,
                });
            }
            tokio::time::sleep(RETRY_BACKOFF).await;
        }
    }

    /// One acquisition attempt across all three layers.
    /// Returns `Ok(None)` when the lock is currently unavailable.
    async fn try_acquire_once(
        &self,
        path: &Path,
        access_type: AccessType,
        client_id: Option<&str>,
    ) -> Result<Option<File>, FileLockError> {
        // Registry check, file open, and OS lock happen under the registry
        // mutex so a concurrent in-process acquirer cannot slip between the
        // check and the registration.
        let file = {
            let mut registry = self.registry.lock();
            if !registry.can_acquire(path, access_type) {
                return Ok(None);
            }

            let file = match open_for_access(path, access_type) {
                Ok(file) => file,
                Err(_) => return Ok(None),
            };

            let locked = match access_type {
                AccessType::Read => fs2::FileExt::try_lock_shared(&file),
                AccessType::Write | AccessType::Exclusive => {
                    fs2::FileExt::try_lock_exclusive(&file)
                }
            };
            match locked {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
                Err(err) => {
                    return Err(FileLockError::Lock {
                        path: path.to_path_buf(),
                        message: err.to_string(),
                    })
                }
            }

            registry.register(path, access_type, client_id);
            file
        };

        // Mirror into the database record table. A conflict there means a
        // sibling process holds the path; back out and retry.
        if let Some(store) = &self.store {
            let record = FileLockRecord {
                file_path: path.display().to_string(),
                client_id: client_id.unwrap_or("unknown").to_string(),
                task_step_id: None,
                workflow_id: None,
                access_type,
                locked_at: Utc::now(),
                expires_at: Some(Utc::now() + chrono::Duration::hours(DEFAULT_SWEEP_AGE_HOURS)),
                is_active: true,
            };
            match store.acquire_file_lock(&record).await {
                Ok(true) => {}
                Ok(false) => {
                    let _ = fs2::FileExt::unlock(&file);
                    self.registry.lock().unregister(path, access_type, client_id);
                    return Ok(None);
                }
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        %error,
                        "Failed to record file lock; continuing with host-level lock only"
                    );
                }
            }
        }

        Ok(Some(file))
    }

    /// Snapshot of the currently registered holders.
    pub fn active_locks(&self) -> HashMap<PathBuf, Vec<LockHolder>> {
        self.registry.lock().holders.clone()
    }

    /// Whether any holder is registered for the path.
    pub fn is_locked(&self, path: impl AsRef<Path>) -> bool {
        match canonicalize_for_lock(path.as_ref()) {
            Ok(path) => self.registry.lock().holders.contains_key(&path),
            Err(_) => false,
        }
    }

    /// Remove registry entries older than `max_age`, recovering from
    /// crashed holders that never dropped their guard.
    pub fn sweep_registry(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut registry = self.registry.lock();
        let mut removed = 0;

        registry.holders.retain(|path, holders| {
            let before = holders.len();
            holders.retain(|holder| holder.acquired_at >= cutoff);
            let swept = before - holders.len();
            if swept > 0 {
                tracing::info!(path = %path.display(), swept, "Swept expired registry holders");
                removed += swept;
            }
            !holders.is_empty()
        });

        removed
    }

    fn release(&self, path: &Path, access_type: AccessType, client_id: Option<&str>) {
        self.registry.lock().unregister(path, access_type, client_id);

        if let Some(store) = &self.store {
            let store = Arc::clone(store);
            let file_path = path.display().to_string();
            let client = client_id.unwrap_or("unknown").to_string();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(error) = store
                        .release_file_lock(&file_path, &client, Some(access_type))
                        .await
                    {
                        tracing::warn!(%file_path, %error, "Failed to release file lock record");
                    }
                });
            }
        }
    }
}

impl Default for FileAccessManager {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII handle for an acquired lock. Dropping it releases the OS lock, the
/// registry entry, and (when attached) the database record.
pub struct FileLockGuard {
    file: Option<File>,
    path: PathBuf,
    access_type: AccessType,
    client_id: Option<String>,
    manager: Arc<FileAccessManager>,
}

impl FileLockGuard {
    /// The locked file handle.
    pub fn file(&self) -> &File {
        self.file.as_ref().expect("file present until drop")
    }

    /// Mutable access to the locked file handle, for writes.
    pub fn file_mut(&mut self) -> &mut File {
        self.file.as_mut().expect("file present until drop")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn access_type(&self) -> AccessType {
        self.access_type
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = fs2::FileExt::unlock(&file);
        }
        self.manager
            .release(&self.path, self.access_type, self.client_id.as_deref());
    }
}

/// Resolve to an absolute path with symlinks resolved, creating the parent
/// directory when needed so locks can target files that do not exist yet.
fn canonicalize_for_lock(path: &Path) -> Result<PathBuf, FileLockError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|source| FileLockError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .join(path)
    };

    let parent = absolute.parent().unwrap_or(Path::new("/"));
    std::fs::create_dir_all(parent).map_err(|source| FileLockError::Io {
        path: absolute.clone(),
        source,
    })?;

    let parent = parent.canonicalize().map_err(|source| FileLockError::Io {
        path: absolute.clone(),
        source,
    })?;

    match absolute.file_name() {
        Some(name) => Ok(parent.join(name)),
        None => Ok(parent),
    }
}

/// Open mode derived from the access type: append-plus-read for mutating
/// types (never truncating a file before the lock is held), read-only for
/// `read`.
fn open_for_access(path: &Path, access_type: AccessType) -> std::io::Result<File> {
    match access_type {
        AccessType::Read => OpenOptions::new().read(true).open(path),
        AccessType::Write | AccessType::Exclusive => OpenOptions::new()
            .append(true)
            .read(true)
            .create(true)
            .open(path),
    }
}
