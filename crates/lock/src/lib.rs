#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Inter-process directory locks: one `sync.ffs_lock` file per
//! participating base folder. The file starts with a 16-byte UUID; while
//! the lock is held, the owner appends one heartbeat byte every emit
//! interval. Waiters poll the file size; when it stops growing past the
//! abandoned threshold, the lock is reclaimed behind a recursive
//! `Del.`-prefixed deletion lock, re-verifying UUID and size first to rule
//! out replacement or a belated heartbeat.
//!
//! # Design
//!
//! - [`DirLock`] is a cheap clone sharing ownership of one physical lock.
//! - [`LockRegistry`] deduplicates logical lock requests *by UUID*, not by
//!   path: the same physical lock file may be reachable through distinct
//!   paths. It holds weak handles, so dropping the last [`DirLock`]
//!   releases the file.
//! - The heartbeat runs on a dedicated thread using a channel
//!   `recv_timeout` as interruptible sleep; dropping the lock wakes and
//!   joins it.
//! - Lock acquisition failures surface as [`FileError`]; callers treat
//!   them as warnings, not fatal errors.

use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use vfs::ops::item_type_if_exists;
use vfs::{AbstractPath, FileError, FileErrorKind, OutputExpectation};

/// Name of the lock file placed inside each base folder.
pub const LOCK_FILE_NAME: &str = "sync.ffs_lock";

const DELETION_LOCK_PREFIX: &str = "Del.";
const UUID_LEN: usize = 16;

/// Timing knobs of the lock protocol; tests shrink these.
#[derive(Clone, Copy, Debug)]
pub struct LockTimings {
    /// Heartbeat emit interval of the owner.
    pub emit_interval: Duration,
    /// Size-poll interval of a waiter.
    pub poll_interval: Duration,
    /// Silence span after which a lock counts as abandoned.
    pub abandoned_after: Duration,
    /// Callback/UI refresh granularity while waiting.
    pub ui_interval: Duration,
}

impl Default for LockTimings {
    fn default() -> Self {
        Self {
            emit_interval: Duration::from_secs(5),
            poll_interval: Duration::from_secs(6),
            abandoned_after: Duration::from_secs(30),
            ui_interval: Duration::from_millis(100),
        }
    }
}

/// Receives status text and abort polls while a lock is being waited on.
pub trait LockCallback {
    fn update_status(&mut self, message: &str);

    /// Cooperative suspension point; returns the abort error to cancel.
    fn request_ui_refresh(&mut self) -> Result<(), FileError>;
}

/// No-op callback for non-interactive acquisition.
pub struct SilentCallback;

impl LockCallback for SilentCallback {
    fn update_status(&mut self, _message: &str) {}

    fn request_ui_refresh(&mut self) -> Result<(), FileError> {
        Ok(())
    }
}

fn generate_uuid() -> Result<[u8; UUID_LEN], FileError> {
    let mut uuid = [0u8; UUID_LEN];
    getrandom::getrandom(&mut uuid)
        .map_err(|e| FileError::other("Cannot generate lock id.", e.to_string()))?;
    Ok(uuid)
}

fn read_lock_uuid(lock_path: &AbstractPath) -> Result<[u8; UUID_LEN], FileError> {
    let mut input = lock_path.device.open_input(&lock_path.path)?;
    let mut uuid = [0u8; UUID_LEN];
    let mut filled = 0;
    while filled < UUID_LEN {
        let read = input.read(&mut uuid[filled..])?;
        if read == 0 {
            return Err(FileError::other(
                format!("Cannot read lock file \"{}\".", lock_path.display()),
                "truncated lock id",
            ));
        }
        filled += read;
    }
    Ok(uuid)
}

fn lock_file_size(lock_path: &AbstractPath) -> Result<u64, FileError> {
    lock_path.device.open_input(&lock_path.path)?.size()
}

/// Attempts exclusive creation; `Ok(None)` when the file already exists.
fn try_lock(lock_path: &AbstractPath) -> Result<Option<[u8; UUID_LEN]>, FileError> {
    let mut output = match lock_path
        .device
        .open_output(&lock_path.path, OutputExpectation::default())
    {
        Ok(output) => output,
        Err(e) if e.kind() == FileErrorKind::TargetExisting => return Ok(None),
        Err(e) => return Err(e),
    };

    let uuid = generate_uuid()?;
    let write_result = output.write(&uuid).and_then(|()| output.finalize());
    match write_result {
        Ok(_) => Ok(Some(uuid)),
        Err(e) => {
            let _ = lock_path.device.remove_file_plain(&lock_path.path);
            Err(e)
        }
    }
}

fn deletion_lock_path(lock_path: &AbstractPath) -> AbstractPath {
    let name = format!("{DELETION_LOCK_PREFIX}{}", lock_path.path.item_name());
    match lock_path.parent() {
        Some(parent) => parent.join(&name),
        None => AbstractPath::new(
            Arc::clone(&lock_path.device),
            vfs::AfsPath::new(name).expect("single component"),
        ),
    }
}

/// Blocks until the foreign lock disappears, reclaiming it when abandoned.
fn wait_on_lock(
    lock_path: &AbstractPath,
    callback: &mut dyn LockCallback,
    timings: &LockTimings,
    registry: &LockRegistry,
) -> Result<(), FileError> {
    let waiting_msg = format!("Waiting while directory is locked ({})...", lock_path.display());
    callback.update_status(&waiting_msg);

    let lock_uuid = match read_lock_uuid(lock_path) {
        Ok(uuid) => uuid,
        Err(e) if e.kind() == FileErrorKind::NotExisting => return Ok(()), // what we wait for
        Err(e) => return Err(e),
    };

    let mut last_size = u64::MAX;
    let mut silent_since = Instant::now();

    loop {
        let size = match lock_file_size(lock_path) {
            Ok(size) => size,
            Err(e) if e.kind() == FileErrorKind::NotExisting => return Ok(()),
            Err(e) => return Err(e),
        };
        let now = Instant::now();

        if size != last_size {
            // received a life sign
            last_size = size;
            silent_since = now;
        } else if now.duration_since(silent_since) > timings.abandoned_after {
            let _deletion_guard =
                registry.acquire_with(&deletion_lock_path(lock_path), callback, timings)?;

            // the lock may have been deleted and re-created meanwhile
            match read_lock_uuid(lock_path) {
                Ok(current) if current != lock_uuid => return Ok(()),
                Err(e) if e.kind() == FileErrorKind::NotExisting => return Ok(()),
                Err(e) => return Err(e),
                Ok(_) => {}
            }
            match lock_file_size(lock_path) {
                Ok(current) if current != last_size => continue, // belated life sign
                Err(e) if e.kind() == FileErrorKind::NotExisting => return Ok(()),
                Err(e) => return Err(e),
                Ok(_) => {}
            }

            callback.update_status(&format!(
                "Removing abandoned directory lock ({})...",
                lock_path.display()
            ));
            warn!(lock = %lock_path.display(), "removing abandoned directory lock");
            lock_path.device.remove_file_plain(&lock_path.path)?;
            return Ok(());
        }

        // wait one poll interval, keeping the UI responsive
        let mut waited = Duration::ZERO;
        while waited < timings.poll_interval {
            callback.request_ui_refresh()?;
            std::thread::sleep(timings.ui_interval);
            waited += timings.ui_interval;

            if now.duration_since(silent_since) > timings.emit_interval {
                // one heartbeat missed: likely abandoned, show a countdown
                let remaining = timings
                    .abandoned_after
                    .saturating_sub(Instant::now().duration_since(silent_since));
                callback.update_status(&format!("{waiting_msg} {} sec", remaining.as_secs()));
            } else {
                callback.update_status(&waiting_msg);
            }
        }
    }
}

struct SharedLock {
    lock_path: AbstractPath,
    uuid: [u8; UUID_LEN],
    heartbeat_stop: Option<crossbeam_channel::Sender<()>>,
    heartbeat: Option<std::thread::JoinHandle<()>>,
}

impl SharedLock {
    fn acquire(
        lock_path: &AbstractPath,
        callback: &mut dyn LockCallback,
        timings: &LockTimings,
        registry: &LockRegistry,
    ) -> Result<Self, FileError> {
        let uuid = loop {
            match try_lock(lock_path)? {
                Some(uuid) => break uuid,
                None => wait_on_lock(lock_path, callback, timings, registry)?,
            }
        };
        debug!(lock = %lock_path.display(), "directory lock acquired");

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let device = Arc::clone(&lock_path.device);
        let path = lock_path.path.clone();
        let emit_interval = timings.emit_interval;
        let heartbeat = std::thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(emit_interval) {
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                        // failure to emit is harmless; waiters see it as silence
                        let _ = device.append_to_file(&path, b" ");
                    }
                    Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Ok(Self {
            lock_path: lock_path.clone(),
            uuid,
            heartbeat_stop: Some(stop_tx),
            heartbeat: Some(heartbeat),
        })
    }
}

impl Drop for SharedLock {
    fn drop(&mut self) {
        self.heartbeat_stop.take();
        if let Some(thread) = self.heartbeat.take() {
            let _ = thread.join();
        }
        if let Err(e) = self.lock_path.device.remove_file_plain(&self.lock_path.path) {
            warn!(lock = %self.lock_path.display(), error = %e, "cannot release directory lock");
        } else {
            debug!(lock = %self.lock_path.display(), "directory lock released");
        }
    }
}

/// Shared ownership of one physical directory lock.
#[derive(Clone)]
pub struct DirLock {
    shared: Arc<SharedLock>,
}

impl DirLock {
    /// UUID written at the head of the lock file.
    #[must_use]
    pub fn uuid(&self) -> [u8; UUID_LEN] {
        self.shared.uuid
    }
}

#[derive(Default)]
struct RegistryInner {
    by_uuid: FxHashMap<[u8; UUID_LEN], Weak<SharedLock>>,
    by_path: FxHashMap<String, [u8; UUID_LEN]>,
}

/// Process-wide deduplication of lock ownership, keyed by lock UUID.
///
/// Passed explicitly through the pipeline instead of living as a global.
#[derive(Default)]
pub struct LockRegistry {
    inner: Mutex<RegistryInner>,
}

impl LockRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires (or joins) the lock guarding `lock_path`.
    pub fn acquire(
        &self,
        lock_path: &AbstractPath,
        callback: &mut dyn LockCallback,
    ) -> Result<DirLock, FileError> {
        self.acquire_with(lock_path, callback, &LockTimings::default())
    }

    /// [`Self::acquire`] with explicit timings.
    pub fn acquire_with(
        &self,
        lock_path: &AbstractPath,
        callback: &mut dyn LockCallback,
        timings: &LockTimings,
    ) -> Result<DirLock, FileError> {
        let path_key = lock_path.display();

        // fast path: an active lock is already known under this path
        if let Some(active) = self.find_by_path(&path_key) {
            return Ok(active);
        }

        // the same physical lock may be reachable through another path:
        // check by the UUID stored in the file
        if let Ok(uuid) = read_lock_uuid(lock_path)
            && let Some(active) = self.find_by_uuid(uuid)
        {
            let mut inner = self.inner.lock().expect("registry poisoned");
            inner.by_path.insert(path_key, uuid);
            return Ok(active);
        }

        let shared = Arc::new(SharedLock::acquire(lock_path, callback, timings, self)?);
        let uuid = shared.uuid;
        {
            let mut inner = self.inner.lock().expect("registry poisoned");
            inner.by_uuid.insert(uuid, Arc::downgrade(&shared));
            inner.by_path.insert(path_key, uuid);
        }
        Ok(DirLock { shared })
    }

    /// Number of distinct live locks currently shared through this
    /// registry.
    #[must_use]
    pub fn active_count(&self) -> usize {
        let inner = self.inner.lock().expect("registry poisoned");
        inner
            .by_uuid
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    fn find_by_path(&self, path_key: &str) -> Option<DirLock> {
        let inner = self.inner.lock().expect("registry poisoned");
        let uuid = inner.by_path.get(path_key)?;
        inner
            .by_uuid
            .get(uuid)
            .and_then(Weak::upgrade)
            .map(|shared| DirLock { shared })
    }

    fn find_by_uuid(&self, uuid: [u8; UUID_LEN]) -> Option<DirLock> {
        let inner = self.inner.lock().expect("registry poisoned");
        inner
            .by_uuid
            .get(&uuid)
            .and_then(Weak::upgrade)
            .map(|shared| DirLock { shared })
    }
}

/// The lock-file path guarding one base folder.
#[must_use]
pub fn lock_file_path(base_folder: &AbstractPath) -> AbstractPath {
    base_folder.join(LOCK_FILE_NAME)
}

/// `true` when a foreign lock file currently exists for the base folder.
pub fn lock_exists(base_folder: &AbstractPath) -> Result<bool, FileError> {
    Ok(item_type_if_exists(&lock_file_path(base_folder))?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vfs::AfsPath;
    use vfs::native::NativeDevice;

    fn base_at(root: &std::path::Path) -> AbstractPath {
        AbstractPath::new(Arc::new(NativeDevice::new(root.to_path_buf())), AfsPath::ROOT)
    }

    fn fast_timings() -> LockTimings {
        LockTimings {
            emit_interval: Duration::from_millis(20),
            poll_interval: Duration::from_millis(30),
            abandoned_after: Duration::from_millis(150),
            ui_interval: Duration::from_millis(5),
        }
    }

    #[test]
    fn acquire_writes_uuid_and_release_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LockRegistry::new();
        let lock_path = lock_file_path(&base_at(dir.path()));

        let lock = registry
            .acquire_with(&lock_path, &mut SilentCallback, &fast_timings())
            .unwrap();
        assert!(dir.path().join(LOCK_FILE_NAME).exists());
        assert_eq!(read_lock_uuid(&lock_path).unwrap(), lock.uuid());
        assert_eq!(registry.active_count(), 1);

        drop(lock);
        assert!(!dir.path().join(LOCK_FILE_NAME).exists());
    }

    #[test]
    fn second_acquire_shares_ownership() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LockRegistry::new();
        let lock_path = lock_file_path(&base_at(dir.path()));
        let timings = fast_timings();

        let first = registry
            .acquire_with(&lock_path, &mut SilentCallback, &timings)
            .unwrap();
        let second = registry
            .acquire_with(&lock_path, &mut SilentCallback, &timings)
            .unwrap();
        assert_eq!(first.uuid(), second.uuid());
        assert_eq!(registry.active_count(), 1);

        drop(first);
        // still held through the second handle
        assert!(dir.path().join(LOCK_FILE_NAME).exists());
        drop(second);
        assert!(!dir.path().join(LOCK_FILE_NAME).exists());
    }

    #[test]
    fn heartbeat_grows_the_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LockRegistry::new();
        let lock_path = lock_file_path(&base_at(dir.path()));

        let _lock = registry
            .acquire_with(&lock_path, &mut SilentCallback, &fast_timings())
            .unwrap();
        let initial = std::fs::metadata(dir.path().join(LOCK_FILE_NAME)).unwrap().len();
        std::thread::sleep(Duration::from_millis(120));
        let grown = std::fs::metadata(dir.path().join(LOCK_FILE_NAME)).unwrap().len();
        assert!(grown > initial, "no heartbeat bytes appended");
    }

    #[test]
    fn abandoned_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LockRegistry::new();
        let base = base_at(dir.path());
        let lock_path = lock_file_path(&base);

        // fabricate a foreign lock that never emits heartbeats
        std::fs::write(dir.path().join(LOCK_FILE_NAME), [7u8; 16]).unwrap();

        let lock = registry
            .acquire_with(&lock_path, &mut SilentCallback, &fast_timings())
            .unwrap();
        assert_ne!(lock.uuid(), [7u8; 16]);

        // the deletion lock has been cleaned up again
        assert!(!dir.path().join(format!("{DELETION_LOCK_PREFIX}{LOCK_FILE_NAME}")).exists());
    }

    #[test]
    fn lock_exists_reports_foreign_locks() {
        let dir = tempfile::tempdir().unwrap();
        let base = base_at(dir.path());
        assert!(!lock_exists(&base).unwrap());

        std::fs::write(dir.path().join(LOCK_FILE_NAME), [0u8; 16]).unwrap();
        assert!(lock_exists(&base).unwrap());
    }
}
