//! The polymorphic device boundary: item probing, traversal, stream I/O,
//! plain mutations, and device identity.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::IoProgress;
use crate::error::FileError;
use crate::path::{AfsPath, cmp_file_names};

/// Kind tag of a backend; the primary key of the device total order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceKind {
    /// The local filesystem.
    Native,
}

/// Outcome of probing an item's type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemType {
    File,
    Folder,
    Symlink,
}

/// Opaque per-device file identity, stable for the lifetime of the item
/// where the OS supports it; empty otherwise.
///
/// Move detection uses it but tolerates its unreliability on FAT-family
/// volumes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FileId(pub Vec<u8>);

impl FileId {
    /// `true` when the device could not provide a stable identity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A file reported during traversal.
#[derive(Clone, Debug)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub mtime: i64,
    pub file_id: FileId,
    /// Set when the entry is a symlink that was followed to this file.
    pub symlink: Option<SymlinkInfo>,
}

/// A folder reported during traversal.
#[derive(Clone, Debug)]
pub struct FolderInfo {
    pub name: String,
    /// Set when the entry is a symlink that was followed to this folder.
    pub symlink: Option<SymlinkInfo>,
}

/// A symlink reported during traversal.
#[derive(Clone, Debug)]
pub struct SymlinkInfo {
    pub name: String,
    /// Modification time of the link itself, seconds since the Unix epoch.
    pub mtime: i64,
}

/// Per-symlink handling choice returned by a traversal sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleLink {
    /// Resolve the link and report the target as file or folder.
    Follow,
    /// Report the link itself.
    Skip,
}

/// Recovery choice for a single failed traversal entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorChoice {
    Ignore,
    Retry,
    Abort,
}

/// Receives one level of folder content from [`Device::traverse_folder`].
///
/// Errors while reading a single entry route through [`Self::on_error`];
/// `Retry` re-attempts the entry, `Ignore` skips it, `Abort` cancels the
/// whole traversal.
pub trait TraverseSink {
    fn on_file(&mut self, info: FileInfo);
    fn on_folder(&mut self, info: FolderInfo);
    fn on_symlink(&mut self, info: SymlinkInfo) -> HandleLink;
    fn on_error(&mut self, err: &FileError) -> ErrorChoice;
}

/// Byte-stream source opened through [`Device::open_input`].
pub trait InputStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError>;
    fn size(&self) -> Result<u64, FileError>;
    /// Seconds since the Unix epoch.
    fn mtime(&self) -> Result<i64, FileError>;
    fn file_id(&self) -> FileId;
}

/// Declared expectations for an output stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct OutputExpectation {
    /// When set, [`OutputStream::finalize`] verifies the written byte count.
    pub size: Option<u64>,
    /// When set, [`OutputStream::finalize`] persists this modification time.
    pub mtime: Option<i64>,
}

/// Byte-stream sink opened through [`Device::open_output`].
pub trait OutputStream {
    fn write(&mut self, buf: &[u8]) -> Result<(), FileError>;

    /// Flushes, verifies the byte count against the declared expected size,
    /// and persists the expected modification time.
    fn finalize(self: Box<Self>) -> Result<FileId, FileError>;
}

/// Attributes captured by a completed file copy.
#[derive(Clone, Debug)]
pub struct CopiedAttributes {
    pub file_size: u64,
    pub mtime: i64,
    pub source_file_id: FileId,
    pub target_file_id: FileId,
}

/// One filesystem backend instance, rooted somewhere on a concrete device.
///
/// All paths are device-relative. Backends are added by implementing this
/// trait and registering a parser in [`crate::phrase`]; nothing else in the
/// engine changes.
pub trait Device: Send + Sync {
    fn kind(&self) -> DeviceKind;

    /// Display form of the device root, used in messages and path display.
    fn root_display(&self) -> String;

    /// Case policy for item names under this device.
    fn is_case_sensitive(&self) -> bool;

    /// Total order among devices of the same kind, by root identity.
    fn compare_root_same_kind(&self, other: &dyn Device) -> Ordering;

    /// Probes an item; fails with [`crate::FileErrorKind::NotExisting`]
    /// when absent.
    fn item_type(&self, path: &AfsPath) -> Result<ItemType, FileError>;

    /// Reports one level of folder content to the sink.
    fn traverse_folder(&self, path: &AfsPath, sink: &mut dyn TraverseSink)
    -> Result<(), FileError>;

    fn open_input(&self, path: &AfsPath) -> Result<Box<dyn InputStream>, FileError>;

    /// Opens a new file; fails with `TargetExisting` when present.
    fn open_output(
        &self,
        path: &AfsPath,
        expected: OutputExpectation,
    ) -> Result<Box<dyn OutputStream>, FileError>;

    /// Appends bytes to an existing file; used by lock heartbeats.
    fn append_to_file(&self, path: &AfsPath, bytes: &[u8]) -> Result<(), FileError>;

    /// Creates a single folder level; `TargetExisting` when present,
    /// `TargetPathMissing` when the parent is absent.
    fn create_folder(&self, path: &AfsPath) -> Result<(), FileError>;

    fn remove_file_plain(&self, path: &AfsPath) -> Result<(), FileError>;
    fn remove_symlink_plain(&self, path: &AfsPath) -> Result<(), FileError>;

    /// Removes a single, empty folder level.
    fn remove_folder_plain(&self, path: &AfsPath) -> Result<(), FileError>;

    /// Same-device move; fails with `TargetExisting` when the target is
    /// present and `DifferentVolume` when the OS reports a device boundary.
    fn rename_item(&self, from: &AfsPath, to: &AfsPath) -> Result<(), FileError>;

    /// Native same-device copy, used when source and target share a backend.
    fn copy_file_same_device(
        &self,
        from: &AfsPath,
        to: &AfsPath,
        copy_permissions: bool,
        progress: IoProgress<'_>,
    ) -> Result<CopiedAttributes, FileError>;

    fn read_symlink(&self, path: &AfsPath) -> Result<String, FileError>;

    /// Persists a file's modification time (seconds since the epoch).
    fn set_file_time(&self, path: &AfsPath, mtime: i64) -> Result<(), FileError>;

    /// Creates a symlink at `path` pointing to `target`.
    fn create_symlink(&self, path: &AfsPath, target: &str) -> Result<(), FileError>;

    /// Persists a symlink's own modification time, where supported.
    fn set_symlink_time(&self, path: &AfsPath, mtime: i64) -> Result<(), FileError>;

    /// Probes once whether the platform recycler can take items below
    /// `path`; the result is cached by callers per base folder.
    fn recycler_available(&self, path: &AfsPath) -> bool;

    /// Moves an item into the platform recycler.
    fn recycle_item(&self, path: &AfsPath) -> Result<(), FileError>;
}

/// Imposes a total order over device instances: kind first, then the
/// device-type-specific root comparator.
#[must_use]
pub fn compare_device(a: &dyn Device, b: &dyn Device) -> Ordering {
    a.kind()
        .cmp(&b.kind())
        .then_with(|| a.compare_root_same_kind(b))
}

/// `true` when two device handles address the same physical root.
#[must_use]
pub fn same_device(a: &dyn Device, b: &dyn Device) -> bool {
    compare_device(a, b) == Ordering::Equal
}

/// A device handle plus a device-relative path.
#[derive(Clone)]
pub struct AbstractPath {
    pub device: Arc<dyn Device>,
    pub path: AfsPath,
}

impl AbstractPath {
    #[must_use]
    pub fn new(device: Arc<dyn Device>, path: AfsPath) -> Self {
        Self { device, path }
    }

    /// Appends one item name, staying on the same device.
    #[must_use]
    pub fn join(&self, item_name: &str) -> Self {
        Self {
            device: Arc::clone(&self.device),
            path: self.path.join(item_name),
        }
    }

    /// The parent path, or `None` at the device root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.path.parent().map(|p| Self {
            device: Arc::clone(&self.device),
            path: p,
        })
    }

    /// Full display form for messages.
    #[must_use]
    pub fn display(&self) -> String {
        let root = self.device.root_display();
        if self.path.is_root() {
            root
        } else if root.ends_with('/') {
            format!("{root}{}", self.path)
        } else {
            format!("{root}/{}", self.path)
        }
    }
}

impl std::fmt::Debug for AbstractPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

/// Total order over abstract paths: device order first, then the relative
/// path under the device's case policy.
#[must_use]
pub fn compare_abstract_path(a: &AbstractPath, b: &AbstractPath) -> Ordering {
    compare_device(&*a.device, &*b.device).then_with(|| {
        let case_sensitive = a.device.is_case_sensitive() && b.device.is_case_sensitive();
        cmp_file_names(a.path.as_str(), b.path.as_str(), case_sensitive)
    })
}

impl PartialEq for AbstractPath {
    fn eq(&self, other: &Self) -> bool {
        compare_abstract_path(self, other) == Ordering::Equal
    }
}

impl Eq for AbstractPath {}
