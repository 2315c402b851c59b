use std::io;

/// Classifies a [`FileError`] so callers can implement targeted recovery.
///
/// The kinds mirror the recovery paths actually taken by the engine:
/// transactional copy retries on `TargetExisting`, the versioner creates
/// intermediate folders on `TargetPathMissing`, removal helpers verify
/// non-existence on `NotExisting`, and move execution degrades to
/// copy+delete on `DifferentVolume`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileErrorKind {
    /// The addressed item does not exist.
    NotExisting,
    /// The target of a create/rename already exists.
    TargetExisting,
    /// A parent of the target path is missing.
    TargetPathMissing,
    /// A rename/move crossed filesystem devices.
    DifferentVolume,
    /// The item is locked by another process.
    FileLocked,
    /// A sync-state database file or partner stream is absent.
    DatabaseNotExisting,
    /// Cooperative cancellation; bypasses retry loops and unwinds.
    Aborted,
    /// Any other filesystem-level failure.
    Other,
}

/// Error type of every filesystem-facing operation.
///
/// Carries a user-presentable message plus a technical detail (usually the
/// platform error text). Equality of kind, not message, drives recovery.
#[derive(Clone, Debug, thiserror::Error)]
pub struct FileError {
    kind: FileErrorKind,
    msg: String,
    detail: String,
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.msg)
        } else {
            write!(f, "{} [{}]", self.msg, self.detail)
        }
    }
}

impl FileError {
    /// Creates an error of the given kind.
    pub fn new(kind: FileErrorKind, msg: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
            detail: detail.into(),
        }
    }

    /// Creates a generic [`FileErrorKind::Other`] error.
    pub fn other(msg: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(FileErrorKind::Other, msg, detail)
    }

    /// Creates the cooperative-abort marker error.
    pub fn aborted() -> Self {
        Self::new(FileErrorKind::Aborted, "Operation aborted", "")
    }

    /// Wraps an [`io::Error`], deriving the kind from the OS error class.
    pub fn from_io(msg: impl Into<String>, err: &io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => FileErrorKind::NotExisting,
            io::ErrorKind::AlreadyExists => FileErrorKind::TargetExisting,
            io::ErrorKind::CrossesDevices => FileErrorKind::DifferentVolume,
            _ => FileErrorKind::Other,
        };
        Self::new(kind, msg, err.to_string())
    }

    /// The recovery classification of this error.
    #[must_use]
    pub fn kind(&self) -> FileErrorKind {
        self.kind
    }

    /// The user-presentable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// The technical detail, typically the platform error text.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// `true` when this error is the cooperative-abort signal.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        self.kind == FileErrorKind::Aborted
    }
}
