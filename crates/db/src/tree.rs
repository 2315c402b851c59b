//! In-memory form of the last-in-sync snapshot.

use std::collections::BTreeMap;

use model::{BySide, CompareVariant};
use vfs::FileId;

/// Last-in-sync attributes of a file on one side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InSyncDescrFile {
    /// Seconds since the Unix epoch.
    pub mtime: i64,
    pub file_id: FileId,
}

/// A file known to be in sync; sizes agree between the sides by
/// definition, modification times may differ within tolerance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InSyncFile {
    pub cmp_var: CompareVariant,
    pub size: u64,
    pub sides: BySide<InSyncDescrFile>,
}

/// Last-in-sync attributes of a symlink on one side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InSyncDescrLink {
    pub mtime: i64,
    pub target: String,
}

/// A symlink known to be in sync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InSyncLink {
    pub cmp_var: CompareVariant,
    pub sides: BySide<InSyncDescrLink>,
}

/// Whether a folder entry is authoritative or a placeholder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FolderStatus {
    #[default]
    InSync,
    /// The folder itself was not in sync when saved; the entry exists only
    /// to carry its tracked children.
    StrawMan,
}

/// One level of the last-in-sync tree, keyed by case-sensitive short name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InSyncFolder {
    pub status: FolderStatus,
    pub files: BTreeMap<String, InSyncFile>,
    pub symlinks: BTreeMap<String, InSyncLink>,
    pub folders: BTreeMap<String, InSyncFolder>,
}

impl InSyncFolder {
    /// `true` when the level carries no entries at any depth.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.symlinks.is_empty() && self.folders.is_empty()
    }
}
