#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The sync-state database: one file per side recording the items *known
//! to be in sync* at the last successful run. The direction resolver uses
//! it to decide which side of a non-equal pair actually changed, and move
//! detection uses the recorded file ids to re-link renamed items.
//!
//! # File format
//!
//! Outer layer (uncompressed): the magic `FreeFileSync\0`, then a zlib
//! stream. Compressed payload, all integers little-endian, lengths `u32`:
//!
//! ```text
//! u32 version=6 | blob dbUuid | u32 partnerCount | (blob partnerUuid, blob stream)*
//! ```
//!
//! Each side's file keyed by *partner UUID* carries the per-side stream:
//! the serialized filter and comparison variant, then per level
//!
//! ```text
//! files{1, name, i64 mtime, u64 size, blob fileId}* 0
//! symlinks{1, name, i64 mtime, name target, i32 type}* 0
//! folders{1, name, u8 status, <recurse>}* 0
//! ```
//!
//! The folder status byte distinguishes a real in-sync folder from a
//! *straw man* placeholder that only carries tracked children.
//!
//! # Semantics
//!
//! - Loading fails with [`vfs::FileErrorKind::DatabaseNotExisting`] when a
//!   file or the partner's stream is absent, so the resolver can fall back
//!   to the default policy.
//! - For items currently `Equal` the observed values are stored; for all
//!   others the previous in-sync values are carried over from the prior
//!   database, so temporary local changes do not erase the knowledge of
//!   genuinely-in-sync state.
//! - Saving is transactional across both sides (`*.tmp`, delete originals,
//!   rename both) and skipped entirely when neither serialized payload
//!   changed.

mod serialize;
mod storage;
mod tree;

pub use crate::storage::{load_last_synchronous_state, save_to_disk};
pub use crate::tree::{
    FolderStatus, InSyncDescrFile, InSyncDescrLink, InSyncFile, InSyncFolder, InSyncLink,
};

/// Database file name next to each base folder.
#[cfg(windows)]
pub const DB_FILE_NAME: &str = "sync.ffs_db";
/// Database file name next to each base folder (hidden on Unix).
#[cfg(not(windows))]
pub const DB_FILE_NAME: &str = ".sync.ffs_db";

/// The database file location of one side.
#[must_use]
pub fn db_file_path(base_folder: &vfs::AbstractPath) -> vfs::AbstractPath {
    base_folder.join(DB_FILE_NAME)
}
