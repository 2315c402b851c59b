#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `vfs` is the abstract filesystem boundary every other bisync crate is
//! written against. It exposes validated device-relative paths, an
//! object-safe [`Device`] trait covering traversal, stream I/O, plain
//! mutations, and device identity, plus a layer of library routines built on
//! top of the primitives: deep path probing, recursive folder
//! creation/removal, and transactional file copy.
//!
//! # Design
//!
//! - [`AfsPath`] is a `/`-separated path relative to a device root. It never
//!   begins or ends with the separator and never contains empty components.
//! - [`AbstractPath`] pairs an [`AfsPath`] with a shared [`Device`] handle.
//!   Two abstract paths are equal only when both the device and the relative
//!   path compare equal under the device's own case policy.
//! - Every fallible operation returns a [`FileError`] carrying a
//!   user-presentable message, a technical detail string, and a
//!   [`FileErrorKind`] that higher layers match on to implement recovery.
//! - Backends register through [`phrase::DeviceParser`]; the first backend
//!   that claims a user-entered path phrase resolves it, defaulting to the
//!   native backend.
//!
//! # Invariants
//!
//! - [`ops::copy_file_transactional`] never leaves a `*.ffs_tmp` file behind
//!   on any failure exit path.
//! - [`ops::create_folder_if_missing_recursive`] leaves the full path
//!   existing as a folder on success.
//! - [`ops::remove_folder_if_exists_recursive`] treats a missing path as
//!   success.

mod error;
mod path;

pub mod device;
pub mod native;
pub mod ops;
pub mod phrase;

pub use crate::device::{
    AbstractPath, CopiedAttributes, Device, DeviceKind, ErrorChoice, FileId, FileInfo, FolderInfo,
    HandleLink, InputStream, ItemType, OutputExpectation, OutputStream, SymlinkInfo, TraverseSink,
    compare_abstract_path, compare_device, same_device,
};
pub use crate::error::{FileError, FileErrorKind};
pub use crate::path::{AfsPath, cmp_file_names, equal_file_names};

/// Suffix of the intermediate file used by transactional copies.
pub const TEMP_FILE_ENDING: &str = ".ffs_tmp";

/// Progress callback reporting unbuffered byte counts.
///
/// Returning an error cancels the running operation; the abort signal
/// travels as [`FileErrorKind::Aborted`] so it bypasses retry loops.
pub type IoProgress<'a> = &'a mut dyn FnMut(u64) -> Result<(), FileError>;
