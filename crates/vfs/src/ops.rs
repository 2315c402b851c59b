//! Library routines layered above the [`Device`] primitives: deep path
//! probing, recursive folder creation/removal, and transactional copy.

use tracing::debug;

use crate::device::{
    AbstractPath, CopiedAttributes, Device, ErrorChoice, FileInfo, FolderInfo, HandleLink,
    ItemType, OutputExpectation, SymlinkInfo, TraverseSink, same_device,
};
use crate::error::{FileError, FileErrorKind};
use crate::path::equal_file_names;
use crate::{IoProgress, TEMP_FILE_ENDING};

/// Result of probing how much of a path exists.
#[derive(Clone, Debug)]
pub struct PathStatus {
    /// Type of the deepest existing ancestor (or of the item itself).
    pub existing_type: ItemType,
    /// The deepest existing ancestor.
    pub existing_path: AbstractPath,
    /// Item names missing below `existing_path`; empty when the full path
    /// exists.
    pub missing_tail: Vec<String>,
}

/// Probes an item, mapping `NotExisting` to `None`.
pub fn item_type_if_exists(ap: &AbstractPath) -> Result<Option<ItemType>, FileError> {
    match ap.device.item_type(&ap.path) {
        Ok(ty) => Ok(Some(ty)),
        Err(e) if e.kind() == FileErrorKind::NotExisting => Ok(None),
        Err(e) => Err(e),
    }
}

/// `true` when any object exists at the path.
pub fn something_exists(ap: &AbstractPath) -> bool {
    matches!(item_type_if_exists(ap), Ok(Some(_)))
}

/// Walks upward until an existing ancestor is found, collecting the missing
/// item names on the way back down.
///
/// When the direct type probe of an intermediate step fails, the parent
/// folder is traversed and searched by name under the device case policy;
/// the search communicates its find through an explicit result value.
pub fn path_status(ap: &AbstractPath) -> Result<PathStatus, FileError> {
    let Some(parent) = ap.parent() else {
        // device root: must exist
        let ty = ap.device.item_type(&ap.path)?;
        return Ok(PathStatus {
            existing_type: ty,
            existing_path: ap.clone(),
            missing_tail: Vec::new(),
        });
    };

    let direct_probe = ap.device.item_type(&ap.path);
    if let Ok(ty) = direct_probe {
        return Ok(PathStatus {
            existing_type: ty,
            existing_path: ap.clone(),
            missing_tail: Vec::new(),
        });
    }

    let item_name = ap.path.item_name().to_owned();
    let mut parent_status = path_status(&parent)?;
    if !parent_status.missing_tail.is_empty() {
        parent_status.missing_tail.push(item_name);
        return Ok(parent_status);
    }

    // parent exists: search it by name to distinguish "missing" from probe
    // failures like case-only mismatches
    let mut search = ItemSearch {
        item_name: &item_name,
        case_sensitive: ap.device.is_case_sensitive(),
        found: None,
    };
    ap.device.traverse_folder(&parent.path, &mut search)?;

    match search.found {
        Some(ty) => Ok(PathStatus {
            existing_type: ty,
            existing_path: ap.clone(),
            missing_tail: Vec::new(),
        }),
        None => Ok(PathStatus {
            existing_type: parent_status.existing_type,
            existing_path: parent,
            missing_tail: vec![item_name],
        }),
    }
}

struct ItemSearch<'a> {
    item_name: &'a str,
    case_sensitive: bool,
    found: Option<ItemType>,
}

impl ItemSearch<'_> {
    fn matches(&self, name: &str) -> bool {
        equal_file_names(name, self.item_name, self.case_sensitive)
    }
}

impl TraverseSink for ItemSearch<'_> {
    fn on_file(&mut self, info: FileInfo) {
        if self.found.is_none() && self.matches(&info.name) {
            self.found = Some(ItemType::File);
        }
    }

    fn on_folder(&mut self, info: FolderInfo) {
        if self.found.is_none() && self.matches(&info.name) {
            self.found = Some(ItemType::Folder);
        }
    }

    fn on_symlink(&mut self, info: SymlinkInfo) -> HandleLink {
        if self.found.is_none() && self.matches(&info.name) {
            self.found = Some(ItemType::Symlink);
        }
        HandleLink::Skip
    }

    fn on_error(&mut self, _err: &FileError) -> ErrorChoice {
        ErrorChoice::Ignore
    }
}

/// Creates the folder and all missing ancestors.
///
/// On success `item_type(ap)` reports a folder. An existing folder is not
/// an error; an existing *file* anywhere on the path is.
pub fn create_folder_if_missing_recursive(ap: &AbstractPath) -> Result<(), FileError> {
    match ap.device.create_folder(&ap.path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == FileErrorKind::TargetExisting => {
            match ap.device.item_type(&ap.path)? {
                ItemType::Folder => Ok(()),
                ItemType::File | ItemType::Symlink => Err(e),
            }
        }
        Err(e)
            if matches!(
                e.kind(),
                FileErrorKind::TargetPathMissing | FileErrorKind::NotExisting
            ) =>
        {
            let Some(parent) = ap.parent() else {
                return Err(e); // nothing above the device root to create
            };
            create_folder_if_missing_recursive(&parent)?;
            match ap.device.create_folder(&ap.path) {
                // a sibling process may have been faster
                Err(e2) if e2.kind() == FileErrorKind::TargetExisting => Ok(()),
                other => other,
            }
        }
        Err(e) => {
            // odd platform error code: accept when the folder turns out to
            // exist after all
            match item_type_if_exists(ap) {
                Ok(Some(ItemType::Folder)) => Ok(()),
                _ => Err(e),
            }
        }
    }
}

/// Removes a folder with all content, depth first.
///
/// The callbacks run before each deletion; deletion of a missing path is
/// not an error.
pub fn remove_folder_if_exists_recursive(
    ap: &AbstractPath,
    before_file: &mut dyn FnMut(&AbstractPath) -> Result<(), FileError>,
    before_folder: &mut dyn FnMut(&AbstractPath) -> Result<(), FileError>,
) -> Result<(), FileError> {
    match item_type_if_exists(ap)? {
        None => return Ok(()),
        Some(ItemType::File) => {
            before_file(ap)?;
            return remove_tolerating_missing(ap.device.remove_file_plain(&ap.path));
        }
        Some(ItemType::Symlink) => {
            before_file(ap)?;
            return remove_tolerating_missing(ap.device.remove_symlink_plain(&ap.path));
        }
        Some(ItemType::Folder) => {}
    }

    let mut listing = LevelListing::default();
    ap.device.traverse_folder(&ap.path, &mut listing)?;

    for name in listing.files {
        let child = ap.join(&name);
        before_file(&child)?;
        remove_tolerating_missing(ap.device.remove_file_plain(&child.path))?;
    }
    for name in listing.symlinks {
        let child = ap.join(&name);
        before_file(&child)?;
        remove_tolerating_missing(ap.device.remove_symlink_plain(&child.path))?;
    }
    for name in listing.folders {
        remove_folder_if_exists_recursive(&ap.join(&name), before_file, before_folder)?;
    }

    before_folder(ap)?;
    remove_tolerating_missing(ap.device.remove_folder_plain(&ap.path))
}

fn remove_tolerating_missing(result: Result<(), FileError>) -> Result<(), FileError> {
    match result {
        Err(e) if e.kind() == FileErrorKind::NotExisting => Ok(()),
        other => other,
    }
}

#[derive(Default)]
struct LevelListing {
    files: Vec<String>,
    symlinks: Vec<String>,
    folders: Vec<String>,
}

impl TraverseSink for LevelListing {
    fn on_file(&mut self, info: FileInfo) {
        self.files.push(info.name);
    }

    fn on_folder(&mut self, info: FolderInfo) {
        self.folders.push(info.name);
    }

    fn on_symlink(&mut self, info: SymlinkInfo) -> HandleLink {
        self.symlinks.push(info.name);
        HandleLink::Skip
    }

    fn on_error(&mut self, _err: &FileError) -> ErrorChoice {
        ErrorChoice::Abort
    }
}

/// Same-device move; fails with `DifferentVolume` when source and target
/// live on different devices and `TargetExisting` when the target is
/// present.
pub fn rename_item(from: &AbstractPath, to: &AbstractPath) -> Result<(), FileError> {
    if !same_device(&*from.device, &*to.device) {
        return Err(FileError::new(
            FileErrorKind::DifferentVolume,
            format!(
                "Cannot move \"{}\" to \"{}\".",
                from.display(),
                to.display()
            ),
            "items are located on different devices",
        ));
    }
    from.device.rename_item(&from.path, &to.path)
}

/// Streams a file between devices.
///
/// Cannot carry permissions across device types; progress reports both the
/// read and the written byte counts.
pub fn copy_file_as_stream(
    source: &AbstractPath,
    target: &AbstractPath,
    progress: IoProgress<'_>,
) -> Result<CopiedAttributes, FileError> {
    let mut input = source.device.open_input(&source.path)?;
    let file_size = input.size()?;
    let mtime = input.mtime()?;
    let source_file_id = input.file_id();

    let mut output = target.device.open_output(
        &target.path,
        OutputExpectation {
            size: Some(file_size),
            mtime: Some(mtime),
        },
    )?;

    let streamed = (|| {
        let mut buf = vec![0u8; 128 * 1024];
        loop {
            let read = input.read(&mut buf)?;
            if read == 0 {
                break;
            }
            output.write(&buf[..read])?;
            progress(2 * read as u64)?;
        }
        output.finalize()
    })();

    match streamed {
        Ok(target_file_id) => Ok(CopiedAttributes {
            file_size,
            mtime,
            source_file_id,
            target_file_id,
        }),
        Err(e) => {
            // don't leave a partial target behind
            let _ = target.device.remove_file_plain(&target.path);
            Err(e)
        }
    }
}

fn copy_file_best_effort(
    source: &AbstractPath,
    target: &AbstractPath,
    copy_permissions: bool,
    progress: IoProgress<'_>,
) -> Result<CopiedAttributes, FileError> {
    if same_device_kind(&*source.device, &*target.device) {
        return source.device.copy_file_same_device(
            &source.path,
            &target.path,
            copy_permissions,
            progress,
        );
    }
    if copy_permissions {
        return Err(FileError::other(
            format!("Cannot write permissions of \"{}\".", target.display()),
            "operation not supported between different device types",
        ));
    }
    copy_file_as_stream(source, target, progress)
}

fn same_device_kind(a: &dyn Device, b: &dyn Device) -> bool {
    a.kind() == b.kind()
}

/// Copies a file, optionally through an intermediate `*.ffs_tmp` file that
/// is atomically renamed over the target.
///
/// The transactional variant retries up to ten alternative temp names on
/// `TargetExisting`, invokes `on_delete_target` only after the copy itself
/// succeeded, and removes the temp file on every failure exit path.
///
/// Caveat kept from the field: on FAT volumes the final rename tunnels the
/// prior target's creation time onto the new file; this is observed
/// filesystem behavior and deliberately not corrected.
pub fn copy_file_transactional(
    source: &AbstractPath,
    target: &AbstractPath,
    copy_permissions: bool,
    transactional: bool,
    mut on_delete_target: Option<&mut dyn FnMut() -> Result<(), FileError>>,
    progress: IoProgress<'_>,
) -> Result<CopiedAttributes, FileError> {
    if !transactional {
        if let Some(cb) = on_delete_target.as_mut() {
            cb()?;
        }
        return copy_file_best_effort(source, target, copy_permissions, progress);
    }

    let mut tmp = AbstractPath::new(
        std::sync::Arc::clone(&target.device),
        crate::path::AfsPath::new(format!("{}{TEMP_FILE_ENDING}", target.path.as_str()))
            .expect("temp suffix keeps the path valid"),
    );

    // optimistic strategy: assume the temp name is free, recover on clash
    let attrs = {
        let mut attempt = 0;
        loop {
            match copy_file_best_effort(source, &tmp, copy_permissions, &mut *progress) {
                Ok(attrs) => break attrs,
                Err(e) if e.kind() == FileErrorKind::TargetExisting && attempt < 10 => {
                    tmp.path = crate::path::AfsPath::new(format!(
                        "{}_{attempt}{TEMP_FILE_ENDING}",
                        target.path.as_str()
                    ))
                    .expect("temp suffix keeps the path valid");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    };

    let commit = (|| {
        if let Some(cb) = on_delete_target.as_mut() {
            cb()?;
        }
        rename_item(&tmp, target)
    })();

    if let Err(e) = commit {
        debug!(target = %target.display(), "transactional copy failed, removing temp file");
        let _ = tmp.device.remove_file_plain(&tmp.path);
        return Err(e);
    }
    Ok(attrs)
}
