#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Moves items that a sync run would otherwise delete or overwrite into a
//! *versioning folder*, e.g.
//!
//! ```text
//! C:\Source\subdir\Sample.txt -> D:\Revisions\subdir\Sample.txt 2012-05-15 131513.txt
//! ```
//!
//! Two styles exist: **replace** (a flat mirror, new versions replace old
//! ones) and **timestamped** (` YYYY-MM-DD HHMMSS<.ext>` appended, the
//! extension duplicated so versions still open with the right
//! application). Timestamped names satisfy [`is_matching_version`], the
//! inverse predicate a retention policy can use to group versions back to
//! their source file.
//!
//! Behavior notes, all load-bearing for the executor:
//! - a missing source is silently skipped (nothing to version),
//! - missing intermediate folders are created on demand, so no empty
//!   shells are left behind,
//! - a move is attempted first; `DifferentVolume`/`TargetExisting` fall
//!   back to copy+delete,
//! - folders are versioned by recursing one level, versioning children
//!   individually, then removing the emptied source folder.

use tracing::debug;

use model::VersioningStyle;
use vfs::ops::{
    copy_file_transactional, create_folder_if_missing_recursive, item_type_if_exists, rename_item,
};
use vfs::{
    AbstractPath, ErrorChoice, FileError, FileErrorKind, FileInfo, FolderInfo, HandleLink,
    IoProgress, ItemType, SymlinkInfo, TraverseSink,
};

/// Extension of a relative path including the dot, or empty.
fn extension_of(rel_name: &str) -> &str {
    let short = rel_name.rsplit('/').next().unwrap_or(rel_name);
    match short.rfind('.') {
        Some(pos) => &short[pos..],
        None => "",
    }
}

/// `true` when `versioned` is a timestamped version of `short_name`,
/// e.g. `("Sample.txt", "Sample.txt 2012-05-15 131513.txt")`.
#[must_use]
pub fn is_matching_version(short_name: &str, versioned: &str, case_sensitive: bool) -> bool {
    let fold = |s: &str| -> Vec<char> {
        if case_sensitive {
            s.chars().collect()
        } else {
            s.chars().flat_map(char::to_lowercase).collect()
        }
    };
    let name = fold(short_name);
    let ext = fold(extension_of(short_name));
    let candidate = fold(versioned);

    let mut pos = 0usize;

    fn expect(candidate: &[char], pos: &mut usize, chars: &[char]) -> bool {
        if candidate.len() - *pos < chars.len() || candidate[*pos..*pos + chars.len()] != *chars {
            return false;
        }
        *pos += chars.len();
        true
    }
    fn digits(candidate: &[char], pos: &mut usize, count: usize) -> bool {
        for _ in 0..count {
            if *pos >= candidate.len() || !candidate[*pos].is_ascii_digit() {
                return false;
            }
            *pos += 1;
        }
        true
    }

    expect(&candidate, &mut pos, &name)
        && expect(&candidate, &mut pos, &[' '])
        && digits(&candidate, &mut pos, 4)
        && expect(&candidate, &mut pos, &['-'])
        && digits(&candidate, &mut pos, 2)
        && expect(&candidate, &mut pos, &['-'])
        && digits(&candidate, &mut pos, 2)
        && expect(&candidate, &mut pos, &[' '])
        && digits(&candidate, &mut pos, 6)
        && expect(&candidate, &mut pos, &ext)
        && pos == candidate.len()
}

/// Moves superseded items into the versioning folder.
pub struct Versioner {
    folder: AbstractPath,
    style: VersioningStyle,
    /// `YYYY-MM-DD HHMMSS`, fixed per sync run.
    timestamp: String,
}

impl Versioner {
    /// Creates a versioner stamped with the current wall-clock time.
    pub fn new(folder: AbstractPath, style: VersioningStyle) -> Result<Self, FileError> {
        let now = time::OffsetDateTime::now_utc();
        Self::with_timestamp(folder, style, &now)
    }

    /// Creates a versioner with an explicit timestamp.
    pub fn with_timestamp(
        folder: AbstractPath,
        style: VersioningStyle,
        stamp: &time::OffsetDateTime,
    ) -> Result<Self, FileError> {
        let format =
            time::macros::format_description!("[year]-[month]-[day] [hour][minute][second]");
        let timestamp = stamp
            .format(&format)
            .map_err(|e| FileError::other("Failure to create timestamp for versioning.", e.to_string()))?;
        if timestamp.len() != 17 {
            // unexpected length, e.g. a five-digit year
            return Err(FileError::other(
                "Failure to create timestamp for versioning.",
                timestamp,
            ));
        }
        Ok(Self {
            folder,
            style,
            timestamp,
        })
    }

    /// Target path of one versioned item.
    fn version_target(&self, rel_name: &str) -> AbstractPath {
        let mut target = self.folder.clone();
        for comp in rel_name.split('/').filter(|c| !c.is_empty()) {
            target = target.join(comp);
        }
        match self.style {
            VersioningStyle::Replace => target,
            VersioningStyle::TimestampFile => {
                let versioned_name = format!(
                    "{} {}{}",
                    target.path.item_name(),
                    self.timestamp,
                    extension_of(rel_name)
                );
                debug_assert!(is_matching_version(
                    rel_name.rsplit('/').next().unwrap_or(rel_name),
                    &versioned_name,
                    true
                ));
                match target.parent() {
                    Some(parent) => parent.join(&versioned_name),
                    None => self.folder.join(&versioned_name),
                }
            }
        }
    }

    /// Versions one file or symlink; returns `false` when the source does
    /// not exist (nothing was processed).
    pub fn revision_file(
        &self,
        source: &AbstractPath,
        rel_name: &str,
        progress: IoProgress<'_>,
    ) -> Result<bool, FileError> {
        let target = self.version_target(rel_name);

        match self.move_item(source, &target, &mut *progress) {
            Ok(()) => Ok(true),
            Err(move_err) => {
                // expected to fail when the target folder tree is not yet
                // existing; a vanished source is no error at all
                if item_type_if_exists(source)?.is_none() {
                    return Ok(false);
                }
                let Some(target_parent) = target.parent() else {
                    return Err(move_err);
                };
                if item_type_if_exists(&target_parent)?.is_some() {
                    return Err(move_err);
                }
                create_folder_if_missing_recursive(&target_parent)?;
                self.move_item(source, &target, progress)?;
                Ok(true)
            }
        }
    }

    /// Versions a folder: children individually, one level at a time,
    /// then removes the emptied source folder.
    pub fn revision_folder(
        &self,
        source: &AbstractPath,
        rel_name: &str,
        progress: IoProgress<'_>,
    ) -> Result<(), FileError> {
        match item_type_if_exists(source)? {
            None => return Ok(()), // nothing to version
            Some(ItemType::File | ItemType::Symlink) => {
                self.revision_file(source, rel_name, progress)?;
                return Ok(());
            }
            Some(ItemType::Folder) => {}
        }

        let mut listing = LevelListing::default();
        source.device.traverse_folder(&source.path, &mut listing)?;

        for name in listing.files.iter().chain(listing.symlinks.iter()) {
            self.revision_file(
                &source.join(name),
                &format!("{rel_name}/{name}"),
                &mut *progress,
            )?;
        }
        for name in &listing.folders {
            self.revision_folder(
                &source.join(name),
                &format!("{rel_name}/{name}"),
                &mut *progress,
            )?;
        }

        debug!(folder = %source.display(), "removing emptied source folder");
        match source.device.remove_folder_plain(&source.path) {
            Err(e) if e.kind() == FileErrorKind::NotExisting => Ok(()),
            other => other,
        }
    }

    /// Move; fall back to copy+delete across devices, replace remnants of
    /// a previous incomplete move.
    fn move_item(
        &self,
        source: &AbstractPath,
        target: &AbstractPath,
        progress: IoProgress<'_>,
    ) -> Result<(), FileError> {
        if self.style == VersioningStyle::Replace
            && let Some(existing) = item_type_if_exists(target)?
        {
            match existing {
                ItemType::Folder => target.device.remove_folder_plain(&target.path)?,
                ItemType::File => target.device.remove_file_plain(&target.path)?,
                ItemType::Symlink => target.device.remove_symlink_plain(&target.path)?,
            }
        }

        match rename_item(source, target) {
            Ok(()) => return Ok(()),
            Err(e)
                if matches!(
                    e.kind(),
                    FileErrorKind::DifferentVolume | FileErrorKind::TargetExisting
                ) => {}
            Err(e) => return Err(e),
        }

        // cross-volume (or clashing) move: copy, then delete the source
        match item_type_if_exists(source)? {
            None => return Ok(()), // vanished meanwhile
            Some(ItemType::Symlink) => {
                if item_type_if_exists(target)?.is_none() {
                    let link_target = source.device.read_symlink(&source.path)?;
                    target.device.create_symlink(&target.path, &link_target)?;
                }
                source.device.remove_symlink_plain(&source.path)?;
            }
            Some(ItemType::File) => {
                if item_type_if_exists(target)?.is_none() {
                    copy_file_transactional(source, target, false, true, None, progress)?;
                }
                source.device.remove_file_plain(&source.path)?;
            }
            Some(ItemType::Folder) => {
                return Err(FileError::other(
                    format!("Cannot move folder \"{}\".", source.display()),
                    "a folder cannot replace an item in the versioning store",
                ));
            }
        }
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_versions_validate() {
        assert!(is_matching_version(
            "Sample.txt",
            "Sample.txt 2012-05-15 131513.txt",
            true
        ));
        assert!(is_matching_version("notes", "notes 2024-01-31 235959", true));
    }

    #[test]
    fn mismatched_versions_fail() {
        // missing duplicated extension
        assert!(!is_matching_version(
            "Sample.txt",
            "Sample.txt 2012-05-15 131513",
            true
        ));
        // malformed timestamp
        assert!(!is_matching_version(
            "Sample.txt",
            "Sample.txt 2012-5-15 131513.txt",
            true
        ));
        // different stem
        assert!(!is_matching_version(
            "Sample.txt",
            "Other.txt 2012-05-15 131513.txt",
            true
        ));
        // trailing garbage
        assert!(!is_matching_version(
            "Sample.txt",
            "Sample.txt 2012-05-15 131513.txt~",
            true
        ));
    }

    #[test]
    fn case_policy_applies_to_name_and_extension() {
        assert!(is_matching_version(
            "Sample.TXT",
            "sample.txt 2012-05-15 131513.txt",
            false
        ));
        assert!(!is_matching_version(
            "Sample.TXT",
            "sample.txt 2012-05-15 131513.txt",
            true
        ));
    }

    #[test]
    fn extension_extraction() {
        assert_eq!(extension_of("a/b/c.txt"), ".txt");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("no_ext"), "");
        // a dot in a folder name is not an extension
        assert_eq!(extension_of("v1.2/readme"), "");
    }
}
