//! Integration tests for the native backend and the library routines
//! layered above it.

use std::fs;
use std::sync::Arc;

use vfs::ops::{
    copy_file_transactional, create_folder_if_missing_recursive, item_type_if_exists, path_status,
    remove_folder_if_exists_recursive, rename_item,
};
use vfs::{
    AbstractPath, AfsPath, Device, ErrorChoice, FileError, FileErrorKind, FileInfo, FolderInfo,
    HandleLink, ItemType, SymlinkInfo, TraverseSink,
};

fn device_at(root: &std::path::Path) -> AbstractPath {
    AbstractPath::new(
        Arc::new(vfs::native::NativeDevice::new(root.to_path_buf())),
        AfsPath::ROOT,
    )
}

fn no_progress() -> impl FnMut(u64) -> Result<(), FileError> {
    |_| Ok(())
}

#[derive(Default)]
struct Collect {
    files: Vec<(String, u64)>,
    folders: Vec<String>,
    symlinks: Vec<String>,
}

impl TraverseSink for Collect {
    fn on_file(&mut self, info: FileInfo) {
        self.files.push((info.name, info.size));
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

#[test]
fn item_type_distinguishes_kinds() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("f.txt"), b"x").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();

    let base = device_at(dir.path());
    assert_eq!(
        base.join("f.txt").device.item_type(&AfsPath::new("f.txt").unwrap()).unwrap(),
        ItemType::File
    );
    assert_eq!(
        base.device.item_type(&AfsPath::new("sub").unwrap()).unwrap(),
        ItemType::Folder
    );
    let missing = base.device.item_type(&AfsPath::new("nope").unwrap());
    assert_eq!(missing.unwrap_err().kind(), FileErrorKind::NotExisting);
}

#[test]
fn traversal_reports_one_level() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"aaa").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub/inner.txt"), b"i").unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink("a.txt", dir.path().join("link")).unwrap();

    let base = device_at(dir.path());
    let mut sink = Collect::default();
    base.device.traverse_folder(&AfsPath::ROOT, &mut sink).unwrap();

    assert_eq!(sink.files, vec![("a.txt".to_owned(), 3)]);
    assert_eq!(sink.folders, vec!["sub".to_owned()]);
    #[cfg(unix)]
    assert_eq!(sink.symlinks, vec!["link".to_owned()]);
}

#[test]
fn create_folder_recursive_builds_missing_tail() {
    let dir = tempfile::tempdir().unwrap();
    let base = device_at(dir.path());

    let deep = base.join("a").join("b").join("c");
    create_folder_if_missing_recursive(&deep).unwrap();
    assert_eq!(item_type_if_exists(&deep).unwrap(), Some(ItemType::Folder));

    // calling again is not an error
    create_folder_if_missing_recursive(&deep).unwrap();
}

#[test]
fn path_status_reports_missing_tail() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("present")).unwrap();

    let base = device_at(dir.path());
    let probe = base.join("present").join("x").join("y");
    let status = path_status(&probe).unwrap();

    assert_eq!(status.existing_type, ItemType::Folder);
    assert_eq!(status.existing_path.path.as_str(), "present");
    assert_eq!(status.missing_tail, vec!["x".to_owned(), "y".to_owned()]);
}

#[test]
fn remove_folder_recursive_is_quiet_on_missing() {
    let dir = tempfile::tempdir().unwrap();
    let base = device_at(dir.path());

    remove_folder_if_exists_recursive(&base.join("ghost"), &mut |_| Ok(()), &mut |_| Ok(())).unwrap();

    fs::create_dir_all(dir.path().join("tree/sub")).unwrap();
    fs::write(dir.path().join("tree/f1"), b"1").unwrap();
    fs::write(dir.path().join("tree/sub/f2"), b"2").unwrap();

    let mut files_seen = 0;
    let mut folders_seen = 0;
    remove_folder_if_exists_recursive(
        &base.join("tree"),
        &mut |_| {
            files_seen += 1;
            Ok(())
        },
        &mut |_| {
            folders_seen += 1;
            Ok(())
        },
    )
    .unwrap();

    assert_eq!(files_seen, 2);
    assert_eq!(folders_seen, 2);
    assert!(!dir.path().join("tree").exists());
}

#[test]
fn rename_item_refuses_existing_target() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a"), b"a").unwrap();
    fs::write(dir.path().join("b"), b"b").unwrap();

    let base = device_at(dir.path());
    let err = rename_item(&base.join("a"), &base.join("b")).unwrap_err();
    assert_eq!(err.kind(), FileErrorKind::TargetExisting);

    rename_item(&base.join("a"), &base.join("c")).unwrap();
    assert!(!dir.path().join("a").exists());
    assert_eq!(fs::read(dir.path().join("c")).unwrap(), b"a");
}

#[test]
fn transactional_copy_replaces_target_atomically() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("src"), b"new content").unwrap();
    fs::write(dir.path().join("dst"), b"old").unwrap();

    let base = device_at(dir.path());
    let mut deleted = false;
    let mut progress = no_progress();
    copy_file_transactional(
        &base.join("src"),
        &base.join("dst"),
        false,
        true,
        Some(&mut || {
            deleted = true;
            fs::remove_file(dir.path().join("dst")).unwrap();
            Ok(())
        }),
        &mut progress,
    )
    .unwrap();

    assert!(deleted);
    assert_eq!(fs::read(dir.path().join("dst")).unwrap(), b"new content");
    // no temp file remains
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.contains(".ffs_tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
}

#[test]
fn transactional_copy_cleans_temp_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("src"), b"payload").unwrap();
    fs::write(dir.path().join("dst"), b"old").unwrap();

    let base = device_at(dir.path());
    let mut progress = no_progress();
    let result = copy_file_transactional(
        &base.join("src"),
        &base.join("dst"),
        false,
        true,
        Some(&mut || Err(vfs::FileError::other("simulated delete failure", ""))),
        &mut progress,
    );
    assert!(result.is_err());

    // target untouched, temp removed
    assert_eq!(fs::read(dir.path().join("dst")).unwrap(), b"old");
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.contains(".ffs_tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
}

#[test]
fn copy_preserves_size_and_mtime() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("src"), b"0123456789").unwrap();
    filetime::set_file_mtime(
        dir.path().join("src"),
        filetime::FileTime::from_unix_time(1_000_000_000, 0),
    )
    .unwrap();

    let base = device_at(dir.path());
    let mut progress = no_progress();
    let attrs = copy_file_transactional(
        &base.join("src"),
        &base.join("out"),
        false,
        true,
        None,
        &mut progress,
    )
    .unwrap();

    assert_eq!(attrs.file_size, 10);
    assert_eq!(attrs.mtime, 1_000_000_000);
    let meta = fs::metadata(dir.path().join("out")).unwrap();
    assert_eq!(meta.len(), 10);
    assert_eq!(
        filetime::FileTime::from_last_modification_time(&meta).unix_seconds(),
        1_000_000_000
    );
}
