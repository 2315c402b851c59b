//! Versioning scenarios against real directories.

use std::fs;
use std::sync::Arc;

use model::VersioningStyle;
use time::macros::datetime;
use vfs::native::NativeDevice;
use vfs::{AbstractPath, AfsPath, FileError};

use versioning::{Versioner, is_matching_version};

fn base_at(root: &std::path::Path) -> AbstractPath {
    AbstractPath::new(Arc::new(NativeDevice::new(root.to_path_buf())), AfsPath::ROOT)
}

fn versioner(root: &std::path::Path, style: VersioningStyle) -> Versioner {
    Versioner::with_timestamp(base_at(root), style, &datetime!(2024-03-05 14:30:59 UTC)).unwrap()
}

fn no_progress() -> impl FnMut(u64) -> Result<(), FileError> {
    |_| Ok(())
}

#[test]
fn timestamped_file_lands_under_relative_path() {
    let source_dir = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    fs::create_dir_all(source_dir.path().join("sub")).unwrap();
    fs::write(source_dir.path().join("sub/Sample.txt"), b"v1").unwrap();

    let v = versioner(store.path(), VersioningStyle::TimestampFile);
    let mut progress = no_progress();
    let processed = v
        .revision_file(
            &base_at(source_dir.path()).join("sub").join("Sample.txt"),
            "sub/Sample.txt",
            &mut progress,
        )
        .unwrap();

    assert!(processed);
    assert!(!source_dir.path().join("sub/Sample.txt").exists());
    let versioned = store.path().join("sub/Sample.txt 2024-03-05 143059.txt");
    assert_eq!(fs::read(&versioned).unwrap(), b"v1");
    assert!(is_matching_version(
        "Sample.txt",
        "Sample.txt 2024-03-05 143059.txt",
        true
    ));
}

#[test]
fn missing_source_is_silently_skipped() {
    let source_dir = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();

    let v = versioner(store.path(), VersioningStyle::TimestampFile);
    let mut progress = no_progress();
    let processed = v
        .revision_file(&base_at(source_dir.path()).join("ghost"), "ghost", &mut progress)
        .unwrap();
    assert!(!processed);
}

#[test]
fn replace_style_overwrites_previous_version() {
    let source_dir = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();

    let v = versioner(store.path(), VersioningStyle::Replace);

    fs::write(source_dir.path().join("doc"), b"first").unwrap();
    let mut progress = no_progress();
    v.revision_file(&base_at(source_dir.path()).join("doc"), "doc", &mut progress)
        .unwrap();
    assert_eq!(fs::read(store.path().join("doc")).unwrap(), b"first");

    fs::write(source_dir.path().join("doc"), b"second").unwrap();
    let mut progress = no_progress();
    v.revision_file(&base_at(source_dir.path()).join("doc"), "doc", &mut progress)
        .unwrap();
    assert_eq!(fs::read(store.path().join("doc")).unwrap(), b"second");
}

#[test]
fn folder_revision_moves_children_and_removes_shell() {
    let source_dir = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    fs::create_dir_all(source_dir.path().join("old/deeper")).unwrap();
    fs::write(source_dir.path().join("old/a.txt"), b"a").unwrap();
    fs::write(source_dir.path().join("old/deeper/b"), b"b").unwrap();

    let v = versioner(store.path(), VersioningStyle::TimestampFile);
    let mut progress = no_progress();
    v.revision_folder(&base_at(source_dir.path()).join("old"), "old", &mut progress)
        .unwrap();

    assert!(!source_dir.path().join("old").exists());
    assert!(store.path().join("old/a.txt 2024-03-05 143059.txt").exists());
    assert!(store.path().join("old/deeper/b 2024-03-05 143059").exists());
}

#[test]
fn intermediate_folders_are_created_on_demand() {
    let source_dir = tempfile::tempdir().unwrap();
    let store_parent = tempfile::tempdir().unwrap();
    // the store itself does not exist yet
    let store = store_parent.path().join("revisions");
    fs::write(source_dir.path().join("f"), b"x").unwrap();

    let v = Versioner::with_timestamp(
        base_at(&store),
        VersioningStyle::TimestampFile,
        &datetime!(2024-03-05 14:30:59 UTC),
    )
    .unwrap();
    let mut progress = no_progress();
    // versioning an item below a missing subtree creates the tree
    let source = base_at(source_dir.path()).join("f");
    v.revision_file(&source, "nested/f", &mut progress).unwrap();

    assert!(store.join("nested/f 2024-03-05 143059").exists());
}
