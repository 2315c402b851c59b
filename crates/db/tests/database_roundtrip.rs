//! Scenario tests for database load/save against real files.

use std::sync::Arc;

use model::{
    BaseFolderPair, BySide, Category, CompareVariant, FileDescriptor, FileSide, FilterConfig,
    FolderSide, IdIssuer, LinkDescriptor, LinkSide, Side,
};
use vfs::native::NativeDevice;
use vfs::{AbstractPath, AfsPath, FileErrorKind, FileId};

use db::{FolderStatus, load_last_synchronous_state, save_to_disk};

fn base_pair(left: &std::path::Path, right: &std::path::Path) -> BaseFolderPair {
    BaseFolderPair::new(
        BySide::new(
            AbstractPath::new(Arc::new(NativeDevice::new(left.to_path_buf())), AfsPath::ROOT),
            AbstractPath::new(Arc::new(NativeDevice::new(right.to_path_buf())), AfsPath::ROOT),
        ),
        CompareVariant::TimeSize,
        2,
        FilterConfig::default(),
    )
}

fn file_side(name: &str, mtime: i64, size: u64, id: u8) -> Option<FileSide> {
    Some(FileSide {
        name: name.to_owned(),
        attrs: FileDescriptor {
            mtime,
            size,
            file_id: FileId(vec![id]),
        },
    })
}

#[test]
fn missing_database_reports_not_existing() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    let base = base_pair(left.path(), right.path());

    let err = load_last_synchronous_state(&base).unwrap_err();
    assert_eq!(err.kind(), FileErrorKind::DatabaseNotExisting);
}

#[test]
fn roundtrip_preserves_equal_items() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    let mut base = base_pair(left.path(), right.path());
    let mut ids = IdIssuer::new();

    base.root.add_file(
        &mut ids,
        file_side("a.txt", 1000, 10, 1),
        file_side("a.txt", 1001, 10, 2),
        Category::Equal,
    );
    base.root.add_symlink(
        &mut ids,
        Some(LinkSide {
            name: "ln".into(),
            attrs: LinkDescriptor {
                mtime: 500,
                target: "a.txt".into(),
            },
        }),
        Some(LinkSide {
            name: "ln".into(),
            attrs: LinkDescriptor {
                mtime: 500,
                target: "a.txt".into(),
            },
        }),
        Category::Equal,
    );
    let folder = base.root.add_folder(
        &mut ids,
        Some(FolderSide { name: "sub".into() }),
        Some(FolderSide { name: "sub".into() }),
        Category::Equal,
    );
    folder.children.add_file(
        &mut ids,
        file_side("inner", 2000, 5, 3),
        file_side("inner", 2000, 5, 4),
        Category::Equal,
    );

    save_to_disk(&base).unwrap();
    let state = load_last_synchronous_state(&base).unwrap();

    let file = &state.files["a.txt"];
    assert_eq!(file.size, 10);
    assert_eq!(file.sides[Side::Left].mtime, 1000);
    assert_eq!(file.sides[Side::Right].mtime, 1001);
    assert_eq!(file.sides[Side::Left].file_id, FileId(vec![1]));
    assert_eq!(file.sides[Side::Right].file_id, FileId(vec![2]));

    assert_eq!(state.symlinks["ln"].sides[Side::Left].target, "a.txt");

    let sub = &state.folders["sub"];
    assert_eq!(sub.status, FolderStatus::InSync);
    assert_eq!(sub.files["inner"].sides[Side::Right].file_id, FileId(vec![4]));
}

#[test]
fn non_equal_items_are_not_recorded_initially() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    let mut base = base_pair(left.path(), right.path());
    let mut ids = IdIssuer::new();

    base.root.add_file(
        &mut ids,
        file_side("only-left", 100, 1, 1),
        None,
        Category::LeftOnly,
    );

    save_to_disk(&base).unwrap();
    let state = load_last_synchronous_state(&base).unwrap();
    assert!(state.files.is_empty());
}

#[test]
fn temporary_change_keeps_previous_in_sync_knowledge() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    let mut base = base_pair(left.path(), right.path());
    let mut ids = IdIssuer::new();

    base.root.add_file(
        &mut ids,
        file_side("a.txt", 1000, 10, 1),
        file_side("a.txt", 1000, 10, 2),
        Category::Equal,
    );
    save_to_disk(&base).unwrap();

    // the user edits the left copy; the pair is no longer equal, but the
    // database must keep the last synchronous state
    let mut changed = base_pair(left.path(), right.path());
    changed.root.add_file(
        &mut ids,
        file_side("a.txt", 2000, 12, 1),
        file_side("a.txt", 1000, 10, 2),
        Category::LeftNewer,
    );
    save_to_disk(&changed).unwrap();

    let state = load_last_synchronous_state(&changed).unwrap();
    let file = &state.files["a.txt"];
    assert_eq!(file.size, 10);
    assert_eq!(file.sides[Side::Left].mtime, 1000);
}

#[test]
fn unchanged_payload_skips_the_write() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    let mut base = base_pair(left.path(), right.path());
    let mut ids = IdIssuer::new();

    base.root.add_file(
        &mut ids,
        file_side("a.txt", 1000, 10, 1),
        file_side("a.txt", 1000, 10, 2),
        Category::Equal,
    );
    save_to_disk(&base).unwrap();

    let db_file = left.path().join(db::DB_FILE_NAME);
    let before = std::fs::read(&db_file).unwrap();
    let mtime_before = std::fs::metadata(&db_file).unwrap().modified().unwrap();

    save_to_disk(&base).unwrap();

    assert_eq!(std::fs::read(&db_file).unwrap(), before);
    assert_eq!(
        std::fs::metadata(&db_file).unwrap().modified().unwrap(),
        mtime_before
    );
}

#[test]
fn straw_man_folder_carries_children() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    let mut base = base_pair(left.path(), right.path());
    let mut ids = IdIssuer::new();

    // the folder exists only on the left, but an inner file pair is equal
    // (e.g. matched through a case-only folder rename)
    let folder = base.root.add_folder(
        &mut ids,
        Some(FolderSide { name: "dir".into() }),
        None,
        Category::LeftOnly,
    );
    folder.children.add_file(
        &mut ids,
        file_side("x", 100, 1, 1),
        file_side("x", 100, 1, 2),
        Category::Equal,
    );

    save_to_disk(&base).unwrap();
    let state = load_last_synchronous_state(&base).unwrap();

    let dir = &state.folders["dir"];
    assert_eq!(dir.status, FolderStatus::StrawMan);
    assert_eq!(dir.files["x"].size, 1);
}

#[test]
fn no_temp_files_remain_after_save() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    let mut base = base_pair(left.path(), right.path());
    let mut ids = IdIssuer::new();

    base.root.add_file(
        &mut ids,
        file_side("f", 1, 1, 1),
        file_side("f", 1, 1, 2),
        Category::Equal,
    );
    save_to_disk(&base).unwrap();

    for dir in [left.path(), right.path()] {
        let tmp: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect();
        assert!(tmp.is_empty(), "temp files left: {tmp:?}");
    }
}
