//! End-to-end scenarios: compare, resolve, synchronize against real
//! directories.

use std::fs;
use std::sync::Arc;

use filetime::FileTime;

use engine::{SyncSummary, synchronize};
use filters::{NameFilter, PathFilter, SoftFilter};
use lock::LockRegistry;
use model::{
    DeletionPolicy, DirectionConfig, FolderPairConfig, IdIssuer, MainConfig, SyncVariant,
    VersioningStyle,
};
use status::{Phase, ProcessCallback};
use versioning::Versioner;
use vfs::phrase::DeviceRegistry;
use vfs::{AbstractPath, AfsPath, ErrorChoice, FileError};

struct StrictCallback;

impl ProcessCallback for StrictCallback {
    fn init_phase(&mut self, _: i64, _: i64, _: Phase) {}
    fn update_progress(&mut self, _: i64, _: i64) {}
    fn report_status(&mut self, _: &str) {}
    fn request_ui_refresh(&mut self) -> Result<(), FileError> {
        Ok(())
    }
    fn report_info(&mut self, _: &str) {}
    fn report_warning(&mut self, _: &str, _: &mut bool) {}
    fn handle_error(&mut self, message: &str) -> ErrorChoice {
        panic!("unexpected filesystem error: {message}");
    }
    fn report_fatal(&mut self, message: &str) {
        panic!("fatal error: {message}");
    }
}

fn set_mtime(path: &std::path::Path, secs: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

fn mtime_of(path: &std::path::Path) -> i64 {
    FileTime::from_last_modification_time(&fs::metadata(path).unwrap()).unix_seconds()
}

fn config_for(left: &std::path::Path, right: &std::path::Path) -> MainConfig {
    MainConfig {
        pairs: vec![FolderPairConfig::new(
            left.to_string_lossy(),
            right.to_string_lossy(),
        )],
        create_locks: false,
        ..MainConfig::default()
    }
}

fn run_sync(cfg: &MainConfig) -> SyncSummary {
    let devices = DeviceRegistry::with_native();
    let locks = LockRegistry::new();
    let mut ids = IdIssuer::new();
    let mut cb = StrictCallback;

    let mut comparison = compare::compare(cfg, &devices, &locks, &mut ids, &mut cb).unwrap();

    for (index, base) in comparison.base_pairs.iter_mut().enumerate() {
        let direction_cfg = cfg.direction_for_pair(index);
        resolve::redetermine_sync_directions(&direction_cfg, base, &mut cb).unwrap();

        let case_sensitive = base.base.left.device.is_case_sensitive();
        let name_filter = PathFilter::single(NameFilter::from_config(&cfg.filter, case_sensitive));
        resolve::apply_filtering(base, &name_filter, &SoftFilter::from_options(&cfg.soft_filter));
    }

    let versioner = cfg.versioning_folder.as_ref().map(|folder| {
        Arc::new(
            Versioner::new(
                AbstractPath::new(
                    Arc::new(vfs::native::NativeDevice::new(folder.into())),
                    AfsPath::ROOT,
                ),
                cfg.versioning_style,
            )
            .unwrap(),
        )
    });

    synchronize(cfg, &mut comparison.base_pairs, versioner, &mut cb).unwrap()
}

#[test]
fn empty_folders_sync_to_a_no_op_with_database() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();

    let summary = run_sync(&config_for(left.path(), right.path()));
    assert_eq!(summary, SyncSummary::default());
    // the database records the (empty) in-sync state on both sides
    assert!(left.path().join(db::DB_FILE_NAME).exists());
    assert!(right.path().join(db::DB_FILE_NAME).exists());
}

#[test]
fn mirror_copies_new_file_with_size_and_mtime() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    fs::write(left.path().join("a.txt"), b"0123456789").unwrap();
    set_mtime(&left.path().join("a.txt"), 1_500_000_000);

    let mut cfg = config_for(left.path(), right.path());
    cfg.direction = DirectionConfig {
        variant: SyncVariant::Mirror,
        detect_moves: false,
    };

    let summary = run_sync(&cfg);
    assert_eq!(summary.items_created, 1);

    let target = right.path().join("a.txt");
    assert_eq!(fs::read(&target).unwrap(), b"0123456789");
    assert_eq!(mtime_of(&target), 1_500_000_000);
}

#[test]
fn equal_files_cause_no_io() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    for dir in [left.path(), right.path()] {
        fs::write(dir.join("same.txt"), b"stable").unwrap();
        set_mtime(&dir.join("same.txt"), 1_400_000_000);
    }

    let summary = run_sync(&config_for(left.path(), right.path()));
    assert_eq!(summary.items_created, 0);
    assert_eq!(summary.items_deleted, 0);
    assert_eq!(summary.items_overwritten, 0);
}

#[test]
fn two_way_propagates_a_change_after_the_first_sync() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    fs::write(left.path().join("doc.txt"), b"version 1!").unwrap();
    set_mtime(&left.path().join("doc.txt"), 1_500_000_000);

    let cfg = config_for(left.path(), right.path());
    run_sync(&cfg); // first run: copy to the right, write the database

    // user grows the left copy
    fs::write(left.path().join("doc.txt"), b"version 2 is longer").unwrap();
    set_mtime(&left.path().join("doc.txt"), 1_500_000_500);

    let summary = run_sync(&cfg);
    assert_eq!(summary.items_overwritten, 1);
    assert_eq!(summary.conflicts_skipped, 0);

    assert_eq!(
        fs::read(right.path().join("doc.txt")).unwrap(),
        b"version 2 is longer"
    );
    assert_eq!(mtime_of(&right.path().join("doc.txt")), 1_500_000_500);
}

#[test]
fn two_way_propagates_a_deletion() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    fs::write(left.path().join("temp.txt"), b"data").unwrap();
    set_mtime(&left.path().join("temp.txt"), 1_500_000_000);

    let mut cfg = config_for(left.path(), right.path());
    cfg.deletion = DeletionPolicy::Permanent;
    run_sync(&cfg);
    assert!(right.path().join("temp.txt").exists());

    fs::remove_file(left.path().join("temp.txt")).unwrap();

    let summary = run_sync(&cfg);
    assert_eq!(summary.items_deleted, 1);
    assert!(!right.path().join("temp.txt").exists());
}

#[test]
fn both_sides_changed_is_skipped_with_a_conflict() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    fs::write(left.path().join("c.txt"), b"base").unwrap();
    set_mtime(&left.path().join("c.txt"), 1_500_000_000);

    let mut cfg = config_for(left.path(), right.path());
    cfg.deletion = DeletionPolicy::Permanent;
    run_sync(&cfg);

    // deleted on the left, rewritten on the right
    fs::remove_file(left.path().join("c.txt")).unwrap();
    fs::write(right.path().join("c.txt"), b"independent").unwrap();
    set_mtime(&right.path().join("c.txt"), 1_500_000_900);

    let summary = run_sync(&cfg);
    assert_eq!(summary.conflicts_skipped, 1);
    // nothing was changed
    assert!(!left.path().join("c.txt").exists());
    assert_eq!(fs::read(right.path().join("c.txt")).unwrap(), b"independent");
}

#[test]
fn rename_is_executed_as_a_single_move() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    fs::write(left.path().join("a.txt"), b"payload stays identical").unwrap();
    set_mtime(&left.path().join("a.txt"), 1_500_000_000);

    let cfg = config_for(left.path(), right.path());
    run_sync(&cfg);

    // rename keeps the inode, so the recorded file id still matches
    fs::rename(left.path().join("a.txt"), left.path().join("b.txt")).unwrap();

    let summary = run_sync(&cfg);
    assert_eq!(summary.items_moved, 1);
    assert_eq!(summary.items_created, 0);
    assert_eq!(summary.items_deleted, 0);

    assert!(right.path().join("b.txt").exists());
    assert!(!right.path().join("a.txt").exists());
    assert_eq!(
        fs::read(right.path().join("b.txt")).unwrap(),
        b"payload stays identical"
    );
}

#[test]
fn folder_trees_are_created_and_removed_in_order() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    fs::create_dir_all(left.path().join("outer/inner")).unwrap();
    fs::write(left.path().join("outer/inner/deep.txt"), b"d").unwrap();

    let mut cfg = config_for(left.path(), right.path());
    cfg.direction = DirectionConfig {
        variant: SyncVariant::Mirror,
        detect_moves: false,
    };
    cfg.deletion = DeletionPolicy::Permanent;

    let summary = run_sync(&cfg);
    assert_eq!(summary.items_created, 3); // two folders + one file
    assert!(right.path().join("outer/inner/deep.txt").exists());

    fs::remove_dir_all(left.path().join("outer")).unwrap();
    let summary = run_sync(&cfg);
    assert_eq!(summary.items_deleted, 3);
    assert!(!right.path().join("outer").exists());
}

#[test]
fn versioning_preserves_superseded_files() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();

    fs::write(left.path().join("doc.txt"), b"old content").unwrap();
    set_mtime(&left.path().join("doc.txt"), 1_500_000_000);

    let mut cfg = config_for(left.path(), right.path());
    cfg.deletion = DeletionPolicy::Versioning;
    cfg.versioning_folder = Some(store.path().to_string_lossy().into_owned());
    cfg.versioning_style = VersioningStyle::TimestampFile;
    run_sync(&cfg);

    // the left copy is deleted; the right copy must end up versioned, not
    // destroyed
    fs::remove_file(left.path().join("doc.txt")).unwrap();
    let summary = run_sync(&cfg);
    assert_eq!(summary.items_deleted, 1);
    assert!(!right.path().join("doc.txt").exists());

    let versions: Vec<_> = fs::read_dir(store.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(versions.len(), 1);
    assert!(
        versioning::is_matching_version("doc.txt", &versions[0], true),
        "unexpected version name: {}",
        versions[0]
    );
    assert_eq!(
        fs::read(store.path().join(&versions[0])).unwrap(),
        b"old content"
    );
}

#[test]
fn update_variant_leaves_extra_target_files_alone() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    fs::write(left.path().join("new.txt"), b"n").unwrap();
    fs::write(right.path().join("extra.txt"), b"e").unwrap();

    let mut cfg = config_for(left.path(), right.path());
    cfg.direction = DirectionConfig {
        variant: SyncVariant::Update,
        detect_moves: false,
    };

    let summary = run_sync(&cfg);
    assert_eq!(summary.items_created, 1);
    assert_eq!(summary.items_deleted, 0);
    assert!(right.path().join("new.txt").exists());
    assert!(right.path().join("extra.txt").exists());
}

#[test]
fn leftover_temp_files_are_cleaned_up() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    fs::write(left.path().join("stale.txt.ffs_tmp"), b"debris").unwrap();

    let mut cfg = config_for(left.path(), right.path());
    cfg.deletion = DeletionPolicy::Permanent;

    let summary = run_sync(&cfg);
    assert_eq!(summary.items_deleted, 1);
    assert!(!left.path().join("stale.txt.ffs_tmp").exists());
}

#[test]
fn excluded_items_are_not_touched() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    fs::write(left.path().join("wanted.txt"), b"w").unwrap();
    fs::write(left.path().join("secret.key"), b"s").unwrap();

    let mut cfg = config_for(left.path(), right.path());
    cfg.direction = DirectionConfig {
        variant: SyncVariant::Mirror,
        detect_moves: false,
    };
    cfg.filter.exclude = "*.key".into();

    run_sync(&cfg);
    assert!(right.path().join("wanted.txt").exists());
    assert!(!right.path().join("secret.key").exists());
}
