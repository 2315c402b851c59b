//! Database-driven two-way direction resolution.

use compare::same_file_time;
use db::{FolderStatus, InSyncFile, InSyncFolder, InSyncLink};
use model::{
    BaseFolderPair, Category, CompareVariant, Direction, FilePair, FolderContainer, FolderPair,
    Side, SymlinkPair,
};

use crate::table::{TEMP_FILE_ENDING, one_sided_temp_direction};

const TXT_BOTH_SIDES_CHANGED: &str = "Both sides have changed since last synchronization.";
const TXT_NO_SIDE_CHANGED: &str =
    "Cannot determine sync-direction: no change since last synchronization.";
const TXT_DB_NOT_IN_SYNC: &str =
    "Cannot determine sync-direction: the database entry is not in sync considering current settings.";

/// Tolerance of the *visual* change test against the database.
///
/// Independent of the comparison tolerance: copying to FAT may shift a
/// stored time by up to two seconds regardless of settings.
const VISUAL_TOLERANCE: i64 = 2;

struct Context {
    variant: CompareVariant,
    tolerance: i64,
}

pub(crate) fn execute(base: &mut BaseFolderPair, db_root: &InSyncFolder) {
    let ctx = Context {
        variant: base.compare_variant,
        tolerance: base.file_time_tolerance_secs,
    };
    recurse(&ctx, &mut base.root, Some(db_root));
}

// change detection is *visual* — name, size, mtime, target — irrespective
// of the current comparison settings: moving data to another medium is
// not a change

fn file_matches_db(pair: &FilePair, side: Side, db_entry: Option<(&String, &InSyncFile)>) -> bool {
    let Some(data) = &pair.sides[side] else {
        return db_entry.is_none();
    };
    let Some((db_name, db_file)) = db_entry else {
        return false;
    };
    data.name == **db_name
        && same_file_time(data.attrs.mtime, db_file.sides[side].mtime, VISUAL_TOLERANCE)
        && data.attrs.size == db_file.size
}

fn link_matches_db(
    pair: &SymlinkPair,
    side: Side,
    db_entry: Option<(&String, &InSyncLink)>,
) -> bool {
    let Some(data) = &pair.sides[side] else {
        return db_entry.is_none();
    };
    let Some((db_name, db_link)) = db_entry else {
        return false;
    };
    data.name == **db_name
        && same_file_time(data.attrs.mtime, db_link.sides[side].mtime, VISUAL_TOLERANCE)
        && data.attrs.target == db_link.sides[side].target
}

fn folder_matches_db(
    pair: &FolderPair,
    side: Side,
    db_entry: Option<(&String, &InSyncFolder)>,
) -> bool {
    let straw_man = db_entry.is_some_and(|(_, d)| d.status == FolderStatus::StrawMan);
    let Some(data) = &pair.sides[side] else {
        return db_entry.is_none() || straw_man;
    };
    match db_entry {
        Some((db_name, _)) if !straw_man => data.name == **db_name,
        _ => false,
    }
}

/// Whether a database entry is still in sync under the *current*
/// comparison settings.
pub(crate) fn file_still_in_sync(db_file: &InSyncFile, variant: CompareVariant, tolerance: i64) -> bool {
    match variant {
        CompareVariant::TimeSize => {
            // a content-verified entry is already good enough
            db_file.cmp_var == CompareVariant::Content
                || same_file_time(
                    db_file.sides[Side::Left].mtime,
                    db_file.sides[Side::Right].mtime,
                    tolerance,
                )
        }
        CompareVariant::Content => db_file.cmp_var == CompareVariant::Content,
    }
}

fn link_still_in_sync(db_link: &InSyncLink, variant: CompareVariant, tolerance: i64) -> bool {
    match variant {
        CompareVariant::TimeSize => {
            db_link.cmp_var == CompareVariant::Content
                || same_file_time(
                    db_link.sides[Side::Left].mtime,
                    db_link.sides[Side::Right].mtime,
                    tolerance,
                )
        }
        CompareVariant::Content => db_link.cmp_var == CompareVariant::Content,
    }
}

fn recurse(ctx: &Context, container: &mut FolderContainer, db_level: Option<&InSyncFolder>) {
    for pair in &mut container.files {
        process_file(ctx, pair, db_level);
    }
    for pair in &mut container.symlinks {
        process_symlink(ctx, pair, db_level);
    }
    for pair in &mut container.folders {
        process_folder(ctx, pair, db_level);
    }
}

fn process_file(ctx: &Context, pair: &mut FilePair, db_level: Option<&InSyncFolder>) {
    let category = pair.category();
    if category == Category::Equal {
        return;
    }

    // leftover temp files of an aborted prior run are always deleted
    if let Some(direction) = one_sided_temp_direction(category, pair.ref_name()) {
        pair.set_direction(direction);
        return;
    }

    let db_entry = db_level.and_then(|level| level.files.get_key_value(pair.ref_name()));

    let changed_left = !file_matches_db(pair, Side::Left, db_entry);
    let changed_right = !file_matches_db(pair, Side::Right, db_entry);

    if changed_left != changed_right {
        let usable = db_entry
            .is_none_or(|(_, db_file)| file_still_in_sync(db_file, ctx.variant, ctx.tolerance));
        if usable {
            pair.set_direction(if changed_left {
                Direction::Right
            } else {
                Direction::Left
            });
        } else {
            pair.set_direction_conflict(TXT_DB_NOT_IN_SYNC);
        }
    } else if changed_left {
        pair.set_direction_conflict(TXT_BOTH_SIDES_CHANGED);
    } else {
        pair.set_direction_conflict(TXT_NO_SIDE_CHANGED);
    }
}

fn process_symlink(ctx: &Context, pair: &mut SymlinkPair, db_level: Option<&InSyncFolder>) {
    if pair.category() == Category::Equal {
        return;
    }

    let db_entry = db_level.and_then(|level| level.symlinks.get_key_value(pair.ref_name()));

    let changed_left = !link_matches_db(pair, Side::Left, db_entry);
    let changed_right = !link_matches_db(pair, Side::Right, db_entry);

    if changed_left != changed_right {
        let usable = db_entry
            .is_none_or(|(_, db_link)| link_still_in_sync(db_link, ctx.variant, ctx.tolerance));
        if usable {
            pair.set_direction(if changed_left {
                Direction::Right
            } else {
                Direction::Left
            });
        } else {
            pair.set_direction_conflict(TXT_DB_NOT_IN_SYNC);
        }
    } else if changed_left {
        pair.set_direction_conflict(TXT_BOTH_SIDES_CHANGED);
    } else {
        pair.set_direction_conflict(TXT_NO_SIDE_CHANGED);
    }
}

fn process_folder(ctx: &Context, pair: &mut FolderPair, db_level: Option<&InSyncFolder>) {
    let category = pair.category();

    // abandoned temporary folders: delete the whole subtree on its side
    if category == Category::LeftOnly && pair.ref_name().ends_with(TEMP_FILE_ENDING) {
        pair.set_direction_recursive(Direction::Left);
        return;
    }
    if category == Category::RightOnly && pair.ref_name().ends_with(TEMP_FILE_ENDING) {
        pair.set_direction_recursive(Direction::Right);
        return;
    }

    let db_entry = db_level.and_then(|level| level.folders.get_key_value(pair.ref_name()));

    if category != Category::Equal {
        let changed_left = !folder_matches_db(pair, Side::Left, db_entry);
        let changed_right = !folder_matches_db(pair, Side::Right, db_entry);

        if changed_left != changed_right {
            // folder entries carry no comparison-variant-dependent state
            pair.set_direction(if changed_left {
                Direction::Right
            } else {
                Direction::Left
            });
        } else if changed_left {
            pair.set_direction_conflict(TXT_BOTH_SIDES_CHANGED);
        } else {
            pair.set_direction_conflict(TXT_NO_SIDE_CHANGED);
        }
    }

    recurse(ctx, &mut pair.children, db_entry.map(|(_, sub)| sub));
}
