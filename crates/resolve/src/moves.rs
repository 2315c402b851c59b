//! Re-linking one-sided leftovers as moves via recorded file ids.
//!
//! A rename shows up as a `LeftOnly` item (the new name) plus a
//! `RightOnly` remnant on the partner side (the old name, still present
//! there). When the database knows both recorded file ids of the original
//! in-sync file, the two pairs are cross-linked so the executor can issue
//! a single rename instead of copy+delete.
//!
//! File ids are not reliable on FAT-family volumes; candidates with
//! duplicated ids (hardlink or symlink aliasing) are disqualified rather
//! than guessed at, and a pair never participates in two moves.

use rustc_hash::FxHashMap;
use tracing::debug;

use compare::same_file_time;
use db::{InSyncFile, InSyncFolder};
use model::{BaseFolderPair, Category, FilePair, FolderContainer, ObjectId, Side};
use vfs::FileId;

use crate::two_way::file_still_in_sync;

/// Tolerance matching the database's visual change test.
const VISUAL_TOLERANCE: i64 = 2;

pub(crate) fn detect_moved_files(base: &mut BaseFolderPair, db_root: &InSyncFolder) {
    let mut candidates = Candidates::default();
    collect(&base.root, &mut candidates);
    if candidates.left_only.is_empty() || candidates.right_only.is_empty() {
        return;
    }

    let ctx = MatchContext {
        variant: base.compare_variant,
        tolerance: base.file_time_tolerance_secs,
    };
    link_pairs(base, db_root, &candidates, &ctx);
}

struct MatchContext {
    variant: model::CompareVariant,
    tolerance: i64,
}

/// One-sided pairs by their file id; `None` marks duplicated ids.
#[derive(Default)]
struct Candidates {
    left_only: FxHashMap<FileId, Option<ObjectId>>,
    right_only: FxHashMap<FileId, Option<ObjectId>>,
}

fn collect(container: &FolderContainer, out: &mut Candidates) {
    for pair in &container.files {
        let (side, map) = match pair.category() {
            Category::LeftOnly => (Side::Left, &mut out.left_only),
            Category::RightOnly => (Side::Right, &mut out.right_only),
            _ => continue,
        };
        let Some(descr) = pair.descriptor(side) else {
            continue;
        };
        if descr.file_id.is_empty() {
            continue;
        }
        map.entry(descr.file_id.clone())
            .and_modify(|existing| *existing = None) // aliasing: disqualify
            .or_insert(Some(pair.id()));
    }
    for folder in &container.folders {
        collect(&folder.children, out);
    }
}

fn link_pairs(
    base: &mut BaseFolderPair,
    db_level: &InSyncFolder,
    candidates: &Candidates,
    ctx: &MatchContext,
) {
    for db_file in db_level.files.values() {
        try_link(base, db_file, candidates, ctx);
    }
    for db_sub in db_level.folders.values() {
        link_pairs(base, db_sub, candidates, ctx);
    }
}

fn same_size_and_date(pair: &FilePair, side: Side, db_file: &InSyncFile) -> bool {
    pair.descriptor(side).is_some_and(|descr| {
        descr.size == db_file.size
            && same_file_time(descr.mtime, db_file.sides[side].mtime, VISUAL_TOLERANCE)
    })
}

fn try_link(
    base: &mut BaseFolderPair,
    db_file: &InSyncFile,
    candidates: &Candidates,
    ctx: &MatchContext,
) {
    let id_left = &db_file.sides[Side::Left].file_id;
    let id_right = &db_file.sides[Side::Right].file_id;
    if id_left.is_empty()
        || id_right.is_empty()
        || !file_still_in_sync(db_file, ctx.variant, ctx.tolerance)
    {
        return;
    }

    let Some(Some(left_id)) = candidates.left_only.get(id_left) else {
        return;
    };
    let Some(Some(right_id)) = candidates.right_only.get(id_right) else {
        return;
    };
    let (left_id, right_id) = (*left_id, *right_id);

    let left_fits = base
        .root
        .find_file_by_id(left_id)
        .is_some_and(|p| p.move_ref().is_none() && same_size_and_date(p, Side::Left, db_file));
    let right_fits = base
        .root
        .find_file_by_id(right_id)
        .is_some_and(|p| p.move_ref().is_none() && same_size_and_date(p, Side::Right, db_file));
    if !left_fits || !right_fits {
        return;
    }

    debug!(?left_id, ?right_id, "move pair detected");
    base.root
        .find_file_by_id_mut(left_id)
        .expect("candidate exists")
        .set_move_ref(right_id);
    base.root
        .find_file_by_id_mut(right_id)
        .expect("candidate exists")
        .set_move_ref(left_id);
}
