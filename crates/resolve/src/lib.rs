#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The direction resolver: decides, per item, which side a sync run will
//! change. Two-way mode derives the decision from the last-in-sync
//! database — the side that *visually* changed since the last run is the
//! side whose state wins; one-way modes apply a pure lookup table from
//! category to direction. Afterwards, one-sided leftovers are re-linked
//! as moves via their recorded file ids, stale `*.ffs_tmp` remnants are
//! scheduled for deletion, and the name/soft filters set each pair's
//! active flag.
//!
//! # Conflicts
//!
//! Two-way resolution marks a pair as conflict instead of guessing:
//! when both sides changed, when neither side changed (yet the pair is
//! not equal), and when the database entry itself is not in sync under
//! the current comparison settings.

mod filter_apply;
mod moves;
mod table;
mod two_way;

use db::InSyncFolder;
use model::{BaseFolderPair, DirectionConfig, DirectionSet, SyncVariant};
use status::ProcessCallback;
use tracing::debug;
use vfs::{FileError, FileErrorKind};

pub use crate::filter_apply::{apply_filtering, apply_time_span_filter};

/// Resolves sync directions for one base-folder pair.
///
/// Database problems are never fatal here: a missing database falls back
/// to the default direction policy silently, any other database error
/// falls back with a warning.
pub fn redetermine_sync_directions(
    cfg: &DirectionConfig,
    base: &mut BaseFolderPair,
    callback: &mut dyn ProcessCallback,
) -> Result<(), FileError> {
    let mut last_sync: Option<InSyncFolder> = None;

    if matches!(cfg.variant, SyncVariant::TwoWay) || cfg.detect_moves {
        if base.root.all_equal() {
            return Ok(()); // nothing to decide; don't even open the database
        }
        match db::load_last_synchronous_state(base) {
            Ok(state) => last_sync = Some(state),
            Err(e) if e.kind() == FileErrorKind::DatabaseNotExisting => {
                debug!("no database yet, using default directions");
            }
            Err(e) if e.is_abort() => return Err(e),
            Err(e) => {
                let mut dont_show = false;
                let hint = if matches!(cfg.variant, SyncVariant::TwoWay) {
                    "\nSetting default synchronization directions: old files will be overwritten with newer files."
                } else {
                    ""
                };
                callback.report_warning(&format!("{e}{hint}"), &mut dont_show);
            }
        }
    }

    match (&cfg.variant, &last_sync) {
        (SyncVariant::TwoWay, Some(state)) => two_way::execute(base, state),
        (SyncVariant::TwoWay, None) => {
            table::apply(&DirectionSet::two_way_fallback(), &mut base.root);
        }
        (SyncVariant::Mirror, _) => table::apply(&DirectionSet::mirror(), &mut base.root),
        (SyncVariant::Update, _) => table::apply(&DirectionSet::update(), &mut base.root),
        (SyncVariant::Custom(set), _) => table::apply(set, &mut base.root),
    }

    if let Some(state) = &last_sync {
        moves::detect_moved_files(base, state);
    }
    Ok(())
}
