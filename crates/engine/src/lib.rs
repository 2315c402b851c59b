#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The sync executor: turns the resolver's per-item directions into
//! filesystem operations, one base-folder pair at a time, respecting the
//! ordering constraints that keep a half-finished run recoverable:
//!
//! 1. folders to create are processed top-down,
//! 2. files and symlinks are processed once their parent exists,
//! 3. folders to delete are processed bottom-up, after all enclosed
//!    deletions.
//!
//! Overwrites run through the transactional copy with the target's
//! superseded content routed to the versioner, the recycler, or plain
//! deletion. Resolver-detected moves become a single same-device rename;
//! when the rename is impossible they degrade to copy+delete and the
//! reported workload grows accordingly.
//!
//! Every externally visible filesystem call runs under the retry
//! protocol; the cooperative abort signal unwinds with in-flight
//! transactional copies cleaning their temp files on the way out.

mod deletion;
mod executor;

use std::sync::Arc;

use model::{BaseFolderPair, MainConfig, SyncVariant};
use status::{Phase, ProcessCallback};
use tracing::info;
use versioning::Versioner;
use vfs::FileError;

pub use crate::deletion::DeletionHandler;

/// Outcome counters of one sync run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub items_created: u64,
    pub items_overwritten: u64,
    pub items_deleted: u64,
    pub items_moved: u64,
    pub metadata_updated: u64,
    /// Conflict rows skipped; the run finishes with a warning when > 0.
    pub conflicts_skipped: u64,
    /// Recoverable errors the callback chose to ignore.
    pub errors_ignored: u64,
}

impl SyncSummary {
    fn absorb(&mut self, other: &SyncSummary) {
        self.items_created += other.items_created;
        self.items_overwritten += other.items_overwritten;
        self.items_deleted += other.items_deleted;
        self.items_moved += other.items_moved;
        self.metadata_updated += other.metadata_updated;
        self.conflicts_skipped += other.conflicts_skipped;
        self.errors_ignored += other.errors_ignored;
    }
}

/// Executes the plan over every base-folder pair.
///
/// Empty pairs are pruned afterwards and, where the direction settings
/// rely on it, the last-in-sync database is written per pair — so a crash
/// between pairs loses at most the unfinished pair's bookkeeping.
pub fn synchronize(
    cfg: &MainConfig,
    base_pairs: &mut [BaseFolderPair],
    versioner: Option<Arc<Versioner>>,
    callback: &mut dyn ProcessCallback,
) -> Result<SyncSummary, FileError> {
    let (objects, bytes) = executor::estimate_workload(base_pairs);
    callback.init_phase(objects, bytes, Phase::Synchronizing);

    let mut summary = SyncSummary::default();

    for (index, base_pair) in base_pairs.iter_mut().enumerate() {
        let direction_cfg = cfg.direction_for_pair(index);

        let conflicts = executor::count_conflicts(&base_pair.root);
        if conflicts > 0 {
            let mut dont_show = false;
            callback.report_warning(
                &format!("{conflicts} conflict item(s) will not be synchronized."),
                &mut dont_show,
            );
        }

        let pair_summary = executor::synchronize_pair(cfg, base_pair, versioner.clone(), callback)?;
        summary.absorb(&pair_summary);
        summary.conflicts_skipped += conflicts;

        base_pair.root.prune_empty();

        let needs_database =
            matches!(direction_cfg.variant, SyncVariant::TwoWay) || direction_cfg.detect_moves;
        // a side that was missing at scan time has no place for a database
        let sides_present = base_pair.dir_exists.left && base_pair.dir_exists.right;
        if needs_database && sides_present {
            match status::try_reporting_error(callback, || db::save_to_disk(base_pair)) {
                Ok(Some(())) => {}
                Ok(None) => summary.errors_ignored += 1,
                Err(e) => return Err(e),
            }
        }
        info!(pair = index, "base folder pair synchronized");
    }

    Ok(summary)
}
