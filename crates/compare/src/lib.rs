#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The compare engine: resolves configured folder pairs to abstract base
//! paths, merges filters, optionally acquires inter-process locks,
//! verifies base-folder existence with a short per-side timeout, scans
//! both sides in parallel under hard-filter pruning, merges the traversal
//! output into the paired tree, and classifies every pair — by time and
//! size, or by streaming both files' content.
//!
//! A non-existing side does not abort the run; that side of every pair is
//! simply empty. Scanning reports object counts only (total bytes are
//! unknown until classification); the content phase reports objects and
//! bytes and may shrink the reported workload when a compare
//! short-circuits on an early mismatch.

mod binary;
mod content;
mod merge;
mod probe;
mod scan;
mod time_cmp;

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use filters::{NameFilter, PathFilter};
use lock::{DirLock, LockCallback, LockRegistry};
use model::{
    BaseFolderPair, BySide, FilterConfig, IdIssuer, MainConfig, Side, SymlinkPolicy,
};
use status::{Phase, ProcessCallback};
use vfs::phrase::DeviceRegistry;
use vfs::{AbstractPath, ErrorChoice, FileError};

pub use crate::binary::files_have_same_content;
pub use crate::probe::{PROBE_TIMEOUT, folders_exist};
pub use crate::time_cmp::{TimeCompare, TimeResult, same_file_time};

use crate::merge::{MergeContext, PendingContent};
use crate::scan::{FolderScan, ScanContext, ScanEvent};

/// Result of a comparison run: one tree per configured folder pair, plus
/// the directory locks held for the rest of the session.
pub struct FolderComparison {
    pub base_pairs: Vec<BaseFolderPair>,
    locks: Vec<DirLock>,
}

impl FolderComparison {
    /// Number of directory locks held.
    #[must_use]
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }
}

struct LockCallbackAdapter<'a> {
    inner: &'a mut dyn ProcessCallback,
}

impl LockCallback for LockCallbackAdapter<'_> {
    fn update_status(&mut self, message: &str) {
        self.inner.report_status(message);
    }

    fn request_ui_refresh(&mut self) -> Result<(), FileError> {
        self.inner.request_ui_refresh()
    }
}

fn merged_filter_config(global: &FilterConfig, local: Option<&FilterConfig>) -> FilterConfig {
    match local {
        None => global.clone(),
        Some(local) => FilterConfig {
            include: format!("{}\n{}", global.include, local.include),
            exclude: format!("{}\n{}", global.exclude, local.exclude),
        },
    }
}

fn build_path_filter(
    global: &FilterConfig,
    local: Option<&FilterConfig>,
    case_sensitive: bool,
) -> PathFilter {
    let mut layers = vec![NameFilter::from_config(global, case_sensitive)];
    if let Some(local) = local {
        layers.push(NameFilter::from_config(local, case_sensitive));
    }
    PathFilter::new(layers)
}

/// Scans both sides of one pair concurrently, pumping worker events into
/// the callback.
fn scan_pair(
    base: &BySide<AbstractPath>,
    exists: BySide<bool>,
    filter: &PathFilter,
    symlink_policy: SymlinkPolicy,
    callback: &mut dyn ProcessCallback,
) -> Result<BySide<FolderScan>, FileError> {
    let abort = AtomicBool::new(false);
    let (events_tx, events_rx) = crossbeam_channel::unbounded::<ScanEvent>();

    let mut results: BySide<Result<FolderScan, FileError>> =
        BySide::new(Ok(FolderScan::default()), Ok(FolderScan::default()));

    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for side in Side::BOTH {
            if !exists[side] {
                continue;
            }
            let events = events_tx.clone();
            let abort_ref = &abort;
            let base_path = &base[side];
            handles.push((
                side,
                scope.spawn(move || {
                    let ctx = ScanContext {
                        events,
                        abort: abort_ref,
                        filter,
                        symlink_policy,
                    };
                    scan::scan_side(&ctx, base_path)
                }),
            ));
        }
        drop(events_tx);

        for event in &events_rx {
            match event {
                ScanEvent::Status(text) => callback.report_status(&text),
                ScanEvent::Items(count) => callback.update_progress(count, 0),
                ScanEvent::Error { message, reply } => {
                    let choice = if abort.load(Ordering::Relaxed) {
                        ErrorChoice::Abort
                    } else {
                        callback.handle_error(&message)
                    };
                    if choice == ErrorChoice::Abort {
                        abort.store(true, Ordering::Relaxed);
                    }
                    let _ = reply.send(choice);
                }
            }
            if !abort.load(Ordering::Relaxed) && callback.request_ui_refresh().is_err() {
                abort.store(true, Ordering::Relaxed);
            }
        }

        for (side, handle) in handles {
            results[side] = handle
                .join()
                .unwrap_or_else(|_| Err(FileError::other("Scan worker panicked.", "")));
        }
    });

    if abort.load(Ordering::Relaxed) {
        return Err(FileError::aborted());
    }
    let BySide { left, right } = results;
    Ok(BySide::new(left?, right?))
}

/// Runs the full comparison over every configured folder pair.
pub fn compare(
    cfg: &MainConfig,
    devices: &DeviceRegistry,
    lock_registry: &LockRegistry,
    ids: &mut IdIssuer,
    callback: &mut dyn ProcessCallback,
) -> Result<FolderComparison, FileError> {
    callback.init_phase(-1, -1, Phase::Scanning);

    // resolve the configured path phrases
    let mut resolved: Vec<BySide<AbstractPath>> = Vec::with_capacity(cfg.pairs.len());
    for pair_cfg in &cfg.pairs {
        resolved.push(BySide::new(
            devices.parse(&pair_cfg.left_phrase)?,
            devices.parse(&pair_cfg.right_phrase)?,
        ));
    }

    // fail fast on dead network shares
    let probe_list: Vec<AbstractPath> = resolved
        .iter()
        .flat_map(|pair| [pair.left.clone(), pair.right.clone()])
        .collect();
    let probe_results = folders_exist(&probe_list, PROBE_TIMEOUT);
    let existing: Vec<BySide<bool>> = probe_results
        .chunks(2)
        .map(|chunk| BySide::new(chunk[0], chunk[1]))
        .collect();

    // inter-process locks on every base folder that exists
    let mut locks = Vec::new();
    if cfg.create_locks {
        for (pair, exists) in resolved.iter().zip(&existing) {
            for side in Side::BOTH {
                if !exists[side] {
                    continue;
                }
                let lock_path = lock::lock_file_path(&pair[side]);
                let mut adapter = LockCallbackAdapter {
                    inner: &mut *callback,
                };
                match lock_registry.acquire(&lock_path, &mut adapter) {
                    Ok(lock) => locks.push(lock),
                    Err(e) if e.is_abort() => return Err(e),
                    Err(e) => {
                        let mut dont_show = false;
                        callback.report_warning(
                            &format!("Cannot set directory lock: {e}"),
                            &mut dont_show,
                        );
                    }
                }
            }
        }
    }

    // scan + merge, pair by pair
    let mut base_pairs = Vec::with_capacity(resolved.len());
    let mut pendings: Vec<Vec<PendingContent>> = Vec::with_capacity(resolved.len());

    for (index, (bases, exists)) in resolved.into_iter().zip(existing).enumerate() {
        let pair_cfg = &cfg.pairs[index];
        let case_sensitive =
            bases.left.device.is_case_sensitive() && bases.right.device.is_case_sensitive();
        let filter = build_path_filter(&cfg.filter, pair_cfg.local_filter.as_ref(), case_sensitive);

        for side in Side::BOTH {
            if !exists[side] {
                warn!(folder = %bases[side].display(), "base folder not found, side stays empty");
            }
        }

        let scans = scan_pair(&bases, exists, &filter, cfg.symlink_policy, callback)?;

        let mut base_pair = BaseFolderPair::new(
            bases,
            cfg.compare_variant,
            cfg.file_time_tolerance_secs,
            merged_filter_config(&cfg.filter, pair_cfg.local_filter.as_ref()),
        );
        base_pair.dir_exists = exists;

        let mut merge_ctx = MergeContext {
            ids: &mut *ids,
            case_sensitive,
            variant: cfg.compare_variant,
            time_cmp: TimeCompare::new(cfg.file_time_tolerance_secs, cfg.future_time_guard_secs),
            tolerance: cfg.file_time_tolerance_secs,
            pending: Vec::new(),
        };
        let BySide { left, right } = scans;
        merge::merge_trees(&mut merge_ctx, left, right, &mut base_pair.root);

        debug!(
            pair = index,
            pending = merge_ctx.pending.len(),
            "pair merged"
        );
        pendings.push(merge_ctx.pending);
        base_pairs.push(base_pair);
    }

    // bytewise phase over all queued same-size pairs
    let pending_count: usize = pendings.iter().map(Vec::len).sum();
    if pending_count > 0 {
        let pending_bytes: u64 = pendings
            .iter()
            .flat_map(|p| p.iter())
            .map(|entry| entry.bytes)
            .sum();
        callback.init_phase(
            2 * i64::try_from(pending_count).unwrap_or(i64::MAX),
            i64::try_from(pending_bytes).unwrap_or(i64::MAX),
            Phase::ComparingContent,
        );
        for (base_pair, pending) in base_pairs.iter_mut().zip(&pendings) {
            content::resolve_pending(base_pair, pending, callback)?;
        }
    }

    Ok(FolderComparison { base_pairs, locks })
}
