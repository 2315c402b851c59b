//! Setting pairs' active flags from the name and soft filters.
//!
//! Runs after direction resolution: deactivated rows keep their category
//! and direction but are skipped by the executor, exactly as if the user
//! had deselected them.

use filters::{PathFilter, SoftFilter};
use model::{BaseFolderPair, FolderContainer, Side};

/// Applies the hard (name) filter, then the soft (size/time) filter as a
/// conjunction.
pub fn apply_filtering(base: &mut BaseFolderPair, name_filter: &PathFilter, soft: &SoftFilter) {
    apply_hard(&mut base.root, name_filter, "");
    if !soft.is_null() {
        apply_soft(&mut base.root, soft);
    }
}

fn join_rel(rel: &str, name: &str) -> String {
    if rel.is_empty() {
        name.to_owned()
    } else {
        format!("{rel}/{name}")
    }
}

fn apply_hard(container: &mut FolderContainer, filter: &PathFilter, rel: &str) {
    for pair in &mut container.files {
        let active = filter.passes_file(&join_rel(rel, pair.ref_name()));
        pair.set_active(active);
    }
    for pair in &mut container.symlinks {
        let active = filter.passes_file(&join_rel(rel, pair.ref_name()));
        pair.set_active(active);
    }
    for pair in &mut container.folders {
        let rel_path = join_rel(rel, pair.ref_name());
        let matched = filter.passes_folder(&rel_path);
        pair.set_active(matched.included);
        if !matched.included && !matched.descendants_might_match {
            set_active_recursive(&mut pair.children, false);
        } else {
            apply_hard(&mut pair.children, filter, &rel_path);
        }
    }
}

fn set_active_recursive(container: &mut FolderContainer, active: bool) {
    for pair in &mut container.files {
        pair.set_active(active);
    }
    for pair in &mut container.symlinks {
        pair.set_active(active);
    }
    for pair in &mut container.folders {
        pair.set_active(active);
        set_active_recursive(&mut pair.children, active);
    }
}

/// Falsify-only pass: the soft filter can only deactivate rows.
fn apply_soft(container: &mut FolderContainer, soft: &SoftFilter) {
    for pair in &mut container.files {
        if !pair.is_active() {
            continue;
        }
        let matches = Side::BOTH.into_iter().any(|side| {
            pair.descriptor(side)
                .is_some_and(|d| soft.matches_time(d.mtime) && soft.matches_size(d.size))
        });
        pair.set_active(matches);
    }
    for pair in &mut container.symlinks {
        if !pair.is_active() {
            continue;
        }
        let matches = Side::BOTH.into_iter().any(|side| {
            pair.descriptor(side)
                .is_some_and(|d| soft.matches_time(d.mtime))
        });
        pair.set_active(matches);
    }
    for pair in &mut container.folders {
        if pair.is_active() {
            pair.set_active(soft.matches_folder());
        }
        apply_soft(&mut pair.children, soft);
    }
}

/// Restricts the active rows to a modification-time window; used to show
/// "what changed between T0 and T1".
pub fn apply_time_span_filter(base: &mut BaseFolderPair, time_from: i64, time_to: i64) {
    span_level(&mut base.root, time_from, time_to);
}

fn span_level(container: &mut FolderContainer, time_from: i64, time_to: i64) {
    let in_span = |mtime: i64| time_from <= mtime && mtime <= time_to;

    for pair in &mut container.files {
        let matches = Side::BOTH
            .into_iter()
            .any(|side| pair.descriptor(side).is_some_and(|d| in_span(d.mtime)));
        pair.set_active(matches);
    }
    for pair in &mut container.symlinks {
        let matches = Side::BOTH
            .into_iter()
            .any(|side| pair.descriptor(side).is_some_and(|d| in_span(d.mtime)));
        pair.set_active(matches);
    }
    for pair in &mut container.folders {
        // the time-span view shows files only
        pair.set_active(false);
        span_level(&mut pair.children, time_from, time_to);
    }
}
