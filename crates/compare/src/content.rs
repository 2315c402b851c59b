//! Resolving queued same-size pairs through bytewise comparison.

use model::{BaseFolderPair, BySide, Category, FolderContainer, Side};
use status::{Phase, ProcessCallback};
use vfs::{AbstractPath, ErrorChoice, FileError};

use crate::binary::files_have_same_content;
use crate::merge::PendingContent;
use crate::time_cmp::same_file_time;

fn append_rel(base: &AbstractPath, rel: &str) -> AbstractPath {
    let mut out = base.clone();
    for comp in rel.split('/').filter(|c| !c.is_empty()) {
        out = out.join(comp);
    }
    out
}

/// Forwards to the real callback while counting reported bytes, so the
/// caller can emit a compensating delta when a compare short-circuits.
struct CountingForward<'a> {
    inner: &'a mut dyn ProcessCallback,
    bytes: i64,
}

impl ProcessCallback for CountingForward<'_> {
    fn init_phase(&mut self, objects_total: i64, bytes_total: i64, phase: Phase) {
        self.inner.init_phase(objects_total, bytes_total, phase);
    }

    fn update_progress(&mut self, objects_delta: i64, bytes_delta: i64) {
        self.bytes += bytes_delta;
        self.inner.update_progress(objects_delta, bytes_delta);
    }

    fn report_status(&mut self, text: &str) {
        self.inner.report_status(text);
    }

    fn request_ui_refresh(&mut self) -> Result<(), FileError> {
        self.inner.request_ui_refresh()
    }

    fn report_info(&mut self, text: &str) {
        self.inner.report_info(text);
    }

    fn report_warning(&mut self, text: &str, dont_show_again: &mut bool) {
        self.inner.report_warning(text, dont_show_again);
    }

    fn handle_error(&mut self, message: &str) -> ErrorChoice {
        self.inner.handle_error(message)
    }

    fn report_fatal(&mut self, message: &str) {
        self.inner.report_fatal(message);
    }
}

/// Runs the bytewise phase over the pairs queued during merging.
///
/// The queue was built in depth-first merge order, so a single cursor
/// pass over the tree matches each entry to its pair.
pub(crate) fn resolve_pending(
    base: &mut BaseFolderPair,
    pending: &[PendingContent],
    callback: &mut dyn ProcessCallback,
) -> Result<(), FileError> {
    if pending.is_empty() {
        return Ok(());
    }
    let bases = base.base.clone();
    let tolerance = base.file_time_tolerance_secs;
    let mut cursor = 0usize;
    walk(
        &mut base.root,
        &bases,
        "",
        &mut cursor,
        pending,
        tolerance,
        callback,
    )?;
    debug_assert_eq!(cursor, pending.len(), "pending queue fully consumed");
    Ok(())
}

fn walk(
    container: &mut FolderContainer,
    bases: &BySide<AbstractPath>,
    rel: &str,
    cursor: &mut usize,
    pending: &[PendingContent],
    tolerance: i64,
    callback: &mut dyn ProcessCallback,
) -> Result<(), FileError> {
    for pair in &mut container.files {
        if *cursor >= pending.len() || pending[*cursor].id != pair.id() {
            continue;
        }
        let entry = &pending[*cursor];
        *cursor += 1;

        let left = append_rel(&bases[Side::Left], &entry.rel);
        let right = append_rel(&bases[Side::Right], &entry.rel);
        callback.report_status(&format!("Comparing content of {}", left.display()));

        let mut counting = CountingForward {
            inner: &mut *callback,
            bytes: 0,
        };
        let outcome = loop {
            match files_have_same_content(&left, &right, &mut counting) {
                Ok(same) => break Some(same),
                Err(e) if e.is_abort() => return Err(e),
                Err(e) => match counting.inner.handle_error(&e.to_string()) {
                    ErrorChoice::Retry => {}
                    ErrorChoice::Ignore => break None,
                    ErrorChoice::Abort => return Err(FileError::aborted()),
                },
            }
        };
        let reported = counting.bytes;

        match outcome {
            Some(true) => {
                let l = pair.descriptor(Side::Left).expect("both sides present");
                let r = pair.descriptor(Side::Right).expect("both sides present");
                let metadata_in_sync = same_file_time(l.mtime, r.mtime, tolerance)
                    && pair.short_name(Side::Left) == pair.short_name(Side::Right);
                pair.set_category(if metadata_in_sync {
                    Category::Equal
                } else {
                    Category::DifferentMetadata
                });
            }
            Some(false) => pair.set_category(Category::Different),
            None => pair.set_category_conflict("Conflict: cannot compare file content"),
        }

        // settle this pair's workload, shrinking it when the compare
        // short-circuited early
        let expected = i64::try_from(entry.bytes).unwrap_or(i64::MAX);
        callback.update_progress(2, expected - reported);
        callback.request_ui_refresh()?;
    }

    for folder in &mut container.folders {
        let name = folder.ref_name().to_owned();
        let sub_rel = if rel.is_empty() {
            name
        } else {
            format!("{rel}/{name}")
        };
        walk(
            &mut folder.children,
            bases,
            &sub_rel,
            cursor,
            pending,
            tolerance,
            callback,
        )?;
    }
    Ok(())
}
