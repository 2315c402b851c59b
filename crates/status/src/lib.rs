#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The callback protocol between the worker pipeline and its front end,
//! plus the rolling statistics backing throughput and remaining-time
//! display.
//!
//! # Design
//!
//! The worker is sequential; the front end regains control only at
//! callback invocations. Every callback is therefore a suspension point:
//! [`ProcessCallback::request_ui_refresh`] polls pause/abort cooperatively
//! and returns the abort signal as a [`vfs::FileError`] of kind
//! [`vfs::FileErrorKind::Aborted`], which unwinds through the worker with
//! scope cleanup running on the way out.
//!
//! Progress deltas may be *negative*: prior work can be superseded (a
//! detected move degrades to copy+delete and the workload grows, a binary
//! compare short-circuits and the workload shrinks).

mod statistics;

use vfs::{ErrorChoice, FileError};

pub use crate::statistics::Statistics;

/// The pipeline phases, in order of appearance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    None,
    Scanning,
    /// Bytewise comparison of same-size files (content variant only).
    ComparingContent,
    Synchronizing,
}

/// Interface between the worker and its front end.
///
/// All methods may be called at any time between two filesystem
/// operations; implementations must be fast and must not call back into
/// the pipeline.
pub trait ProcessCallback {
    /// Starts a new phase with its total workload (objects, bytes).
    ///
    /// Scanning passes `-1` for bytes: the total is unknown until
    /// classification.
    fn init_phase(&mut self, objects_total: i64, bytes_total: i64, phase: Phase);

    /// Accumulates workload completed — or *un*-completed, when deltas are
    /// negative.
    fn update_progress(&mut self, objects_delta: i64, bytes_delta: i64);

    /// Grows (or shrinks) the phase's total workload after the fact, e.g.
    /// when a planned rename degrades to copy+delete.
    fn update_total(&mut self, _objects_delta: i64, _bytes_delta: i64) {}

    /// Transient one-line status, e.g. the path currently scanned.
    fn report_status(&mut self, text: &str);

    /// Cooperative suspension point: polls pause/abort.
    fn request_ui_refresh(&mut self) -> Result<(), FileError>;

    /// Permanent log line.
    fn report_info(&mut self, text: &str);

    /// Non-fatal problem; `dont_show_again` suppresses repetition when the
    /// implementation offers that choice.
    fn report_warning(&mut self, text: &str, dont_show_again: &mut bool);

    /// Recoverable error: the implementation decides how to continue.
    fn handle_error(&mut self, message: &str) -> ErrorChoice;

    /// Non-recoverable error; the run terminates after this call.
    fn report_fatal(&mut self, message: &str);
}

/// Runs `operation` under the error protocol: `Retry` loops, `Ignore`
/// yields `Ok(None)`, `Abort` (and the abort signal itself) propagates.
pub fn try_reporting_error<T>(
    callback: &mut dyn ProcessCallback,
    mut operation: impl FnMut() -> Result<T, FileError>,
) -> Result<Option<T>, FileError> {
    loop {
        match operation() {
            Ok(value) => return Ok(Some(value)),
            Err(e) if e.is_abort() => return Err(e),
            Err(e) => match callback.handle_error(&e.to_string()) {
                ErrorChoice::Retry => {}
                ErrorChoice::Ignore => {
                    tracing::debug!(error = %e, "error ignored by callback");
                    return Ok(None);
                }
                ErrorChoice::Abort => return Err(FileError::aborted()),
            },
        }
    }
}
