//! Non-interactive [`ProcessCallback`] for batch runs.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use status::{Phase, ProcessCallback, Statistics};
use vfs::{ErrorChoice, FileError};

use crate::args::ErrorPolicyArg;

/// Minimum interval between two displayed progress updates.
const DISPLAY_INTERVAL: Duration = Duration::from_millis(100);

/// Applies the configured batch error policy without prompting; collects
/// warnings so the final exit code can reflect them.
pub struct BatchCallback {
    error_policy: ErrorPolicyArg,
    pub warnings: Vec<String>,
    pub errors_ignored: u64,
    objects_done: i64,
    bytes_done: i64,
    statistics: Option<Statistics>,
    last_display: Instant,
}

impl BatchCallback {
    #[must_use]
    pub fn new(error_policy: ErrorPolicyArg) -> Self {
        Self {
            error_policy,
            warnings: Vec::new(),
            errors_ignored: 0,
            objects_done: 0,
            bytes_done: 0,
            statistics: None,
            last_display: Instant::now(),
        }
    }

    fn display_progress(&mut self) {
        // coalesce updates; the worker calls far more often than a
        // human-readable display needs
        if self.last_display.elapsed() < DISPLAY_INTERVAL {
            return;
        }
        self.last_display = Instant::now();

        if let Some(stats) = &mut self.statistics {
            stats.add_measurement(self.objects_done, self.bytes_done);
            let (objects_total, bytes_total) = stats.totals();
            debug!(
                objects = self.objects_done,
                objects_total,
                bytes = self.bytes_done,
                bytes_total,
                remaining = %stats.remaining_time_text(),
                "progress"
            );
        } else {
            debug!(objects = self.objects_done, "progress");
        }
    }
}

impl ProcessCallback for BatchCallback {
    fn init_phase(&mut self, objects_total: i64, bytes_total: i64, phase: Phase) {
        self.objects_done = 0;
        self.bytes_done = 0;
        self.statistics = match phase {
            Phase::ComparingContent | Phase::Synchronizing => {
                Some(Statistics::new(objects_total, bytes_total))
            }
            Phase::None | Phase::Scanning => None,
        };
        match phase {
            Phase::Scanning => info!("scanning folders..."),
            Phase::ComparingContent => info!(
                objects = objects_total,
                bytes = bytes_total,
                "comparing file content..."
            ),
            Phase::Synchronizing => info!(
                objects = objects_total,
                bytes = bytes_total,
                "synchronizing..."
            ),
            Phase::None => {}
        }
    }

    fn update_progress(&mut self, objects_delta: i64, bytes_delta: i64) {
        self.objects_done += objects_delta;
        self.bytes_done += bytes_delta;
        self.display_progress();
    }

    fn report_status(&mut self, text: &str) {
        debug!("{text}");
    }

    fn request_ui_refresh(&mut self) -> Result<(), FileError> {
        // batch mode has no pause/abort control surface
        Ok(())
    }

    fn report_info(&mut self, text: &str) {
        info!("{text}");
    }

    fn report_warning(&mut self, text: &str, _dont_show_again: &mut bool) {
        warn!("{text}");
        self.warnings.push(text.to_owned());
    }

    fn handle_error(&mut self, message: &str) -> ErrorChoice {
        match self.error_policy {
            ErrorPolicyArg::Ignore => {
                error!("{message} (ignored)");
                self.errors_ignored += 1;
                ErrorChoice::Ignore
            }
            ErrorPolicyArg::Exit => {
                error!("{message}");
                ErrorChoice::Abort
            }
        }
    }

    fn report_fatal(&mut self, message: &str) {
        error!("{message}");
    }
}
