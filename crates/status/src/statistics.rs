//! Rolling transfer statistics: smoothed throughput and remaining time.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Throughput window; short, so the display reacts to speed changes.
const WINDOW_BYTES_PER_SEC_MS: i64 = 5_000;
/// Remaining-time window; longer, so the estimate does not flicker.
const WINDOW_REMAINING_TIME_MS: i64 = 10_000;

#[derive(Clone, Copy, Debug)]
struct Record {
    objects: i64,
    bytes: i64,
}

/// Measurement store keyed by elapsed wall-clock milliseconds.
///
/// Old records are trimmed past the largest window, always retaining one
/// point *before* the window start to bridge measurement holes. The
/// formatted remaining time snaps to human-readable blocks and avoids
/// jumping back and forth when the raw estimate fluctuates.
pub struct Statistics {
    objects_total: i64,
    bytes_total: i64,
    measurements: BTreeMap<i64, Record>,
    started: Instant,
    paused_at: Option<Instant>,
    paused_accum: Duration,
    /// Last formatted value, for the anti-flicker rounding.
    remaining_time_last: i64,
}

impl Statistics {
    #[must_use]
    pub fn new(objects_total: i64, bytes_total: i64) -> Self {
        Self {
            objects_total,
            bytes_total,
            measurements: BTreeMap::new(),
            started: Instant::now(),
            paused_at: None,
            paused_accum: Duration::ZERO,
            remaining_time_last: i64::MAX,
        }
    }

    /// Suspends the statistics clock while the worker is paused.
    pub fn pause_timer(&mut self) {
        if self.paused_at.is_none() {
            self.paused_at = Some(Instant::now());
        }
    }

    pub fn resume_timer(&mut self) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_accum += paused_at.elapsed();
        }
    }

    fn elapsed_ms(&self) -> i64 {
        let busy = match self.paused_at {
            Some(paused_at) => self
                .started
                .elapsed()
                .saturating_sub(paused_at.elapsed())
                .saturating_sub(self.paused_accum),
            None => self.started.elapsed().saturating_sub(self.paused_accum),
        };
        i64::try_from(busy.as_millis()).unwrap_or(i64::MAX)
    }

    /// Records the current absolute progress counters.
    pub fn add_measurement(&mut self, objects_current: i64, bytes_current: i64) {
        let now = self.elapsed_ms();
        self.record_at(now, objects_current, bytes_current);
    }

    fn record_at(&mut self, now_ms: i64, objects: i64, bytes: i64) {
        self.measurements.insert(now_ms, Record { objects, bytes });

        // trim, retaining one point before the window start
        let window_begin = now_ms - WINDOW_REMAINING_TIME_MS.max(WINDOW_BYTES_PER_SEC_MS);
        let keep_from = self
            .measurements
            .range(..=window_begin)
            .next_back()
            .map(|(&t, _)| t);
        if let Some(keep_from) = keep_from {
            self.measurements.retain(|&t, _| t >= keep_from);
        }
    }

    fn window(&self, width_ms: i64) -> Option<(i64, Record, i64, Record)> {
        let (&back_time, &back) = self.measurements.iter().next_back()?;
        let front_time = back_time - width_ms;
        let (&t0, &r0) = self
            .measurements
            .range(..=front_time)
            .next_back()
            .or_else(|| self.measurements.range(..).next())?;
        Some((t0, r0, back_time, back))
    }

    /// Smoothed throughput over the short window, or `None` before enough
    /// data exists.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bytes_per_second(&self) -> Option<f64> {
        let (t0, r0, t1, r1) = self.window(WINDOW_BYTES_PER_SEC_MS)?;
        let time_delta_ms = t1 - t0;
        if time_delta_ms <= 0 {
            return None;
        }
        Some((r1.bytes - r0.bytes) as f64 * 1000.0 / time_delta_ms as f64)
    }

    /// Raw remaining-time estimate in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn remaining_time_ms(&self) -> Option<f64> {
        let (t0, r0, t1, r1) = self.window(WINDOW_REMAINING_TIME_MS)?;
        let data_delta = r1.bytes - r0.bytes;
        if data_delta <= 0 {
            return None;
        }
        let time_delta_ms = t1 - t0;
        let data_remaining = self.bytes_total - r1.bytes;
        Some(data_remaining.max(0) as f64 * time_delta_ms as f64 / data_delta as f64)
    }

    /// Human-readable remaining time, snapped and flicker-damped; `"-"`
    /// before an estimate exists.
    pub fn remaining_time_text(&mut self) -> String {
        match self.remaining_time_ms() {
            Some(ms) => self.format_remaining_time(ms),
            None => "-".to_owned(),
        }
    }

    /// The configured totals (objects, bytes).
    #[must_use]
    pub fn totals(&self) -> (i64, i64) {
        (self.objects_total, self.bytes_total)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn format_remaining_time(&mut self, time_ms: f64) -> String {
        let mut remaining = time_ms / 1000.0;
        let mut unit_sec = true;
        let mut unit = "sec";
        if remaining > 55.0 {
            unit_sec = false;
            remaining /= 60.0;
            unit = "min";
            if remaining > 59.0 {
                remaining /= 60.0;
                unit = "hour(s)";
                if remaining > 23.0 {
                    remaining /= 24.0;
                    unit = "day(s)";
                }
            }
        }

        let mut formatted = remaining.round() as i64;

        // seconds display in 5-second blocks, rounding up
        if unit_sec && formatted % 5 != 0 {
            formatted += 5 - formatted % 5;
        }

        // avoid jumping back and forth when fluctuating around a boundary
        if self.remaining_time_last < formatted {
            if unit_sec {
                formatted = remaining.round() as i64;
                formatted -= formatted % 5;
            } else {
                formatted = remaining as i64;
            }
        }
        self.remaining_time_last = formatted;

        format!("{formatted} {unit}")
    }
}
