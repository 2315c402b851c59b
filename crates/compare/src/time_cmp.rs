//! Modification-time comparison with tolerance and plausibility guard.

/// `true` when two times are equal within `tolerance` seconds.
///
/// Copying to FAT/FAT32 can shift a modification time by up to two
/// seconds, so exact equality is the wrong test for filesystems.
#[must_use]
pub fn same_file_time(a: i64, b: i64, tolerance: i64) -> bool {
    if a < b { b - a <= tolerance } else { a - b <= tolerance }
}

/// Outcome of classifying two modification times.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeResult {
    Equal,
    LeftNewer,
    RightNewer,
    /// The left time is before the epoch or unreasonably far in the
    /// future.
    LeftInvalid,
    RightInvalid,
}

/// Classifies modification times under a tolerance and a future guard.
#[derive(Clone, Copy, Debug)]
pub struct TimeCompare {
    tolerance: i64,
    /// Times after this point count as erroneous.
    plausible_until: i64,
}

impl TimeCompare {
    /// `future_guard` is the span past "now" still considered plausible.
    #[must_use]
    pub fn new(tolerance: i64, future_guard: i64) -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
        Self {
            tolerance,
            plausible_until: now.saturating_add(future_guard),
        }
    }

    #[cfg(test)]
    fn with_horizon(tolerance: i64, plausible_until: i64) -> Self {
        Self {
            tolerance,
            plausible_until,
        }
    }

    /// Classifies a pair of times.
    ///
    /// Exactly identical times are never questioned; the plausibility
    /// check only applies once the values differ.
    #[must_use]
    pub fn compare(&self, lhs: i64, rhs: i64) -> TimeResult {
        if lhs == rhs {
            return TimeResult::Equal;
        }
        if lhs < 0 || lhs > self.plausible_until {
            return TimeResult::LeftInvalid;
        }
        if rhs < 0 || rhs > self.plausible_until {
            return TimeResult::RightInvalid;
        }
        if same_file_time(lhs, rhs, self.tolerance) {
            return TimeResult::Equal;
        }
        if lhs < rhs {
            TimeResult::RightNewer
        } else {
            TimeResult::LeftNewer
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_is_symmetric_and_inclusive() {
        assert!(same_file_time(100, 102, 2));
        assert!(same_file_time(102, 100, 2));
        assert!(!same_file_time(100, 103, 2));
    }

    #[test]
    fn within_tolerance_is_equal() {
        let cmp = TimeCompare::with_horizon(2, 1_000_000);
        assert_eq!(cmp.compare(1000, 1002), TimeResult::Equal);
        assert_eq!(cmp.compare(1000, 1003), TimeResult::RightNewer);
        assert_eq!(cmp.compare(1003, 1000), TimeResult::LeftNewer);
    }

    #[test]
    fn identical_times_bypass_the_guard() {
        let cmp = TimeCompare::with_horizon(2, 1_000);
        assert_eq!(cmp.compare(5_000, 5_000), TimeResult::Equal);
        assert_eq!(cmp.compare(-7, -7), TimeResult::Equal);
    }

    #[test]
    fn preposterous_times_are_flagged() {
        let cmp = TimeCompare::with_horizon(2, 1_000);
        assert_eq!(cmp.compare(-1, 100), TimeResult::LeftInvalid);
        assert_eq!(cmp.compare(100, 2_000), TimeResult::RightInvalid);
        assert_eq!(cmp.compare(2_000, 100), TimeResult::LeftInvalid);
    }
}
