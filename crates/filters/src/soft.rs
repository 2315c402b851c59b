//! The soft filter: a pure size/time predicate applied after comparison.
//!
//! It may match only one side of a pair, so it must not run while
//! traversing a single folder; it only toggles the "active" flag of rows
//! that already exist, equivalent to the user temporarily deselecting
//! them.

use model::SoftFilterOptions;

/// Size/time window; items outside it are deactivated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SoftFilter {
    time_from: i64,
    size_min: u64,
    size_max: u64,
}

impl SoftFilter {
    /// A filter that keeps everything.
    #[must_use]
    pub fn null() -> Self {
        Self {
            time_from: i64::MIN,
            size_min: 0,
            size_max: u64::MAX,
        }
    }

    #[must_use]
    pub fn from_options(options: &SoftFilterOptions) -> Self {
        Self {
            time_from: options.time_from.unwrap_or(i64::MIN),
            size_min: options.size_min.unwrap_or(0),
            size_max: options.size_max.unwrap_or(u64::MAX),
        }
    }

    /// Keep items modified at or after the cutoff.
    #[must_use]
    pub fn matches_time(&self, mtime: i64) -> bool {
        self.time_from <= mtime
    }

    #[must_use]
    pub fn matches_size(&self, size: u64) -> bool {
        self.size_min <= size && size <= self.size_max
    }

    /// An active date filter deactivates all folders, which also gets rid
    /// of empty folder shells.
    #[must_use]
    pub fn matches_folder(&self) -> bool {
        self.time_from == i64::MIN
    }

    /// `true` when equivalent to [`Self::null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        *self == Self::null()
    }

    /// Intersection of two windows.
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            time_from: self.time_from.max(other.time_from),
            size_min: self.size_min.max(other.size_min),
            size_max: self.size_max.min(other.size_max),
        }
    }
}

impl Default for SoftFilter {
    fn default() -> Self {
        Self::null()
    }
}
