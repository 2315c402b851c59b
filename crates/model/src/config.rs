//! Configuration types driving the compare/resolve/sync pipeline.

use crate::category::Direction;

/// How pairs of existing items are classified.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareVariant {
    /// Compare file size and modification time within tolerance.
    #[default]
    TimeSize,
    /// Compare file content bytewise (after a size short-circuit).
    Content,
}

impl std::fmt::Display for CompareVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::TimeSize => "time and size",
            Self::Content => "content",
        })
    }
}

/// Pure lookup table from category to direction.
///
/// `conflict` set to [`Direction::None`] preserves the conflict instead of
/// routing it to a side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectionSet {
    pub ex_left_only: Direction,
    pub ex_right_only: Direction,
    pub left_newer: Direction,
    pub right_newer: Direction,
    pub different: Direction,
    pub conflict: Direction,
}

impl DirectionSet {
    /// Mirror: treat right as a clone of left.
    #[must_use]
    pub fn mirror() -> Self {
        Self {
            ex_left_only: Direction::Right,
            ex_right_only: Direction::Right,
            left_newer: Direction::Right,
            right_newer: Direction::Right,
            different: Direction::Right,
            conflict: Direction::Right,
        }
    }

    /// Update: copy new and newer to the right, never delete there, never
    /// overwrite newer target files.
    #[must_use]
    pub fn update() -> Self {
        Self {
            ex_left_only: Direction::Right,
            ex_right_only: Direction::None,
            left_newer: Direction::Right,
            right_newer: Direction::None,
            different: Direction::Right,
            conflict: Direction::None,
        }
    }

    /// Fallback for two-way runs without a usable database: newer wins,
    /// genuinely different content stays a conflict.
    #[must_use]
    pub fn two_way_fallback() -> Self {
        Self {
            ex_left_only: Direction::Right,
            ex_right_only: Direction::Left,
            left_newer: Direction::Right,
            right_newer: Direction::Left,
            different: Direction::None,
            conflict: Direction::None,
        }
    }
}

/// The overall direction-resolution mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncVariant {
    /// Database-driven bidirectional resolution.
    TwoWay,
    Mirror,
    Update,
    Custom(DirectionSet),
}

/// Direction resolution settings of one folder pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectionConfig {
    pub variant: SyncVariant,
    /// Cross-link one-sided leftovers as moves using the database.
    pub detect_moves: bool,
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            variant: SyncVariant::TwoWay,
            detect_moves: true,
        }
    }
}

/// What happens to items deleted or overwritten on a side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeletionPolicy {
    Permanent,
    #[default]
    RecycleBin,
    /// Move into a user-defined versioning folder.
    Versioning,
}

/// How symlinks encountered during scanning are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SymlinkPolicy {
    /// Ignore symlinks entirely.
    Exclude,
    /// Sync the link itself (its target string).
    #[default]
    Direct,
    /// Follow the link and sync what it points to.
    Follow,
}

/// Naming scheme of the versioning store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VersioningStyle {
    /// Flat mirror: a new version replaces the previous one.
    Replace,
    /// Append ` YYYY-MM-DD HHMMSS<.ext>` to every versioned file.
    #[default]
    TimestampFile,
}

/// Include/exclude mask phrases, `;`- or newline-separated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterConfig {
    pub include: String,
    pub exclude: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            include: "*".to_owned(),
            exclude: String::new(),
        }
    }
}

/// Raw soft-filter bounds; `None` leaves the dimension unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SoftFilterOptions {
    /// Keep items modified at or after this time (seconds since epoch).
    pub time_from: Option<i64>,
    pub size_min: Option<u64>,
    pub size_max: Option<u64>,
}

impl SoftFilterOptions {
    /// `true` when no bound is active.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.time_from.is_none() && self.size_min.is_none() && self.size_max.is_none()
    }
}

/// One configured left/right folder pair.
#[derive(Clone, Debug)]
pub struct FolderPairConfig {
    pub left_phrase: String,
    pub right_phrase: String,
    /// Per-pair override of the global direction settings.
    pub direction_override: Option<DirectionConfig>,
    /// Per-pair filter, combined with the global filter by logical AND.
    pub local_filter: Option<FilterConfig>,
}

impl FolderPairConfig {
    #[must_use]
    pub fn new(left_phrase: impl Into<String>, right_phrase: impl Into<String>) -> Self {
        Self {
            left_phrase: left_phrase.into(),
            right_phrase: right_phrase.into(),
            direction_override: None,
            local_filter: None,
        }
    }
}

/// Default tolerance when comparing filesystem modification times.
///
/// Copying to FAT/FAT32 may shift a file's time by up to two seconds.
pub const DEFAULT_FILE_TIME_TOLERANCE_SECS: i64 = 2;

/// Default guard classifying timestamps too far in the future as suspect.
pub const DEFAULT_FUTURE_TIME_GUARD_SECS: i64 = 365 * 24 * 3600;

/// Complete run configuration.
#[derive(Clone, Debug)]
pub struct MainConfig {
    pub pairs: Vec<FolderPairConfig>,
    pub compare_variant: CompareVariant,
    pub direction: DirectionConfig,
    pub symlink_policy: SymlinkPolicy,
    pub filter: FilterConfig,
    pub soft_filter: SoftFilterOptions,
    pub deletion: DeletionPolicy,
    /// Target folder of [`DeletionPolicy::Versioning`].
    pub versioning_folder: Option<String>,
    pub versioning_style: VersioningStyle,
    /// Modification times within this many seconds compare equal.
    pub file_time_tolerance_secs: i64,
    /// Times more than this far past "now" classify as suspect.
    pub future_time_guard_secs: i64,
    /// Write inter-process lock files next to the base folders.
    pub create_locks: bool,
    /// Route copies through `*.ffs_tmp` intermediates.
    pub fail_safe_copy: bool,
    pub copy_permissions: bool,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            compare_variant: CompareVariant::TimeSize,
            direction: DirectionConfig::default(),
            symlink_policy: SymlinkPolicy::default(),
            filter: FilterConfig::default(),
            soft_filter: SoftFilterOptions::default(),
            deletion: DeletionPolicy::default(),
            versioning_folder: None,
            versioning_style: VersioningStyle::default(),
            file_time_tolerance_secs: DEFAULT_FILE_TIME_TOLERANCE_SECS,
            future_time_guard_secs: DEFAULT_FUTURE_TIME_GUARD_SECS,
            create_locks: true,
            fail_safe_copy: true,
            copy_permissions: false,
        }
    }
}

impl MainConfig {
    /// The effective direction settings of pair `index`.
    #[must_use]
    pub fn direction_for_pair(&self, index: usize) -> DirectionConfig {
        self.pairs
            .get(index)
            .and_then(|p| p.direction_override)
            .unwrap_or(self.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_routes_everything_right() {
        let set = DirectionSet::mirror();
        assert_eq!(set.ex_right_only, Direction::Right);
        assert_eq!(set.conflict, Direction::Right);
    }

    #[test]
    fn update_never_touches_newer_targets() {
        let set = DirectionSet::update();
        assert_eq!(set.ex_right_only, Direction::None);
        assert_eq!(set.right_newer, Direction::None);
    }

    #[test]
    fn pair_override_wins() {
        let mut cfg = MainConfig::default();
        cfg.pairs.push(FolderPairConfig::new("/a", "/b"));
        cfg.pairs.push(FolderPairConfig {
            direction_override: Some(DirectionConfig {
                variant: SyncVariant::Mirror,
                detect_moves: false,
            }),
            ..FolderPairConfig::new("/c", "/d")
        });

        assert_eq!(cfg.direction_for_pair(0).variant, SyncVariant::TwoWay);
        assert_eq!(cfg.direction_for_pair(1).variant, SyncVariant::Mirror);
    }
}
