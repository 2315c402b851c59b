//! Command line surface, mapped onto the engine configuration.

use clap::{Parser, ValueEnum};

use model::{
    CompareVariant, DeletionPolicy, DirectionConfig, FilterConfig, FolderPairConfig, MainConfig,
    SoftFilterOptions, SymlinkPolicy, SyncVariant, VersioningStyle,
};

/// Bidirectional folder synchronization.
#[derive(Debug, Parser)]
#[command(name = "bisync", version, about)]
pub struct Cli {
    /// Left base folder.
    pub left: String,

    /// Right base folder.
    pub right: String,

    /// Direction-resolution mode.
    #[arg(long, value_enum, default_value_t = VariantArg::TwoWay)]
    pub variant: VariantArg,

    /// How existing item pairs are classified.
    #[arg(long, value_enum, default_value_t = CompareArg::TimeSize)]
    pub compare: CompareArg,

    /// Disable move detection via the last-in-sync database.
    #[arg(long)]
    pub no_move_detection: bool,

    /// Include masks, separated by `;`.
    #[arg(long, default_value = "*")]
    pub include: String,

    /// Exclude masks, separated by `;`.
    #[arg(long, default_value = "")]
    pub exclude: String,

    /// Keep only items modified at or after this Unix time.
    #[arg(long)]
    pub modified_since: Option<i64>,

    /// Keep only items of at least this many bytes.
    #[arg(long)]
    pub min_size: Option<u64>,

    /// Keep only items of at most this many bytes.
    #[arg(long)]
    pub max_size: Option<u64>,

    /// What happens to deleted/overwritten items.
    #[arg(long, value_enum, default_value_t = DeletionArg::Recycle)]
    pub deletion: DeletionArg,

    /// Versioning target folder (with `--deletion versioning`).
    #[arg(long)]
    pub versioning_folder: Option<String>,

    /// Naming scheme inside the versioning folder.
    #[arg(long, value_enum, default_value_t = VersioningArg::Timestamp)]
    pub versioning_style: VersioningArg,

    /// How symlinks are handled while scanning.
    #[arg(long, value_enum, default_value_t = SymlinkArg::Direct)]
    pub symlinks: SymlinkArg,

    /// Tolerance in seconds when comparing modification times.
    #[arg(long, default_value_t = model::DEFAULT_FILE_TIME_TOLERANCE_SECS)]
    pub time_tolerance: i64,

    /// Seconds past "now" before a timestamp counts as suspect.
    #[arg(long, default_value_t = model::DEFAULT_FUTURE_TIME_GUARD_SECS)]
    pub future_time_guard: i64,

    /// Do not create `sync.ffs_lock` files in the base folders.
    #[arg(long)]
    pub no_locks: bool,

    /// Copy directly instead of through `*.ffs_tmp` intermediates.
    #[arg(long)]
    pub no_fail_safe: bool,

    /// Copy permission bits along with file content.
    #[arg(long)]
    pub copy_permissions: bool,

    /// Reaction to recoverable filesystem errors.
    #[arg(long, value_enum, default_value_t = ErrorPolicyArg::Ignore)]
    pub on_error: ErrorPolicyArg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum VariantArg {
    TwoWay,
    Mirror,
    Update,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CompareArg {
    TimeSize,
    Content,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DeletionArg {
    Permanent,
    Recycle,
    Versioning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum VersioningArg {
    Replace,
    Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SymlinkArg {
    Exclude,
    Direct,
    Follow,
}

/// Batch reaction to recoverable errors: log and continue, or stop the
/// run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ErrorPolicyArg {
    Ignore,
    Exit,
}

impl Cli {
    /// Maps the arguments onto the engine configuration.
    pub fn to_config(&self) -> Result<MainConfig, String> {
        if self.deletion == DeletionArg::Versioning && self.versioning_folder.is_none() {
            return Err("--deletion versioning requires --versioning-folder".to_owned());
        }

        Ok(MainConfig {
            pairs: vec![FolderPairConfig::new(&*self.left, &*self.right)],
            compare_variant: match self.compare {
                CompareArg::TimeSize => CompareVariant::TimeSize,
                CompareArg::Content => CompareVariant::Content,
            },
            direction: DirectionConfig {
                variant: match self.variant {
                    VariantArg::TwoWay => SyncVariant::TwoWay,
                    VariantArg::Mirror => SyncVariant::Mirror,
                    VariantArg::Update => SyncVariant::Update,
                },
                detect_moves: !self.no_move_detection,
            },
            symlink_policy: match self.symlinks {
                SymlinkArg::Exclude => SymlinkPolicy::Exclude,
                SymlinkArg::Direct => SymlinkPolicy::Direct,
                SymlinkArg::Follow => SymlinkPolicy::Follow,
            },
            filter: FilterConfig {
                include: self.include.clone(),
                exclude: self.exclude.clone(),
            },
            soft_filter: SoftFilterOptions {
                time_from: self.modified_since,
                size_min: self.min_size,
                size_max: self.max_size,
            },
            deletion: match self.deletion {
                DeletionArg::Permanent => DeletionPolicy::Permanent,
                DeletionArg::Recycle => DeletionPolicy::RecycleBin,
                DeletionArg::Versioning => DeletionPolicy::Versioning,
            },
            versioning_folder: self.versioning_folder.clone(),
            versioning_style: match self.versioning_style {
                VersioningArg::Replace => VersioningStyle::Replace,
                VersioningArg::Timestamp => VersioningStyle::TimestampFile,
            },
            file_time_tolerance_secs: self.time_tolerance,
            future_time_guard_secs: self.future_time_guard,
            create_locks: !self.no_locks,
            fail_safe_copy: !self.no_fail_safe,
            copy_permissions: self.copy_permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_map_to_two_way_time_size() {
        let cli = Cli::parse_from(["bisync", "/a", "/b"]);
        let cfg = cli.to_config().unwrap();
        assert_eq!(cfg.compare_variant, CompareVariant::TimeSize);
        assert!(matches!(cfg.direction.variant, SyncVariant::TwoWay));
        assert!(cfg.direction.detect_moves);
        assert!(cfg.create_locks);
        assert!(cfg.fail_safe_copy);
    }

    #[test]
    fn versioning_requires_a_folder() {
        let cli = Cli::parse_from(["bisync", "/a", "/b", "--deletion", "versioning"]);
        assert!(cli.to_config().is_err());

        let cli = Cli::parse_from([
            "bisync",
            "/a",
            "/b",
            "--deletion",
            "versioning",
            "--versioning-folder",
            "/rev",
        ]);
        let cfg = cli.to_config().unwrap();
        assert_eq!(cfg.deletion, DeletionPolicy::Versioning);
        assert_eq!(cfg.versioning_folder.as_deref(), Some("/rev"));
    }

    #[test]
    fn filter_arguments_flow_through() {
        let cli = Cli::parse_from([
            "bisync",
            "/a",
            "/b",
            "--exclude",
            "*.tmp;cache/",
            "--min-size",
            "10",
        ]);
        let cfg = cli.to_config().unwrap();
        assert_eq!(cfg.filter.exclude, "*.tmp;cache/");
        assert_eq!(cfg.soft_filter.size_min, Some(10));
    }
}
