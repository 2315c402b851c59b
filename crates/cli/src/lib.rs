#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The batch front end: parses arguments into the engine configuration,
//! wires up structured logging, drives the compare → resolve → sync
//! pipeline with a non-interactive callback, and maps the outcome to the
//! process exit code.

mod args;
mod callback;

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use filters::{NameFilter, PathFilter, SoftFilter};
use lock::LockRegistry;
use model::{DeletionPolicy, IdIssuer, MainConfig};
use versioning::Versioner;
use vfs::FileError;
use vfs::phrase::DeviceRegistry;

pub use crate::args::{Cli, ErrorPolicyArg};
pub use crate::callback::BatchCallback;

/// Final process status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    /// Everything synchronized.
    Ok = 0,
    /// Finished, but conflicts were skipped, errors ignored, or warnings
    /// raised.
    FinishedWithWarnings = 1,
    /// The run was aborted.
    Aborted = 2,
    /// A non-recoverable error, including unusable arguments.
    Error = 3,
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        Self::from(status as u8)
    }
}

/// Entry point of the `bisync` binary.
pub fn run() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match cli.to_config() {
        Ok(cfg) => cfg,
        Err(message) => {
            error!("{message}");
            return ExitStatus::Error.into();
        }
    };

    run_batch(&cfg, cli.on_error).into()
}

/// Runs one complete batch synchronization.
#[must_use]
pub fn run_batch(cfg: &MainConfig, error_policy: ErrorPolicyArg) -> ExitStatus {
    let mut callback = BatchCallback::new(error_policy);
    match execute(cfg, &mut callback) {
        Ok(summary) => {
            info!(
                created = summary.items_created,
                overwritten = summary.items_overwritten,
                deleted = summary.items_deleted,
                moved = summary.items_moved,
                attributes = summary.metadata_updated,
                conflicts = summary.conflicts_skipped,
                "synchronization finished"
            );
            if summary.conflicts_skipped > 0
                || summary.errors_ignored > 0
                || callback.errors_ignored > 0
                || !callback.warnings.is_empty()
            {
                ExitStatus::FinishedWithWarnings
            } else {
                ExitStatus::Ok
            }
        }
        Err(e) if e.is_abort() => {
            error!("synchronization aborted");
            ExitStatus::Aborted
        }
        Err(e) => {
            error!("{e}");
            ExitStatus::Error
        }
    }
}

fn execute(
    cfg: &MainConfig,
    callback: &mut BatchCallback,
) -> Result<engine::SyncSummary, FileError> {
    let devices = DeviceRegistry::with_native();
    let lock_registry = LockRegistry::new();
    let mut ids = IdIssuer::new();

    let mut comparison = compare::compare(cfg, &devices, &lock_registry, &mut ids, callback)?;

    let soft_filter = SoftFilter::from_options(&cfg.soft_filter);
    for (index, base) in comparison.base_pairs.iter_mut().enumerate() {
        let direction_cfg = cfg.direction_for_pair(index);
        resolve::redetermine_sync_directions(&direction_cfg, base, callback)?;

        let case_sensitive = base.base.left.device.is_case_sensitive()
            && base.base.right.device.is_case_sensitive();
        let mut layers = vec![NameFilter::from_config(&cfg.filter, case_sensitive)];
        if let Some(local) = cfg.pairs.get(index).and_then(|p| p.local_filter.as_ref()) {
            layers.push(NameFilter::from_config(local, case_sensitive));
        }
        resolve::apply_filtering(base, &PathFilter::new(layers), &soft_filter);
    }

    let versioner = match (&cfg.deletion, &cfg.versioning_folder) {
        (DeletionPolicy::Versioning, Some(folder)) => {
            let store = devices.parse(folder)?;
            Some(Arc::new(Versioner::new(store, cfg.versioning_style)?))
        }
        _ => None,
    };

    engine::synchronize(cfg, &mut comparison.base_pairs, versioner, callback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::FolderPairConfig;

    fn quiet_config(left: &std::path::Path, right: &std::path::Path) -> MainConfig {
        MainConfig {
            pairs: vec![FolderPairConfig::new(
                left.to_string_lossy(),
                right.to_string_lossy(),
            )],
            create_locks: false,
            deletion: DeletionPolicy::Permanent,
            ..MainConfig::default()
        }
    }

    #[test]
    fn clean_run_exits_ok() {
        let left = tempfile::tempdir().unwrap();
        let right = tempfile::tempdir().unwrap();
        std::fs::write(left.path().join("f"), b"x").unwrap();

        let status = run_batch(&quiet_config(left.path(), right.path()), ErrorPolicyArg::Ignore);
        assert_eq!(status, ExitStatus::Ok);
        assert!(right.path().join("f").exists());
    }

    #[test]
    fn conflicts_exit_with_warning_status() {
        let left = tempfile::tempdir().unwrap();
        let right = tempfile::tempdir().unwrap();
        let cfg = quiet_config(left.path(), right.path());

        // first run establishes the database
        std::fs::write(left.path().join("c"), b"base").unwrap();
        assert_eq!(run_batch(&cfg, ErrorPolicyArg::Ignore), ExitStatus::Ok);

        // independent changes on both sides
        std::fs::remove_file(left.path().join("c")).unwrap();
        std::fs::write(right.path().join("c"), b"other").unwrap();
        filetime::set_file_mtime(
            right.path().join("c"),
            filetime::FileTime::from_unix_time(1_600_000_000, 0),
        )
        .unwrap();

        let status = run_batch(&cfg, ErrorPolicyArg::Ignore);
        assert_eq!(status, ExitStatus::FinishedWithWarnings);
    }

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(ExitStatus::Ok as u8, 0);
        assert_eq!(ExitStatus::FinishedWithWarnings as u8, 1);
        assert_eq!(ExitStatus::Aborted as u8, 2);
        assert_eq!(ExitStatus::Error as u8, 3);
    }
}
