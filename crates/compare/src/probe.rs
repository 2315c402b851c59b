//! Timed base-folder existence probes.
//!
//! Network shares can block a plain `stat` for tens of seconds; the scan
//! must fail fast instead. Each probe runs on its own thread and is given
//! a short deadline; on timeout the folder counts as missing and the
//! probe thread is left to die in the background.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use vfs::{AbstractPath, ItemType};

/// Deadline for one existence probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// Checks whether each path currently exists as a folder, with a deadline
/// per probe; all probes run concurrently.
#[must_use]
pub fn folders_exist(paths: &[AbstractPath], timeout: Duration) -> Vec<bool> {
    let receivers: Vec<_> = paths
        .iter()
        .map(|path| {
            let (tx, rx) = crossbeam_channel::bounded::<bool>(1);
            let device = Arc::clone(&path.device);
            let afs_path = path.path.clone();
            std::thread::spawn(move || {
                let exists = matches!(device.item_type(&afs_path), Ok(ItemType::Folder));
                let _ = tx.send(exists);
            });
            rx
        })
        .collect();

    paths
        .iter()
        .zip(receivers)
        .map(|(path, rx)| match rx.recv_timeout(timeout) {
            Ok(exists) => exists,
            Err(_) => {
                warn!(path = %path.display(), "existence probe timed out");
                false
            }
        })
        .collect()
}
