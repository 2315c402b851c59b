//! Per-side deletion handling: permanent, recycle bin, or versioning.

use std::sync::Arc;

use tracing::debug;

use model::DeletionPolicy;
use status::ProcessCallback;
use versioning::Versioner;
use vfs::ops::{item_type_if_exists, remove_folder_if_exists_recursive};
use vfs::{AbstractPath, FileError, ItemType};

/// Routes deletions of one side according to the configured policy.
///
/// The recycler is probed once per base folder at construction; when a
/// side has no recycler but the user requested one, a warning is emitted
/// and deletions fall back to permanent.
pub struct DeletionHandler {
    policy: DeletionPolicy,
    versioner: Option<Arc<Versioner>>,
}

impl DeletionHandler {
    pub fn new(
        policy: DeletionPolicy,
        base: &AbstractPath,
        versioner: Option<Arc<Versioner>>,
        callback: &mut dyn ProcessCallback,
    ) -> Self {
        let mut policy = policy;
        match policy {
            DeletionPolicy::RecycleBin => {
                if !base.device.recycler_available(&base.path) {
                    let mut dont_show = false;
                    callback.report_warning(
                        &format!(
                            "The recycle bin is not available for \"{}\". Items will be deleted permanently.",
                            base.display()
                        ),
                        &mut dont_show,
                    );
                    policy = DeletionPolicy::Permanent;
                }
            }
            DeletionPolicy::Versioning => {
                debug_assert!(versioner.is_some(), "versioning policy without a versioner");
                if versioner.is_none() {
                    policy = DeletionPolicy::Permanent;
                }
            }
            DeletionPolicy::Permanent => {}
        }
        Self { policy, versioner }
    }

    /// Removes (or recycles, or versions) a file or symlink; a missing
    /// item is not an error.
    pub fn remove_file(&self, path: &AbstractPath, rel_name: &str) -> Result<(), FileError> {
        match self.policy {
            DeletionPolicy::Permanent => match item_type_if_exists(path)? {
                None => Ok(()),
                Some(ItemType::Symlink) => path.device.remove_symlink_plain(&path.path),
                Some(_) => path.device.remove_file_plain(&path.path),
            },
            DeletionPolicy::RecycleBin => {
                if item_type_if_exists(path)?.is_none() {
                    return Ok(());
                }
                debug!(item = %path.display(), "recycling file");
                path.device.recycle_item(&path.path)
            }
            DeletionPolicy::Versioning => {
                let versioner = self.versioner.as_ref().expect("checked at construction");
                versioner.revision_file(path, rel_name, &mut |_| Ok(()))?;
                Ok(())
            }
        }
    }

    /// Removes a folder with everything below it.
    pub fn remove_folder(&self, path: &AbstractPath, rel_name: &str) -> Result<(), FileError> {
        match self.policy {
            DeletionPolicy::Permanent => {
                remove_folder_if_exists_recursive(path, &mut |_| Ok(()), &mut |_| Ok(()))
            }
            DeletionPolicy::RecycleBin => {
                if item_type_if_exists(path)?.is_none() {
                    return Ok(());
                }
                debug!(item = %path.display(), "recycling folder");
                path.device.recycle_item(&path.path)
            }
            DeletionPolicy::Versioning => {
                let versioner = self.versioner.as_ref().expect("checked at construction");
                versioner.revision_folder(path, rel_name, &mut |_| Ok(()))
            }
        }
    }
}
