//! Freedesktop trash integration for the native backend.
//!
//! Items are renamed into `$XDG_DATA_HOME/Trash` (falling back to
//! `~/.local/share/Trash`) with a `.trashinfo` sidecar. Renaming only works
//! within one filesystem, so availability requires the item and the trash
//! folder to share a device; callers fall back to permanent deletion
//! otherwise.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::FileError;

fn trash_root() -> Option<PathBuf> {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME")
        && !data_home.is_empty()
    {
        return Some(PathBuf::from(data_home).join("Trash"));
    }
    std::env::var("HOME")
        .ok()
        .filter(|h| !h.is_empty())
        .map(|h| PathBuf::from(h).join(".local/share/Trash"))
}

fn device_of(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    fs::symlink_metadata(path).ok().map(|m| m.dev())
}

pub(super) fn available_for(item: &Path) -> bool {
    let Some(root) = trash_root() else {
        return false;
    };
    if fs::create_dir_all(root.join("files")).is_err()
        || fs::create_dir_all(root.join("info")).is_err()
    {
        return false;
    }
    let item_dev = item
        .parent()
        .and_then(device_of)
        .or_else(|| device_of(item));
    match (item_dev, device_of(&root)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

pub(super) fn move_to_trash(item: &Path) -> Result<(), FileError> {
    let root = trash_root().ok_or_else(|| {
        FileError::other(
            format!("Cannot recycle \"{}\".", item.display()),
            "no trash folder available",
        )
    })?;

    let base_name = item
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "item".to_owned());

    // pick a free slot in files/ and claim it via the info file
    for attempt in 0..100 {
        let trashed_name = if attempt == 0 {
            base_name.clone()
        } else {
            format!("{base_name}.{attempt}")
        };
        let info_path = root.join("info").join(format!("{trashed_name}.trashinfo"));
        let file_path = root.join("files").join(&trashed_name);

        let mut info = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&info_path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(FileError::from_io(
                    format!("Cannot recycle \"{}\".", item.display()),
                    &e,
                ));
            }
        };

        let result = write_info(&mut info, item).and_then(|()| {
            fs::rename(item, &file_path).map_err(|e| {
                FileError::from_io(format!("Cannot recycle \"{}\".", item.display()), &e)
            })
        });
        if result.is_err() {
            let _ = fs::remove_file(&info_path);
        }
        return result;
    }

    Err(FileError::other(
        format!("Cannot recycle \"{}\".", item.display()),
        "too many identically named items in trash",
    ))
}

fn write_info(info: &mut fs::File, item: &Path) -> Result<(), FileError> {
    let now = time::OffsetDateTime::now_utc();
    let format = time::macros::format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let stamp = now.format(&format).unwrap_or_default();
    write!(
        info,
        "[Trash Info]\nPath={}\nDeletionDate={stamp}\n",
        item.display()
    )
    .map_err(|e| FileError::from_io(format!("Cannot recycle \"{}\".", item.display()), &e))
}
