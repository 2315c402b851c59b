//! Native backend: the local filesystem, rooted at one base folder.

use std::cmp::Ordering;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::IoProgress;
use crate::device::{
    CopiedAttributes, Device, DeviceKind, ErrorChoice, FileId, FileInfo, FolderInfo, HandleLink,
    InputStream, ItemType, OutputExpectation, OutputStream, SymlinkInfo, TraverseSink,
};
use crate::error::{FileError, FileErrorKind};
use crate::path::AfsPath;

#[cfg(all(unix, not(target_os = "macos")))]
mod trash;

const COPY_BUF_LEN: usize = 128 * 1024;

/// Local-filesystem device rooted at a base folder.
///
/// Two instances compare equal when their canonical root paths match under
/// the platform case policy, so a rename between paths of one base folder
/// short-circuits to a single OS-level move.
pub struct NativeDevice {
    root: PathBuf,
}

impl NativeDevice {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &AfsPath) -> PathBuf {
        let mut full = self.root.clone();
        for comp in path.components() {
            full.push(comp);
        }
        full
    }
}

fn mtime_of(meta: &fs::Metadata) -> i64 {
    FileTime::from_last_modification_time(meta).unix_seconds()
}

#[cfg(unix)]
fn file_id_of(meta: &fs::Metadata) -> FileId {
    use std::os::unix::fs::MetadataExt;
    let mut bytes = Vec::with_capacity(16);
    bytes.extend_from_slice(&meta.dev().to_le_bytes());
    bytes.extend_from_slice(&meta.ino().to_le_bytes());
    FileId(bytes)
}

#[cfg(not(unix))]
fn file_id_of(_meta: &fs::Metadata) -> FileId {
    FileId::default()
}

fn cannot_read(path: &Path, err: &std::io::Error) -> FileError {
    FileError::from_io(format!("Cannot read file \"{}\".", path.display()), err)
}

fn cannot_write(path: &Path, err: &std::io::Error) -> FileError {
    FileError::from_io(format!("Cannot write file \"{}\".", path.display()), err)
}

impl Device for NativeDevice {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Native
    }

    fn root_display(&self) -> String {
        self.root.display().to_string()
    }

    fn is_case_sensitive(&self) -> bool {
        cfg!(not(windows))
    }

    fn compare_root_same_kind(&self, other: &dyn Device) -> Ordering {
        let own = self.root.to_string_lossy();
        let theirs = other.root_display();
        crate::path::cmp_file_names(&own, &theirs, self.is_case_sensitive())
    }

    fn item_type(&self, path: &AfsPath) -> Result<ItemType, FileError> {
        let full = self.resolve(path);
        let meta = fs::symlink_metadata(&full).map_err(|e| {
            FileError::from_io(format!("Cannot find \"{}\".", full.display()), &e)
        })?;
        let ty = meta.file_type();
        if ty.is_symlink() {
            Ok(ItemType::Symlink)
        } else if ty.is_dir() {
            Ok(ItemType::Folder)
        } else {
            Ok(ItemType::File)
        }
    }

    fn traverse_folder(
        &self,
        path: &AfsPath,
        sink: &mut dyn TraverseSink,
    ) -> Result<(), FileError> {
        let full = self.resolve(path);
        let entries = fs::read_dir(&full).map_err(|e| {
            FileError::from_io(format!("Cannot open folder \"{}\".", full.display()), &e)
        })?;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let err = cannot_read(&full, &e);
                    match sink.on_error(&err) {
                        ErrorChoice::Ignore => continue,
                        // listing errors are not entry-addressable; retrying
                        // the iterator element is not possible
                        ErrorChoice::Retry | ErrorChoice::Abort => return Err(err),
                    }
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let item_path = entry.path();

            loop {
                match report_entry(&item_path, &name, sink) {
                    Ok(()) => break,
                    Err(err) => match sink.on_error(&err) {
                        ErrorChoice::Ignore => break,
                        ErrorChoice::Retry => {}
                        ErrorChoice::Abort => return Err(err),
                    },
                }
            }
        }
        Ok(())
    }

    fn open_input(&self, path: &AfsPath) -> Result<Box<dyn InputStream>, FileError> {
        let full = self.resolve(path);
        let file = fs::File::open(&full).map_err(|e| cannot_read(&full, &e))?;
        let meta = file.metadata().map_err(|e| cannot_read(&full, &e))?;
        Ok(Box::new(NativeInputStream { file, meta }))
    }

    fn open_output(
        &self,
        path: &AfsPath,
        expected: OutputExpectation,
    ) -> Result<Box<dyn OutputStream>, FileError> {
        let full = self.resolve(path);
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .map_err(|e| cannot_write(&full, &e))?;
        Ok(Box::new(NativeOutputStream {
            file: Some(file),
            full,
            expected,
            written: 0,
        }))
    }

    fn append_to_file(&self, path: &AfsPath, bytes: &[u8]) -> Result<(), FileError> {
        let full = self.resolve(path);
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&full)
            .map_err(|e| cannot_write(&full, &e))?;
        file.write_all(bytes).map_err(|e| cannot_write(&full, &e))
    }

    fn create_folder(&self, path: &AfsPath) -> Result<(), FileError> {
        let full = self.resolve(path);
        fs::create_dir(&full).map_err(|e| {
            let err =
                FileError::from_io(format!("Cannot create folder \"{}\".", full.display()), &e);
            if e.kind() == std::io::ErrorKind::NotFound {
                FileError::new(
                    FileErrorKind::TargetPathMissing,
                    err.message().to_owned(),
                    err.detail().to_owned(),
                )
            } else {
                err
            }
        })
    }

    fn remove_file_plain(&self, path: &AfsPath) -> Result<(), FileError> {
        let full = self.resolve(path);
        fs::remove_file(&full)
            .map_err(|e| FileError::from_io(format!("Cannot delete file \"{}\".", full.display()), &e))
    }

    fn remove_symlink_plain(&self, path: &AfsPath) -> Result<(), FileError> {
        // on this platform symlinks unlink like files
        self.remove_file_plain(path)
    }

    fn remove_folder_plain(&self, path: &AfsPath) -> Result<(), FileError> {
        let full = self.resolve(path);
        fs::remove_dir(&full).map_err(|e| {
            FileError::from_io(format!("Cannot delete folder \"{}\".", full.display()), &e)
        })
    }

    fn rename_item(&self, from: &AfsPath, to: &AfsPath) -> Result<(), FileError> {
        let source = self.resolve(from);
        let target = self.resolve(to);
        if fs::symlink_metadata(&target).is_ok() {
            return Err(FileError::new(
                FileErrorKind::TargetExisting,
                format!("Cannot move to \"{}\": target already exists.", target.display()),
                "",
            ));
        }
        fs::rename(&source, &target).map_err(|e| {
            FileError::from_io(
                format!(
                    "Cannot move \"{}\" to \"{}\".",
                    source.display(),
                    target.display()
                ),
                &e,
            )
        })
    }

    fn copy_file_same_device(
        &self,
        from: &AfsPath,
        to: &AfsPath,
        copy_permissions: bool,
        progress: IoProgress<'_>,
    ) -> Result<CopiedAttributes, FileError> {
        let source = self.resolve(from);
        let target = self.resolve(to);

        let mut input = fs::File::open(&source).map_err(|e| cannot_read(&source, &e))?;
        let source_meta = input.metadata().map_err(|e| cannot_read(&source, &e))?;

        let mut output = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .map_err(|e| cannot_write(&target, &e))?;

        let result = (|| {
            let mut buf = vec![0u8; COPY_BUF_LEN];
            loop {
                let read = input.read(&mut buf).map_err(|e| cannot_read(&source, &e))?;
                if read == 0 {
                    break;
                }
                output
                    .write_all(&buf[..read])
                    .map_err(|e| cannot_write(&target, &e))?;
                progress(2 * read as u64)?;
            }
            output.flush().map_err(|e| cannot_write(&target, &e))?;

            if copy_permissions {
                fs::set_permissions(&target, source_meta.permissions()).map_err(|e| {
                    FileError::from_io(
                        format!("Cannot write permissions of \"{}\".", target.display()),
                        &e,
                    )
                })?;
            }

            let mtime = mtime_of(&source_meta);
            filetime::set_file_mtime(&target, FileTime::from_unix_time(mtime, 0))
                .map_err(|e| cannot_write(&target, &e))?;

            let target_meta = fs::metadata(&target).map_err(|e| cannot_read(&target, &e))?;
            Ok(CopiedAttributes {
                file_size: source_meta.len(),
                mtime,
                source_file_id: file_id_of(&source_meta),
                target_file_id: file_id_of(&target_meta),
            })
        })();

        if result.is_err() {
            let _ = fs::remove_file(&target);
        }
        result
    }

    fn read_symlink(&self, path: &AfsPath) -> Result<String, FileError> {
        let full = self.resolve(path);
        let target = fs::read_link(&full).map_err(|e| {
            FileError::from_io(format!("Cannot resolve symbolic link \"{}\".", full.display()), &e)
        })?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn set_file_time(&self, path: &AfsPath, mtime: i64) -> Result<(), FileError> {
        let full = self.resolve(path);
        filetime::set_file_mtime(&full, FileTime::from_unix_time(mtime, 0))
            .map_err(|e| cannot_write(&full, &e))
    }

    fn create_symlink(&self, path: &AfsPath, target: &str) -> Result<(), FileError> {
        let full = self.resolve(path);
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, &full).map_err(|e| {
                FileError::from_io(
                    format!("Cannot create symbolic link \"{}\".", full.display()),
                    &e,
                )
            })
        }
        #[cfg(not(unix))]
        {
            let _ = target;
            Err(FileError::other(
                format!("Cannot create symbolic link \"{}\".", full.display()),
                "not supported on this platform",
            ))
        }
    }

    fn set_symlink_time(&self, path: &AfsPath, mtime: i64) -> Result<(), FileError> {
        let full = self.resolve(path);
        let stamp = FileTime::from_unix_time(mtime, 0);
        filetime::set_symlink_file_times(&full, stamp, stamp)
            .map_err(|e| cannot_write(&full, &e))
    }

    fn recycler_available(&self, path: &AfsPath) -> bool {
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            trash::available_for(&self.resolve(path))
        }
        #[cfg(not(all(unix, not(target_os = "macos"))))]
        {
            let _ = path;
            false
        }
    }

    fn recycle_item(&self, path: &AfsPath) -> Result<(), FileError> {
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            trash::move_to_trash(&self.resolve(path))
        }
        #[cfg(not(all(unix, not(target_os = "macos"))))]
        {
            Err(FileError::other(
                format!("Cannot recycle \"{}\".", self.resolve(path).display()),
                "recycle bin not supported on this platform",
            ))
        }
    }
}

fn report_entry(item_path: &Path, name: &str, sink: &mut dyn TraverseSink) -> Result<(), FileError> {
    let meta = fs::symlink_metadata(item_path)
        .map_err(|e| cannot_read(item_path, &e))?;
    let ty = meta.file_type();

    if ty.is_symlink() {
        let link_info = SymlinkInfo {
            name: name.to_owned(),
            mtime: mtime_of(&meta),
        };
        match sink.on_symlink(link_info.clone()) {
            HandleLink::Skip => {}
            HandleLink::Follow => {
                // broken links surface through the per-entry error handler
                let target_meta =
                    fs::metadata(item_path).map_err(|e| cannot_read(item_path, &e))?;
                if target_meta.is_dir() {
                    sink.on_folder(FolderInfo {
                        name: name.to_owned(),
                        symlink: Some(link_info),
                    });
                } else {
                    sink.on_file(FileInfo {
                        name: name.to_owned(),
                        size: target_meta.len(),
                        mtime: mtime_of(&target_meta),
                        file_id: file_id_of(&target_meta),
                        symlink: Some(link_info),
                    });
                }
            }
        }
    } else if ty.is_dir() {
        sink.on_folder(FolderInfo {
            name: name.to_owned(),
            symlink: None,
        });
    } else {
        sink.on_file(FileInfo {
            name: name.to_owned(),
            size: meta.len(),
            mtime: mtime_of(&meta),
            file_id: file_id_of(&meta),
            symlink: None,
        });
    }
    Ok(())
}

struct NativeInputStream {
    file: fs::File,
    meta: fs::Metadata,
}

impl InputStream for NativeInputStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError> {
        loop {
            match self.file.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(FileError::from_io("Cannot read file.", &e)),
            }
        }
    }

    fn size(&self) -> Result<u64, FileError> {
        Ok(self.meta.len())
    }

    fn mtime(&self) -> Result<i64, FileError> {
        Ok(mtime_of(&self.meta))
    }

    fn file_id(&self) -> FileId {
        file_id_of(&self.meta)
    }
}

struct NativeOutputStream {
    file: Option<fs::File>,
    full: PathBuf,
    expected: OutputExpectation,
    written: u64,
}

impl OutputStream for NativeOutputStream {
    fn write(&mut self, buf: &[u8]) -> Result<(), FileError> {
        let file = self.file.as_mut().expect("stream already finalized");
        file.write_all(buf)
            .map_err(|e| cannot_write(&self.full, &e))?;
        self.written += buf.len() as u64;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<FileId, FileError> {
        let mut file = self.file.take().expect("stream already finalized");
        file.flush().map_err(|e| cannot_write(&self.full, &e))?;
        drop(file);

        if let Some(expected) = self.expected.size
            && expected != self.written
        {
            return Err(FileError::other(
                format!("Cannot write file \"{}\".", self.full.display()),
                format!(
                    "Unexpected size of data stream. Expected: {expected} bytes, actual: {} bytes",
                    self.written
                ),
            ));
        }

        if let Some(mtime) = self.expected.mtime {
            filetime::set_file_mtime(&self.full, FileTime::from_unix_time(mtime, 0))
                .map_err(|e| cannot_write(&self.full, &e))?;
        }

        let meta = fs::metadata(&self.full).map_err(|e| cannot_read(&self.full, &e))?;
        Ok(file_id_of(&meta))
    }
}
