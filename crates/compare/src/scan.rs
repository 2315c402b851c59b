//! Per-side folder scanning with hard-filter pruning.
//!
//! Scanners run on worker threads, one per side; they communicate with
//! the callback-owning thread through [`ScanEvent`]s: status lines,
//! object counts, and recoverable errors that block on the front end's
//! choice.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;

use filters::PathFilter;
use model::{FileDescriptor, LinkDescriptor, SymlinkPolicy};
use vfs::{
    AbstractPath, ErrorChoice, FileError, FileInfo, FolderInfo, HandleLink, SymlinkInfo,
    TraverseSink,
};

/// Raw scan output of one folder level plus its retained subtree.
#[derive(Debug, Default)]
pub struct FolderScan {
    pub files: Vec<(String, FileDescriptor)>,
    pub symlinks: Vec<(String, LinkDescriptor)>,
    pub folders: Vec<(String, FolderScan)>,
}

impl FolderScan {
    fn is_empty(&self) -> bool {
        self.files.is_empty() && self.symlinks.is_empty() && self.folders.is_empty()
    }
}

/// Message from a scan worker to the callback pump.
pub(crate) enum ScanEvent {
    Status(String),
    Items(i64),
    Error {
        message: String,
        reply: Sender<ErrorChoice>,
    },
}

pub(crate) struct ScanContext<'a> {
    pub events: Sender<ScanEvent>,
    pub abort: &'a AtomicBool,
    pub filter: &'a PathFilter,
    pub symlink_policy: SymlinkPolicy,
}

impl ScanContext<'_> {
    fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Blocks on the front end's choice for a recoverable error.
    fn handle_error(&self, err: &FileError) -> ErrorChoice {
        if self.aborted() {
            return ErrorChoice::Abort;
        }
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        if self
            .events
            .send(ScanEvent::Error {
                message: err.to_string(),
                reply: reply_tx,
            })
            .is_err()
        {
            return ErrorChoice::Abort;
        }
        reply_rx.recv().unwrap_or(ErrorChoice::Abort)
    }

    fn count_item(&self) {
        let _ = self.events.send(ScanEvent::Items(1));
    }
}

struct LevelSink<'a> {
    ctx: &'a ScanContext<'a>,
    files: Vec<FileInfo>,
    folders: Vec<FolderInfo>,
    symlinks: Vec<SymlinkInfo>,
}

impl TraverseSink for LevelSink<'_> {
    fn on_file(&mut self, info: FileInfo) {
        self.files.push(info);
    }

    fn on_folder(&mut self, info: FolderInfo) {
        self.folders.push(info);
    }

    fn on_symlink(&mut self, info: SymlinkInfo) -> HandleLink {
        match self.ctx.symlink_policy {
            SymlinkPolicy::Follow => HandleLink::Follow,
            SymlinkPolicy::Direct => {
                self.symlinks.push(info);
                HandleLink::Skip
            }
            SymlinkPolicy::Exclude => HandleLink::Skip,
        }
    }

    fn on_error(&mut self, err: &FileError) -> ErrorChoice {
        self.ctx.handle_error(err)
    }
}

/// Lock and database files of the engine itself never enter the tree.
fn is_internal_item(name: &str) -> bool {
    name == lock::LOCK_FILE_NAME
        || name
            .strip_prefix("Del.")
            .is_some_and(|rest| rest == lock::LOCK_FILE_NAME)
        || name == db::DB_FILE_NAME
        || name
            .strip_suffix(".tmp")
            .is_some_and(|rest| rest == db::DB_FILE_NAME)
}

fn join_rel(rel: &str, name: &str) -> String {
    if rel.is_empty() {
        name.to_owned()
    } else {
        format!("{rel}/{name}")
    }
}

/// Scans one side of a base folder, applying the hard filter.
pub(crate) fn scan_side(ctx: &ScanContext<'_>, base: &AbstractPath) -> Result<FolderScan, FileError> {
    scan_folder(ctx, base, "")
}

fn scan_folder(
    ctx: &ScanContext<'_>,
    folder: &AbstractPath,
    rel: &str,
) -> Result<FolderScan, FileError> {
    if ctx.aborted() {
        return Err(FileError::aborted());
    }
    let _ = ctx
        .events
        .send(ScanEvent::Status(format!("Scanning {}", folder.display())));

    let mut sink = LevelSink {
        ctx,
        files: Vec::new(),
        folders: Vec::new(),
        symlinks: Vec::new(),
    };
    loop {
        match folder.device.traverse_folder(&folder.path, &mut sink) {
            Ok(()) => break,
            Err(e) if e.is_abort() => return Err(e),
            Err(e) => match ctx.handle_error(&e) {
                ErrorChoice::Retry => {
                    sink.files.clear();
                    sink.folders.clear();
                    sink.symlinks.clear();
                }
                ErrorChoice::Ignore => return Ok(FolderScan::default()),
                ErrorChoice::Abort => return Err(FileError::aborted()),
            },
        }
    }
    let LevelSink {
        files,
        folders,
        symlinks,
        ..
    } = sink;

    let mut out = FolderScan::default();

    for info in files {
        if ctx.aborted() {
            return Err(FileError::aborted());
        }
        if is_internal_item(&info.name) || !ctx.filter.passes_file(&join_rel(rel, &info.name)) {
            continue;
        }
        ctx.count_item();
        out.files.push((
            info.name,
            FileDescriptor {
                mtime: info.mtime,
                size: info.size,
                file_id: info.file_id,
            },
        ));
    }

    for info in symlinks {
        if ctx.aborted() {
            return Err(FileError::aborted());
        }
        if is_internal_item(&info.name) || !ctx.filter.passes_file(&join_rel(rel, &info.name)) {
            continue;
        }
        let link_path = folder.join(&info.name);
        let target = loop {
            match link_path.device.read_symlink(&link_path.path) {
                Ok(target) => break Some(target),
                Err(e) => match ctx.handle_error(&e) {
                    ErrorChoice::Retry => {}
                    ErrorChoice::Ignore => break None,
                    ErrorChoice::Abort => return Err(FileError::aborted()),
                },
            }
        };
        let Some(target) = target else { continue };
        ctx.count_item();
        out.symlinks.push((
            info.name,
            LinkDescriptor {
                mtime: info.mtime,
                target,
            },
        ));
    }

    for info in folders {
        if ctx.aborted() {
            return Err(FileError::aborted());
        }
        let rel_path = join_rel(rel, &info.name);
        let matched = ctx.filter.passes_folder(&rel_path);
        if !matched.included && !matched.descendants_might_match {
            continue;
        }

        let subtree = scan_folder(ctx, &folder.join(&info.name), &rel_path)?;
        if matched.included {
            ctx.count_item();
            out.folders.push((info.name, subtree));
        } else if !subtree.is_empty() {
            // kept only as a carrier for matching descendants
            out.folders.push((info.name, subtree));
        }
    }

    Ok(out)
}
