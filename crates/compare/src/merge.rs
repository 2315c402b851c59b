//! Merging both sides' scan output into the paired tree.
//!
//! Within each level, file pairs are inserted before symlink pairs before
//! folder pairs, and each folder's subtree is populated immediately after
//! the folder itself; ids issued in this order make later searches by id
//! meaningful.

use model::{
    Category, CompareVariant, FileDescriptor, FileSide, FolderContainer, FolderSide, IdIssuer,
    LinkDescriptor, LinkSide, ObjectId,
};
use vfs::cmp_file_names;

use crate::scan::FolderScan;
use crate::time_cmp::{TimeCompare, TimeResult, same_file_time};

/// A same-size file pair queued for bytewise comparison.
pub(crate) struct PendingContent {
    pub id: ObjectId,
    /// Base-folder-relative path with `/` separators.
    pub rel: String,
    /// Both sides' sizes summed; the workload of this pair.
    pub bytes: u64,
}

pub(crate) struct MergeContext<'a> {
    pub ids: &'a mut IdIssuer,
    pub case_sensitive: bool,
    pub variant: CompareVariant,
    pub time_cmp: TimeCompare,
    pub tolerance: i64,
    pub pending: Vec<PendingContent>,
}

enum Outcome {
    Set(Category),
    Conflict(String),
    /// Same size under the content variant: queue for bytewise compare.
    Pending,
}

/// One merged slot of two name-sorted entry lists.
enum Merged<L, R> {
    Left(String, L),
    Right(String, R),
    Both(String, L, String, R),
}

fn merge_sorted<L, R>(
    mut left: Vec<(String, L)>,
    mut right: Vec<(String, R)>,
    case_sensitive: bool,
) -> Vec<Merged<L, R>> {
    left.sort_by(|a, b| cmp_file_names(&a.0, &b.0, case_sensitive));
    right.sort_by(|a, b| cmp_file_names(&a.0, &b.0, case_sensitive));

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left_iter = left.into_iter().peekable();
    let mut right_iter = right.into_iter().peekable();

    loop {
        let take_left = match (left_iter.peek(), right_iter.peek()) {
            (Some(l), Some(r)) => match cmp_file_names(&l.0, &r.0, case_sensitive) {
                std::cmp::Ordering::Less => Some(true),
                std::cmp::Ordering::Greater => Some(false),
                std::cmp::Ordering::Equal => {
                    let (l_name, l_data) = left_iter.next().expect("peeked");
                    let (r_name, r_data) = right_iter.next().expect("peeked");
                    out.push(Merged::Both(l_name, l_data, r_name, r_data));
                    continue;
                }
            },
            (Some(_), None) => Some(true),
            (None, Some(_)) => Some(false),
            (None, None) => break,
        };
        match take_left {
            Some(true) => {
                let (name, data) = left_iter.next().expect("peeked");
                out.push(Merged::Left(name, data));
            }
            Some(false) => {
                let (name, data) = right_iter.next().expect("peeked");
                out.push(Merged::Right(name, data));
            }
            None => unreachable!(),
        }
    }
    out
}

pub(crate) fn merge_trees(
    ctx: &mut MergeContext<'_>,
    left: FolderScan,
    right: FolderScan,
    out: &mut FolderContainer,
) {
    merge_level(ctx, left, right, "", out);
}

fn join_rel(rel: &str, name: &str) -> String {
    if rel.is_empty() {
        name.to_owned()
    } else {
        format!("{rel}/{name}")
    }
}

fn categorize_files(
    ctx: &MergeContext<'_>,
    l_name: &str,
    l: &FileDescriptor,
    r_name: &str,
    r: &FileDescriptor,
) -> Outcome {
    match ctx.variant {
        CompareVariant::TimeSize => match ctx.time_cmp.compare(l.mtime, r.mtime) {
            TimeResult::Equal => {
                if l.size == r.size {
                    if l_name == r_name {
                        Outcome::Set(Category::Equal)
                    } else {
                        Outcome::Set(Category::DifferentMetadata)
                    }
                } else {
                    Outcome::Set(Category::Different)
                }
            }
            TimeResult::LeftNewer => Outcome::Set(Category::LeftNewer),
            TimeResult::RightNewer => Outcome::Set(Category::RightNewer),
            TimeResult::LeftInvalid => Outcome::Conflict(format!(
                "Conflict: timestamp suspicious on left side: {}",
                l.mtime
            )),
            TimeResult::RightInvalid => Outcome::Conflict(format!(
                "Conflict: timestamp suspicious on right side: {}",
                r.mtime
            )),
        },
        CompareVariant::Content => {
            if l.size == r.size {
                Outcome::Pending
            } else {
                Outcome::Set(Category::Different)
            }
        }
    }
}

fn categorize_symlinks(
    ctx: &MergeContext<'_>,
    l_name: &str,
    l: &LinkDescriptor,
    r_name: &str,
    r: &LinkDescriptor,
) -> Outcome {
    match ctx.variant {
        CompareVariant::TimeSize => match ctx.time_cmp.compare(l.mtime, r.mtime) {
            TimeResult::Equal => {
                if l.target == r.target {
                    if l_name == r_name {
                        Outcome::Set(Category::Equal)
                    } else {
                        Outcome::Set(Category::DifferentMetadata)
                    }
                } else {
                    Outcome::Set(Category::Different)
                }
            }
            TimeResult::LeftNewer => Outcome::Set(Category::LeftNewer),
            TimeResult::RightNewer => Outcome::Set(Category::RightNewer),
            TimeResult::LeftInvalid => Outcome::Conflict(format!(
                "Conflict: timestamp suspicious on left side: {}",
                l.mtime
            )),
            TimeResult::RightInvalid => Outcome::Conflict(format!(
                "Conflict: timestamp suspicious on right side: {}",
                r.mtime
            )),
        },
        CompareVariant::Content => {
            if l.target == r.target {
                if l_name == r_name && same_file_time(l.mtime, r.mtime, ctx.tolerance) {
                    Outcome::Set(Category::Equal)
                } else {
                    Outcome::Set(Category::DifferentMetadata)
                }
            } else {
                Outcome::Set(Category::Different)
            }
        }
    }
}

fn merge_level(
    ctx: &mut MergeContext<'_>,
    left: FolderScan,
    right: FolderScan,
    rel: &str,
    out: &mut FolderContainer,
) {
    let case_sensitive = ctx.case_sensitive;

    // files
    for entry in merge_sorted(left.files, right.files, case_sensitive) {
        match entry {
            Merged::Left(name, descr) => {
                out.add_file(
                    ctx.ids,
                    Some(FileSide { name, attrs: descr }),
                    None,
                    Category::LeftOnly,
                );
            }
            Merged::Right(name, descr) => {
                out.add_file(
                    ctx.ids,
                    None,
                    Some(FileSide { name, attrs: descr }),
                    Category::RightOnly,
                );
            }
            Merged::Both(l_name, l_descr, r_name, r_descr) => {
                let outcome = categorize_files(ctx, &l_name, &l_descr, &r_name, &r_descr);
                let rel_path = join_rel(rel, &l_name);
                let bytes = l_descr.size + r_descr.size;
                let pair = out.add_file(
                    ctx.ids,
                    Some(FileSide {
                        name: l_name,
                        attrs: l_descr,
                    }),
                    Some(FileSide {
                        name: r_name,
                        attrs: r_descr,
                    }),
                    Category::Different,
                );
                match outcome {
                    Outcome::Set(category) => pair.set_category(category),
                    Outcome::Conflict(note) => pair.set_category_conflict(note),
                    Outcome::Pending => ctx.pending.push(PendingContent {
                        id: pair.id(),
                        rel: rel_path,
                        bytes,
                    }),
                }
            }
        }
    }

    // symlinks
    for entry in merge_sorted(left.symlinks, right.symlinks, case_sensitive) {
        match entry {
            Merged::Left(name, descr) => {
                out.add_symlink(
                    ctx.ids,
                    Some(LinkSide { name, attrs: descr }),
                    None,
                    Category::LeftOnly,
                );
            }
            Merged::Right(name, descr) => {
                out.add_symlink(
                    ctx.ids,
                    None,
                    Some(LinkSide { name, attrs: descr }),
                    Category::RightOnly,
                );
            }
            Merged::Both(l_name, l_descr, r_name, r_descr) => {
                let outcome = categorize_symlinks(ctx, &l_name, &l_descr, &r_name, &r_descr);
                let pair = out.add_symlink(
                    ctx.ids,
                    Some(LinkSide {
                        name: l_name,
                        attrs: l_descr,
                    }),
                    Some(LinkSide {
                        name: r_name,
                        attrs: r_descr,
                    }),
                    Category::Different,
                );
                match outcome {
                    Outcome::Set(category) => pair.set_category(category),
                    Outcome::Conflict(note) => pair.set_category_conflict(note),
                    Outcome::Pending => unreachable!("symlinks are never queued for content compare"),
                }
            }
        }
    }

    // folders, each subtree populated directly after its pair
    for entry in merge_sorted(left.folders, right.folders, case_sensitive) {
        match entry {
            Merged::Left(name, scan) => {
                let rel_path = join_rel(rel, &name);
                let pair =
                    out.add_folder(ctx.ids, Some(FolderSide { name }), None, Category::LeftOnly);
                let children = &mut pair.children;
                merge_level(ctx, scan, FolderScan::default(), &rel_path, children);
            }
            Merged::Right(name, scan) => {
                let rel_path = join_rel(rel, &name);
                let pair =
                    out.add_folder(ctx.ids, None, Some(FolderSide { name }), Category::RightOnly);
                let children = &mut pair.children;
                merge_level(ctx, FolderScan::default(), scan, &rel_path, children);
            }
            Merged::Both(l_name, l_scan, r_name, r_scan) => {
                let rel_path = join_rel(rel, &l_name);
                let category = if l_name == r_name {
                    Category::Equal
                } else {
                    Category::DifferentMetadata
                };
                let pair = out.add_folder(
                    ctx.ids,
                    Some(FolderSide { name: l_name }),
                    Some(FolderSide { name: r_name }),
                    category,
                );
                let children = &mut pair.children;
                merge_level(ctx, l_scan, r_scan, &rel_path, children);
            }
        }
    }
}
