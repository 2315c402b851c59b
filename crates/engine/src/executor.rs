//! The ordered execution of one base-folder pair's plan.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use model::{
    BaseFolderPair, BySide, Category, Direction, FileDescriptor, FilePair, FileSide,
    FolderContainer, FolderPair, FolderSide, MainConfig, ObjectId, Side, SymlinkPair,
};
use status::ProcessCallback;
use versioning::Versioner;
use vfs::ops::{copy_file_transactional, create_folder_if_missing_recursive, rename_item};
use vfs::{AbstractPath, ErrorChoice, FileError, FileErrorKind};

use crate::SyncSummary;
use crate::deletion::DeletionHandler;

/// One item-level operation against the target side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ItemOp {
    Create,
    Delete,
    Overwrite,
    /// Content agrees; align name case and modification time only.
    UpdateMetadata,
}

fn classify(
    active: bool,
    direction: Direction,
    category: Category,
    present: BySide<bool>,
) -> Option<(ItemOp, Side)> {
    if !active {
        return None;
    }
    let target = direction.target_side()?;
    let source = target.opposite();
    match (present[source], present[target]) {
        (true, false) => Some((ItemOp::Create, target)),
        (false, true) => Some((ItemOp::Delete, target)),
        (true, true) => Some((
            if category == Category::DifferentMetadata {
                ItemOp::UpdateMetadata
            } else {
                ItemOp::Overwrite
            },
            target,
        )),
        (false, false) => None,
    }
}

fn classify_file(pair: &FilePair) -> Option<(ItemOp, Side)> {
    classify(
        pair.is_active(),
        pair.direction(),
        pair.category(),
        BySide::new(pair.sides.left.is_some(), pair.sides.right.is_some()),
    )
}

fn classify_symlink(pair: &SymlinkPair) -> Option<(ItemOp, Side)> {
    classify(
        pair.is_active(),
        pair.direction(),
        pair.category(),
        BySide::new(pair.sides.left.is_some(), pair.sides.right.is_some()),
    )
}

fn classify_folder(pair: &FolderPair) -> Option<(ItemOp, Side)> {
    classify(
        pair.is_active(),
        pair.direction(),
        pair.category(),
        BySide::new(pair.sides.left.is_some(), pair.sides.right.is_some()),
    )
}

fn join_rel(rel: &str, name: &str) -> String {
    if rel.is_empty() {
        name.to_owned()
    } else {
        format!("{rel}/{name}")
    }
}

fn append_rel(base: &AbstractPath, rel: &str) -> AbstractPath {
    let mut out = base.clone();
    for comp in rel.split('/').filter(|c| !c.is_empty()) {
        out = out.join(comp);
    }
    out
}

/// Runs `operation` under the error protocol, passing the callback back
/// in so the operation can report progress.
fn with_retry<T>(
    callback: &mut dyn ProcessCallback,
    mut operation: impl FnMut(&mut dyn ProcessCallback) -> Result<T, FileError>,
) -> Result<Option<T>, FileError> {
    loop {
        match operation(callback) {
            Ok(value) => return Ok(Some(value)),
            Err(e) if e.is_abort() => return Err(e),
            Err(e) => match callback.handle_error(&e.to_string()) {
                ErrorChoice::Retry => {}
                ErrorChoice::Ignore => return Ok(None),
                ErrorChoice::Abort => return Err(FileError::aborted()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// workload estimation

pub(crate) fn estimate_workload(pairs: &[BaseFolderPair]) -> (i64, i64) {
    let mut objects = 0i64;
    let mut bytes = 0i64;
    for pair in pairs {
        estimate_level(&pair.root, &mut objects, &mut bytes);
    }
    (objects, bytes)
}

fn estimate_level(container: &FolderContainer, objects: &mut i64, bytes: &mut i64) {
    for pair in &container.files {
        let Some((op, target)) = classify_file(pair) else {
            continue;
        };
        *objects += 1;
        let copies_content = match op {
            ItemOp::Overwrite => true,
            // a linked move is a rename: no payload unless it degrades
            ItemOp::Create => pair.move_ref().is_none(),
            ItemOp::Delete | ItemOp::UpdateMetadata => false,
        };
        if copies_content
            && let Some(descr) = pair.descriptor(target.opposite())
        {
            *bytes += i64::try_from(descr.size).unwrap_or(i64::MAX);
        }
    }
    for pair in &container.symlinks {
        if classify_symlink(pair).is_some() {
            *objects += 1;
        }
    }
    for pair in &container.folders {
        if classify_folder(pair).is_some() {
            *objects += 1;
        }
        estimate_level(&pair.children, objects, bytes);
    }
}

pub(crate) fn count_conflicts(container: &FolderContainer) -> u64 {
    let mut count = 0;
    for pair in &container.files {
        if pair.is_active() && pair.direction_conflict().is_some() {
            count += 1;
        }
    }
    for pair in &container.symlinks {
        if pair.is_active() && pair.direction_conflict().is_some() {
            count += 1;
        }
    }
    for pair in &container.folders {
        if pair.is_active() && pair.direction_conflict().is_some() {
            count += 1;
        }
        count += count_conflicts(&pair.children);
    }
    count
}

// ---------------------------------------------------------------------------
// move execution

struct PlannedMove {
    new_id: ObjectId,
    old_id: ObjectId,
    target: Side,
    new_parent_rel: String,
}

fn collect_moves(
    container: &FolderContainer,
    rel: &str,
    planned: &mut Vec<PlannedMove>,
    parents: &mut HashMap<ObjectId, String>,
) {
    for pair in &container.files {
        if pair.move_ref().is_none() {
            continue;
        }
        parents.insert(pair.id(), rel.to_owned());
        if !pair.is_active() {
            continue;
        }
        let Some(target) = pair.direction().target_side() else {
            continue;
        };
        let source = target.opposite();
        if pair.sides[source].is_some() && pair.sides[target].is_none() {
            planned.push(PlannedMove {
                new_id: pair.id(),
                old_id: pair.move_ref().expect("checked above"),
                target,
                new_parent_rel: rel.to_owned(),
            });
        }
    }
    for pair in &container.folders {
        let name = pair.ref_name();
        collect_moves(&pair.children, &join_rel(rel, name), planned, parents);
    }
}

/// Executes resolver-detected moves as target-side renames; a rename that
/// cannot work degrades to the regular copy+delete with the workload
/// growing accordingly.
fn execute_moves(
    base: &mut BaseFolderPair,
    callback: &mut dyn ProcessCallback,
    summary: &mut SyncSummary,
) -> Result<(), FileError> {
    let mut planned = Vec::new();
    let mut parents = HashMap::new();
    collect_moves(&base.root, "", &mut planned, &mut parents);

    for mv in planned {
        let target = mv.target;
        let source = target.opposite();

        // gather everything immutably before touching the pairs
        let partner_state = base.root.find_file_by_id(mv.old_id).map(|partner| {
            (
                partner.short_name(target).map(str::to_owned),
                partner.descriptor(target).cloned(),
                partner.is_active()
                    && partner.move_ref() == Some(mv.new_id)
                    && partner.direction().target_side() == Some(target),
            )
        });
        let new_name = base
            .root
            .find_file_by_id(mv.new_id)
            .and_then(|p| p.short_name(source).map(str::to_owned));
        let source_size = base
            .root
            .find_file_by_id(mv.new_id)
            .and_then(|p| p.descriptor(source).map(|d| d.size));

        let (Some((Some(old_name), Some(old_attrs), partner_ok)), Some(new_name)) =
            (partner_state, new_name)
        else {
            dissolve_move(base, mv.new_id, mv.old_id);
            continue;
        };
        let Some(old_parent_rel) = parents.get(&mv.old_id).cloned() else {
            dissolve_move(base, mv.new_id, mv.old_id);
            continue;
        };
        if !partner_ok {
            dissolve_move(base, mv.new_id, mv.old_id);
            continue;
        }

        let old_path = append_rel(&base.base[target], &join_rel(&old_parent_rel, &old_name));
        let new_path = append_rel(&base.base[target], &join_rel(&mv.new_parent_rel, &new_name));
        callback.report_status(&format!(
            "Moving file {} to {}",
            old_path.display(),
            new_path.display()
        ));

        let mut degraded = false;
        let moved = loop {
            let attempt = (|| {
                if let Some(parent) = new_path.parent() {
                    create_folder_if_missing_recursive(&parent)?;
                }
                rename_item(&old_path, &new_path)
            })();
            match attempt {
                Ok(()) => break true,
                Err(e)
                    if matches!(
                        e.kind(),
                        FileErrorKind::DifferentVolume | FileErrorKind::TargetExisting
                    ) =>
                {
                    // not movable in one step: fall back to copy+delete
                    degraded = true;
                    break false;
                }
                Err(e) if e.is_abort() => return Err(e),
                Err(e) => match callback.handle_error(&e.to_string()) {
                    ErrorChoice::Retry => {}
                    ErrorChoice::Ignore => {
                        degraded = true;
                        summary.errors_ignored += 1;
                        break false;
                    }
                    ErrorChoice::Abort => return Err(FileError::aborted()),
                },
            }
        };

        if moved {
            base.root
                .find_file_by_id_mut(mv.new_id)
                .expect("pair exists")
                .set_synced(
                    target,
                    FileSide {
                        name: new_name,
                        attrs: FileDescriptor {
                            mtime: old_attrs.mtime,
                            size: old_attrs.size,
                            file_id: old_attrs.file_id,
                        },
                    },
                );
            base.root
                .find_file_by_id_mut(mv.old_id)
                .expect("pair exists")
                .remove_side(target);
            summary.items_moved += 1;
            callback.update_progress(2, 0);
        } else if degraded {
            debug!(from = %old_path.display(), to = %new_path.display(), "move degraded to copy+delete");
            dissolve_move(base, mv.new_id, mv.old_id);
            callback.update_total(0, source_size.map_or(0, |s| i64::try_from(s).unwrap_or(0)));
        }
        callback.request_ui_refresh()?;
    }
    Ok(())
}

fn dissolve_move(base: &mut BaseFolderPair, a: ObjectId, b: ObjectId) {
    if let Some(pair) = base.root.find_file_by_id_mut(a) {
        pair.clear_move_ref();
    }
    if let Some(pair) = base.root.find_file_by_id_mut(b) {
        pair.clear_move_ref();
    }
}

// ---------------------------------------------------------------------------
// the main ordered walk

struct SyncCtx {
    bases: BySide<AbstractPath>,
    handlers: BySide<DeletionHandler>,
    copy_permissions: bool,
    fail_safe_copy: bool,
}

pub(crate) fn synchronize_pair(
    cfg: &MainConfig,
    base: &mut BaseFolderPair,
    versioner: Option<Arc<Versioner>>,
    callback: &mut dyn ProcessCallback,
) -> Result<SyncSummary, FileError> {
    let mut summary = SyncSummary::default();

    let handlers = BySide::new(
        DeletionHandler::new(
            cfg.deletion,
            &base.base[Side::Left],
            versioner.clone(),
            callback,
        ),
        DeletionHandler::new(cfg.deletion, &base.base[Side::Right], versioner, callback),
    );
    let ctx = SyncCtx {
        bases: base.base.clone(),
        handlers,
        copy_permissions: cfg.copy_permissions,
        fail_safe_copy: cfg.fail_safe_copy,
    };

    execute_moves(base, callback, &mut summary)?;
    sync_level(&ctx, &mut base.root, "", callback, &mut summary)?;
    Ok(summary)
}

fn sync_level(
    ctx: &SyncCtx,
    container: &mut FolderContainer,
    rel: &str,
    callback: &mut dyn ProcessCallback,
    summary: &mut SyncSummary,
) -> Result<(), FileError> {
    // 1. folders to create, so every child below finds its parent
    for pair in &mut container.folders {
        match classify_folder(pair) {
            Some((ItemOp::Create, target)) => {
                execute_folder_create(ctx, pair, rel, target, callback, summary)?;
            }
            Some((ItemOp::UpdateMetadata, target)) => {
                execute_folder_metadata(ctx, pair, rel, target, callback, summary)?;
            }
            _ => {}
        }
    }

    // 2. files and symlinks
    for pair in &mut container.files {
        execute_file(ctx, pair, rel, callback, summary)?;
    }
    for pair in &mut container.symlinks {
        execute_symlink(ctx, pair, rel, callback, summary)?;
    }

    // 3. descend
    for pair in &mut container.folders {
        let name = pair.ref_name().to_owned();
        let sub_rel = join_rel(rel, &name);
        sync_level(ctx, &mut pair.children, &sub_rel, callback, summary)?;
    }

    // 4. folders to delete, after everything inside is gone
    for pair in &mut container.folders {
        if let Some((ItemOp::Delete, target)) = classify_folder(pair) {
            execute_folder_delete(ctx, pair, rel, target, callback, summary)?;
        }
    }
    Ok(())
}

fn execute_folder_create(
    ctx: &SyncCtx,
    pair: &mut FolderPair,
    rel: &str,
    target: Side,
    callback: &mut dyn ProcessCallback,
    summary: &mut SyncSummary,
) -> Result<(), FileError> {
    let source = target.opposite();
    let name = pair.short_name(source).expect("create has a source").to_owned();
    let target_path = append_rel(&ctx.bases[target], &join_rel(rel, &name));
    callback.report_status(&format!("Creating folder {}", target_path.display()));

    let created = with_retry(callback, |_| create_folder_if_missing_recursive(&target_path))?;
    match created {
        Some(()) => {
            pair.set_synced(target, FolderSide { name });
            summary.items_created += 1;
        }
        None => {
            summary.errors_ignored += 1;
            // children on the target side cannot be processed either
            pair.children.set_direction_recursive(Direction::None);
        }
    }
    callback.update_progress(1, 0);
    callback.request_ui_refresh()
}

fn execute_folder_metadata(
    ctx: &SyncCtx,
    pair: &mut FolderPair,
    rel: &str,
    target: Side,
    callback: &mut dyn ProcessCallback,
    summary: &mut SyncSummary,
) -> Result<(), FileError> {
    let source = target.opposite();
    let source_name = pair.short_name(source).expect("both sides present").to_owned();
    let target_name = pair.short_name(target).expect("both sides present").to_owned();
    if source_name == target_name {
        pair.set_synced(target, FolderSide { name: target_name });
        callback.update_progress(1, 0);
        return Ok(());
    }

    let old_path = append_rel(&ctx.bases[target], &join_rel(rel, &target_name));
    let new_path = append_rel(&ctx.bases[target], &join_rel(rel, &source_name));
    callback.report_status(&format!("Updating attributes of {}", old_path.display()));

    let renamed = with_retry(callback, |_| rename_item(&old_path, &new_path))?;
    match renamed {
        Some(()) => {
            pair.set_synced(target, FolderSide { name: source_name });
            summary.metadata_updated += 1;
        }
        None => summary.errors_ignored += 1,
    }
    callback.update_progress(1, 0);
    callback.request_ui_refresh()
}

fn execute_folder_delete(
    ctx: &SyncCtx,
    pair: &mut FolderPair,
    rel: &str,
    target: Side,
    callback: &mut dyn ProcessCallback,
    summary: &mut SyncSummary,
) -> Result<(), FileError> {
    let name = pair.short_name(target).expect("delete has a target").to_owned();
    let rel_path = join_rel(rel, &name);
    let path = append_rel(&ctx.bases[target], &rel_path);
    callback.report_status(&format!("Deleting folder {}", path.display()));

    let removed = with_retry(callback, |_| ctx.handlers[target].remove_folder(&path, &rel_path))?;
    match removed {
        Some(()) => {
            pair.remove_side(target);
            summary.items_deleted += 1;
        }
        None => summary.errors_ignored += 1,
    }
    callback.update_progress(1, 0);
    callback.request_ui_refresh()
}

fn execute_file(
    ctx: &SyncCtx,
    pair: &mut FilePair,
    rel: &str,
    callback: &mut dyn ProcessCallback,
    summary: &mut SyncSummary,
) -> Result<(), FileError> {
    let Some((op, target)) = classify_file(pair) else {
        return Ok(());
    };
    let source = target.opposite();

    match op {
        ItemOp::Create | ItemOp::Overwrite => {
            let source_name = pair.short_name(source).expect("source present").to_owned();
            let target_name = match op {
                // an overwrite keeps the target's current name
                ItemOp::Overwrite => pair.short_name(target).expect("target present").to_owned(),
                _ => source_name.clone(),
            };
            let source_path = append_rel(&ctx.bases[source], &join_rel(rel, &source_name));
            let target_path = append_rel(&ctx.bases[target], &join_rel(rel, &target_name));
            let size = pair.descriptor(source).map_or(0, |d| d.size);
            let size_i64 = i64::try_from(size).unwrap_or(i64::MAX);

            callback.report_status(&format!(
                "{} {}",
                if op == ItemOp::Create {
                    "Copying new file"
                } else {
                    "Overwriting file"
                },
                target_path.display()
            ));

            let handler = &ctx.handlers[target];
            let delete_rel = join_rel(rel, &target_name);
            let mut reported = 0i64;
            let copied = with_retry(callback, |cb| {
                let mut on_delete_target = || handler.remove_file(&target_path, &delete_rel);
                let mut progress = |bytes: u64| {
                    // raw counts cover both reading and writing; show each
                    // payload byte once
                    let delta = i64::try_from(bytes / 2).unwrap_or(0);
                    reported += delta;
                    cb.update_progress(0, delta);
                    cb.request_ui_refresh()
                };
                copy_file_transactional(
                    &source_path,
                    &target_path,
                    ctx.copy_permissions,
                    ctx.fail_safe_copy,
                    if op == ItemOp::Overwrite {
                        Some(&mut on_delete_target)
                    } else {
                        None
                    },
                    &mut progress,
                )
            })?;

            match copied {
                Some(attrs) => {
                    pair.set_synced(
                        target,
                        FileSide {
                            name: target_name,
                            attrs: FileDescriptor {
                                mtime: attrs.mtime,
                                size: attrs.file_size,
                                file_id: attrs.target_file_id,
                            },
                        },
                    );
                    if op == ItemOp::Create {
                        summary.items_created += 1;
                    } else {
                        summary.items_overwritten += 1;
                    }
                }
                None => summary.errors_ignored += 1,
            }
            // settle the pair's workload, correcting retries and aborts
            callback.update_progress(1, size_i64 - reported);
        }
        ItemOp::Delete => {
            let name = pair.short_name(target).expect("target present").to_owned();
            let rel_path = join_rel(rel, &name);
            let path = append_rel(&ctx.bases[target], &rel_path);
            callback.report_status(&format!("Deleting file {}", path.display()));

            let removed =
                with_retry(callback, |_| ctx.handlers[target].remove_file(&path, &rel_path))?;
            match removed {
                Some(()) => {
                    pair.remove_side(target);
                    summary.items_deleted += 1;
                }
                None => summary.errors_ignored += 1,
            }
            callback.update_progress(1, 0);
        }
        ItemOp::UpdateMetadata => {
            let source_side = pair.sides[source].clone().expect("both sides present");
            let target_side = pair.sides[target].clone().expect("both sides present");
            let old_path = append_rel(&ctx.bases[target], &join_rel(rel, &target_side.name));
            let new_path = append_rel(&ctx.bases[target], &join_rel(rel, &source_side.name));
            callback.report_status(&format!("Updating attributes of {}", old_path.display()));

            let updated = with_retry(callback, |_| {
                if source_side.name != target_side.name {
                    rename_item(&old_path, &new_path)?;
                }
                new_path
                    .device
                    .set_file_time(&new_path.path, source_side.attrs.mtime)
            })?;
            match updated {
                Some(()) => {
                    pair.set_synced(
                        target,
                        FileSide {
                            name: source_side.name,
                            attrs: FileDescriptor {
                                mtime: source_side.attrs.mtime,
                                size: target_side.attrs.size,
                                file_id: target_side.attrs.file_id,
                            },
                        },
                    );
                    summary.metadata_updated += 1;
                }
                None => summary.errors_ignored += 1,
            }
            callback.update_progress(1, 0);
        }
    }
    callback.request_ui_refresh()
}

fn execute_symlink(
    ctx: &SyncCtx,
    pair: &mut SymlinkPair,
    rel: &str,
    callback: &mut dyn ProcessCallback,
    summary: &mut SyncSummary,
) -> Result<(), FileError> {
    let Some((op, target)) = classify_symlink(pair) else {
        return Ok(());
    };
    let source = target.opposite();

    match op {
        ItemOp::Create | ItemOp::Overwrite | ItemOp::UpdateMetadata => {
            // symlinks are cheap: metadata updates simply re-create them
            let source_side = pair.sides[source].clone().expect("source present");
            let target_name = pair
                .short_name(target)
                .unwrap_or(source_side.name.as_str())
                .to_owned();
            let rel_target = join_rel(rel, &target_name);
            let target_path = append_rel(&ctx.bases[target], &rel_target);
            callback.report_status(&format!("Creating symbolic link {}", target_path.display()));

            let handler = &ctx.handlers[target];
            let link_target = source_side.attrs.target.clone();
            let created = with_retry(callback, |_| {
                if op != ItemOp::Create {
                    handler.remove_file(&target_path, &rel_target)?;
                }
                let final_path = append_rel(&ctx.bases[target], &join_rel(rel, &source_side.name));
                final_path
                    .device
                    .create_symlink(&final_path.path, &link_target)?;
                let _ = final_path
                    .device
                    .set_symlink_time(&final_path.path, source_side.attrs.mtime);
                Ok(())
            })?;
            match created {
                Some(()) => {
                    pair.set_synced(target, source_side);
                    if op == ItemOp::Create {
                        summary.items_created += 1;
                    } else {
                        summary.items_overwritten += 1;
                    }
                }
                None => summary.errors_ignored += 1,
            }
            callback.update_progress(1, 0);
        }
        ItemOp::Delete => {
            let name = pair.short_name(target).expect("target present").to_owned();
            let rel_path = join_rel(rel, &name);
            let path = append_rel(&ctx.bases[target], &rel_path);
            callback.report_status(&format!("Deleting symbolic link {}", path.display()));

            let removed =
                with_retry(callback, |_| ctx.handlers[target].remove_file(&path, &rel_path))?;
            match removed {
                Some(()) => {
                    pair.remove_side(target);
                    summary.items_deleted += 1;
                }
                None => summary.errors_ignored += 1,
            }
            callback.update_progress(1, 0);
        }
    }
    callback.request_ui_refresh()
}
