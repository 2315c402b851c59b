//! The paired tree: file/symlink/folder pairs with per-side state.

use vfs::{AbstractPath, FileId};

use crate::category::{Category, Direction};
use crate::config::{CompareVariant, FilterConfig};
use crate::side::{BySide, Side};

/// Stable per-run identifier of one pair; cross-references between pairs
/// (move detection) go through ids, not pointers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u64);

/// Monotonic id source, owned by the comparison run.
///
/// Ids are never reused within one comparison; passing the issuer
/// explicitly keeps the model free of global mutable state.
#[derive(Debug, Default)]
pub struct IdIssuer {
    next: u64,
}

impl IdIssuer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> ObjectId {
        self.next += 1;
        ObjectId(self.next)
    }
}

/// Observed attributes of a file on one side.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Seconds since the Unix epoch.
    pub mtime: i64,
    pub size: u64,
    pub file_id: FileId,
}

/// Observed attributes of a symlink on one side.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkDescriptor {
    /// Modification time of the link itself.
    pub mtime: i64,
    pub target: String,
}

/// One side of a file pair: the short name plus attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSide {
    pub name: String,
    pub attrs: FileDescriptor,
}

/// One side of a symlink pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkSide {
    pub name: String,
    pub attrs: LinkDescriptor,
}

/// One side of a folder pair; folders carry only presence and name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderSide {
    pub name: String,
}

/// State shared by all three pair kinds: id, category, direction, filter
/// activity.
#[derive(Clone, Debug)]
pub struct PairMeta {
    id: ObjectId,
    category: Category,
    cat_note: Option<String>,
    direction: Direction,
    dir_note: Option<String>,
    active: bool,
}

impl PairMeta {
    fn new(id: ObjectId, category: Category) -> Self {
        Self {
            id,
            category,
            cat_note: None,
            direction: Direction::None,
            dir_note: None,
            active: true,
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// Detail of a [`Category::Conflict`] classification.
    #[must_use]
    pub fn category_note(&self) -> Option<&str> {
        self.cat_note.as_deref()
    }

    pub fn set_category(&mut self, category: Category) {
        self.category = category;
        self.cat_note = None;
    }

    pub fn set_category_conflict(&mut self, note: impl Into<String>) {
        self.category = Category::Conflict;
        self.cat_note = Some(note.into());
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Why direction resolution left this pair in conflict.
    #[must_use]
    pub fn direction_conflict(&self) -> Option<&str> {
        self.dir_note.as_deref()
    }

    /// Sets the direction, clearing any conflict note.
    ///
    /// `Equal` pairs keep direction `None`; nothing is to be done for them.
    pub fn set_direction(&mut self, direction: Direction) {
        debug_assert!(
            self.category != Category::Equal || direction == Direction::None,
            "equal pairs must keep direction None"
        );
        self.direction = direction;
        self.dir_note = None;
    }

    /// Marks the pair unresolvable with an explanation.
    pub fn set_direction_conflict(&mut self, note: impl Into<String>) {
        self.direction = Direction::None;
        self.dir_note = Some(note.into());
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn flip(&mut self) {
        self.category = self.category.flipped();
        self.direction = self.direction.flipped();
    }
}

macro_rules! delegate_meta {
    () => {
        #[must_use]
        pub fn id(&self) -> ObjectId {
            self.meta.id()
        }

        #[must_use]
        pub fn category(&self) -> Category {
            self.meta.category()
        }

        #[must_use]
        pub fn category_note(&self) -> Option<&str> {
            self.meta.category_note()
        }

        pub fn set_category(&mut self, category: Category) {
            self.meta.set_category(category);
        }

        pub fn set_category_conflict(&mut self, note: impl Into<String>) {
            self.meta.set_category_conflict(note);
        }

        #[must_use]
        pub fn direction(&self) -> Direction {
            self.meta.direction()
        }

        #[must_use]
        pub fn direction_conflict(&self) -> Option<&str> {
            self.meta.direction_conflict()
        }

        pub fn set_direction(&mut self, direction: Direction) {
            self.meta.set_direction(direction);
        }

        pub fn set_direction_conflict(&mut self, note: impl Into<String>) {
            self.meta.set_direction_conflict(note);
        }

        #[must_use]
        pub fn is_active(&self) -> bool {
            self.meta.is_active()
        }

        pub fn set_active(&mut self, active: bool) {
            self.meta.set_active(active);
        }

        /// `true` when the given side carries no item.
        #[must_use]
        pub fn is_empty_side(&self, side: Side) -> bool {
            self.sides[side].is_none()
        }

        /// `true` when both sides are empty; the pair awaits pruning.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.sides.left.is_none() && self.sides.right.is_none()
        }

        /// The short name on the non-empty reference side (left preferred).
        ///
        /// The names may differ between sides only in character case.
        #[must_use]
        pub fn ref_name(&self) -> &str {
            self.sides
                .left
                .as_ref()
                .map(|s| s.name.as_str())
                .or_else(|| self.sides.right.as_ref().map(|s| s.name.as_str()))
                .unwrap_or("")
        }

        /// The short name on one side, if present.
        #[must_use]
        pub fn short_name(&self, side: Side) -> Option<&str> {
            self.sides[side].as_ref().map(|s| s.name.as_str())
        }
    };
}

/// A paired file.
#[derive(Clone, Debug)]
pub struct FilePair {
    meta: PairMeta,
    pub sides: BySide<Option<FileSide>>,
    /// Id of the counterpart this pair forms a move with, if any.
    move_ref: Option<ObjectId>,
}

impl FilePair {
    delegate_meta!();

    #[must_use]
    pub fn new(
        id: ObjectId,
        left: Option<FileSide>,
        right: Option<FileSide>,
        category: Category,
    ) -> Self {
        debug_assert!(left.is_some() || right.is_some());
        Self {
            meta: PairMeta::new(id, category),
            sides: BySide::new(left, right),
            move_ref: None,
        }
    }

    #[must_use]
    pub fn descriptor(&self, side: Side) -> Option<&FileDescriptor> {
        self.sides[side].as_ref().map(|s| &s.attrs)
    }

    #[must_use]
    pub fn move_ref(&self) -> Option<ObjectId> {
        self.move_ref
    }

    pub fn set_move_ref(&mut self, other: ObjectId) {
        self.move_ref = Some(other);
    }

    /// Dissolves a move link, e.g. when the rename degraded to
    /// copy+delete.
    pub fn clear_move_ref(&mut self) {
        self.move_ref = None;
    }

    /// Clears one side; the remaining side dictates the new category.
    pub fn remove_side(&mut self, side: Side) {
        self.sides[side] = None;
        if !self.is_empty() {
            self.meta.set_category(match side {
                Side::Left => Category::RightOnly,
                Side::Right => Category::LeftOnly,
            });
        }
    }

    /// Installs fresh data on one side (after a completed copy) and marks
    /// the pair in sync.
    pub fn set_synced(&mut self, side: Side, data: FileSide) {
        self.sides[side] = Some(data);
        self.meta.set_category(Category::Equal);
        self.meta.set_direction(Direction::None);
    }

    pub fn flip(&mut self) {
        self.meta.flip();
        self.sides.swap();
    }
}

/// A paired symlink.
#[derive(Clone, Debug)]
pub struct SymlinkPair {
    meta: PairMeta,
    pub sides: BySide<Option<LinkSide>>,
}

impl SymlinkPair {
    delegate_meta!();

    #[must_use]
    pub fn new(
        id: ObjectId,
        left: Option<LinkSide>,
        right: Option<LinkSide>,
        category: Category,
    ) -> Self {
        debug_assert!(left.is_some() || right.is_some());
        Self {
            meta: PairMeta::new(id, category),
            sides: BySide::new(left, right),
        }
    }

    #[must_use]
    pub fn descriptor(&self, side: Side) -> Option<&LinkDescriptor> {
        self.sides[side].as_ref().map(|s| &s.attrs)
    }

    pub fn remove_side(&mut self, side: Side) {
        self.sides[side] = None;
        if !self.is_empty() {
            self.meta.set_category(match side {
                Side::Left => Category::RightOnly,
                Side::Right => Category::LeftOnly,
            });
        }
    }

    pub fn set_synced(&mut self, side: Side, data: LinkSide) {
        self.sides[side] = Some(data);
        self.meta.set_category(Category::Equal);
        self.meta.set_direction(Direction::None);
    }

    pub fn flip(&mut self) {
        self.meta.flip();
        self.sides.swap();
    }
}

/// A paired folder owning its child hierarchy.
#[derive(Clone, Debug)]
pub struct FolderPair {
    meta: PairMeta,
    pub sides: BySide<Option<FolderSide>>,
    pub children: FolderContainer,
}

impl FolderPair {
    delegate_meta!();

    #[must_use]
    pub fn new(
        id: ObjectId,
        left: Option<FolderSide>,
        right: Option<FolderSide>,
        category: Category,
    ) -> Self {
        debug_assert!(left.is_some() || right.is_some());
        Self {
            meta: PairMeta::new(id, category),
            sides: BySide::new(left, right),
            children: FolderContainer::default(),
        }
    }

    /// Clears one side of the folder and, recursively, of every descendant.
    pub fn remove_side(&mut self, side: Side) {
        self.sides[side] = None;
        if !self.is_empty() {
            self.meta.set_category(match side {
                Side::Left => Category::RightOnly,
                Side::Right => Category::LeftOnly,
            });
        }
        self.children.remove_side(side);
    }

    /// Installs presence on one side (after folder creation) and marks the
    /// pair in sync.
    pub fn set_synced(&mut self, side: Side, data: FolderSide) {
        self.sides[side] = Some(data);
        self.meta.set_category(Category::Equal);
        self.meta.set_direction(Direction::None);
    }

    pub fn flip(&mut self) {
        self.meta.flip();
        self.sides.swap();
        self.children.flip();
    }

    /// Sets the direction on this folder and every descendant whose
    /// category is not `Equal`.
    pub fn set_direction_recursive(&mut self, direction: Direction) {
        if self.category() != Category::Equal {
            self.meta.set_direction(direction);
        }
        self.children.set_direction_recursive(direction);
    }
}

/// Unordered container of the three pair kinds at one tree level.
///
/// Iteration stays valid while pairs are *cleared* (made empty); erasure
/// happens only in [`Self::prune_empty`].
#[derive(Clone, Debug, Default)]
pub struct FolderContainer {
    pub files: Vec<FilePair>,
    pub symlinks: Vec<SymlinkPair>,
    pub folders: Vec<FolderPair>,
}

impl FolderContainer {
    pub fn add_file(
        &mut self,
        ids: &mut IdIssuer,
        left: Option<FileSide>,
        right: Option<FileSide>,
        category: Category,
    ) -> &mut FilePair {
        self.files
            .push(FilePair::new(ids.issue(), left, right, category));
        self.files.last_mut().expect("just pushed")
    }

    pub fn add_symlink(
        &mut self,
        ids: &mut IdIssuer,
        left: Option<LinkSide>,
        right: Option<LinkSide>,
        category: Category,
    ) -> &mut SymlinkPair {
        self.symlinks
            .push(SymlinkPair::new(ids.issue(), left, right, category));
        self.symlinks.last_mut().expect("just pushed")
    }

    pub fn add_folder(
        &mut self,
        ids: &mut IdIssuer,
        left: Option<FolderSide>,
        right: Option<FolderSide>,
        category: Category,
    ) -> &mut FolderPair {
        self.folders
            .push(FolderPair::new(ids.issue(), left, right, category));
        self.folders.last_mut().expect("just pushed")
    }

    /// `true` when no pairs exist at any depth.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.symlinks.is_empty() && self.folders.is_empty()
    }

    /// `true` when every pair at every depth is categorized `Equal`.
    #[must_use]
    pub fn all_equal(&self) -> bool {
        self.files.iter().all(|f| f.category() == Category::Equal)
            && self.symlinks.iter().all(|s| s.category() == Category::Equal)
            && self
                .folders
                .iter()
                .all(|d| d.category() == Category::Equal && d.children.all_equal())
    }

    fn remove_side(&mut self, side: Side) {
        for file in &mut self.files {
            file.remove_side(side);
        }
        for link in &mut self.symlinks {
            link.remove_side(side);
        }
        for folder in &mut self.folders {
            folder.remove_side(side);
        }
    }

    /// Erases all pairs whose both sides are empty, at every depth.
    ///
    /// This is the only pass invalidating positions within the container;
    /// it runs at well-defined points between pipeline stages.
    pub fn prune_empty(&mut self) {
        self.files.retain(|f| !f.is_empty());
        self.symlinks.retain(|s| !s.is_empty());
        for folder in &mut self.folders {
            folder.children.prune_empty();
        }
        self.folders.retain(|d| !d.is_empty());
    }

    pub fn flip(&mut self) {
        for file in &mut self.files {
            file.flip();
        }
        for link in &mut self.symlinks {
            link.flip();
        }
        for folder in &mut self.folders {
            folder.flip();
        }
    }

    pub fn set_direction_recursive(&mut self, direction: Direction) {
        for file in &mut self.files {
            if file.category() != Category::Equal {
                file.set_direction(direction);
            }
        }
        for link in &mut self.symlinks {
            if link.category() != Category::Equal {
                link.set_direction(direction);
            }
        }
        for folder in &mut self.folders {
            folder.set_direction_recursive(direction);
        }
    }

    /// Looks up a file pair anywhere in the subtree by its id.
    #[must_use]
    pub fn find_file_by_id(&self, id: ObjectId) -> Option<&FilePair> {
        if let Some(found) = self.files.iter().find(|f| f.id() == id) {
            return Some(found);
        }
        self.folders
            .iter()
            .find_map(|d| d.children.find_file_by_id(id))
    }

    /// Mutable variant of [`Self::find_file_by_id`].
    pub fn find_file_by_id_mut(&mut self, id: ObjectId) -> Option<&mut FilePair> {
        if let Some(pos) = self.files.iter().position(|f| f.id() == id) {
            return Some(&mut self.files[pos]);
        }
        self.folders
            .iter_mut()
            .find_map(|d| d.children.find_file_by_id_mut(id))
    }
}

/// One configured base-folder pair with its comparison tree.
#[derive(Debug)]
pub struct BaseFolderPair {
    pub base: BySide<AbstractPath>,
    /// Whether the base folder existed when scanning started.
    pub dir_exists: BySide<bool>,
    pub root: FolderContainer,
    pub compare_variant: CompareVariant,
    pub file_time_tolerance_secs: i64,
    /// Filter snapshot of this pair, persisted into the database.
    pub filter: FilterConfig,
}

impl BaseFolderPair {
    #[must_use]
    pub fn new(
        base: BySide<AbstractPath>,
        compare_variant: CompareVariant,
        file_time_tolerance_secs: i64,
        filter: FilterConfig,
    ) -> Self {
        Self {
            base,
            dir_exists: BySide::new(true, true),
            root: FolderContainer::default(),
            compare_variant,
            file_time_tolerance_secs,
            filter,
        }
    }

    /// Swaps left and right across the entire tree.
    pub fn flip(&mut self) {
        self.base.swap();
        self.dir_exists.swap();
        self.root.flip();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_side(name: &str, mtime: i64, size: u64) -> Option<FileSide> {
        Some(FileSide {
            name: name.to_owned(),
            attrs: FileDescriptor {
                mtime,
                size,
                file_id: FileId::default(),
            },
        })
    }

    #[test]
    fn ids_are_monotonic() {
        let mut ids = IdIssuer::new();
        let a = ids.issue();
        let b = ids.issue();
        assert!(a < b);
    }

    #[test]
    fn empty_iff_both_sides_empty() {
        let mut ids = IdIssuer::new();
        let mut pair = FilePair::new(ids.issue(), file_side("a", 0, 1), None, Category::LeftOnly);
        assert!(!pair.is_empty());
        assert!(pair.is_empty_side(Side::Right));

        pair.remove_side(Side::Left);
        assert!(pair.is_empty());
    }

    #[test]
    fn remove_side_recategorizes() {
        let mut ids = IdIssuer::new();
        let mut pair = FilePair::new(
            ids.issue(),
            file_side("a", 0, 1),
            file_side("a", 5, 1),
            Category::RightNewer,
        );
        pair.remove_side(Side::Right);
        assert_eq!(pair.category(), Category::LeftOnly);
    }

    #[test]
    fn folder_remove_side_clears_descendants() {
        let mut ids = IdIssuer::new();
        let mut folder = FolderPair::new(
            ids.issue(),
            Some(FolderSide { name: "d".into() }),
            Some(FolderSide { name: "d".into() }),
            Category::Equal,
        );
        folder
            .children
            .add_file(&mut ids, file_side("x", 0, 1), file_side("x", 0, 1), Category::Equal);
        folder.remove_side(Side::Left);

        assert_eq!(folder.category(), Category::RightOnly);
        assert!(folder.children.files[0].is_empty_side(Side::Left));
        assert_eq!(folder.children.files[0].category(), Category::RightOnly);
    }

    #[test]
    fn prune_erases_only_fully_empty_pairs() {
        let mut ids = IdIssuer::new();
        let mut container = FolderContainer::default();
        container.add_file(&mut ids, file_side("keep", 0, 1), None, Category::LeftOnly);
        let gone = container.add_file(&mut ids, file_side("gone", 0, 1), None, Category::LeftOnly);
        gone.remove_side(Side::Left);

        container.prune_empty();
        assert_eq!(container.files.len(), 1);
        assert_eq!(container.files[0].ref_name(), "keep");
    }

    #[test]
    fn flip_swaps_categories_and_sides() {
        let mut ids = IdIssuer::new();
        let mut container = FolderContainer::default();
        container.add_file(&mut ids, file_side("a", 10, 1), file_side("a", 0, 1), Category::LeftNewer);
        container.flip();

        let pair = &container.files[0];
        assert_eq!(pair.category(), Category::RightNewer);
        assert_eq!(pair.descriptor(Side::Right).unwrap().mtime, 10);
    }

    #[test]
    fn direction_setter_rejects_equal_pairs() {
        let mut ids = IdIssuer::new();
        let mut pair = FilePair::new(
            ids.issue(),
            file_side("a", 0, 1),
            file_side("a", 0, 1),
            Category::Equal,
        );
        pair.set_direction(Direction::None); // allowed
        assert_eq!(pair.direction(), Direction::None);
    }

    #[test]
    fn set_direction_recursive_skips_equal() {
        let mut ids = IdIssuer::new();
        let mut container = FolderContainer::default();
        container.add_file(&mut ids, file_side("eq", 0, 1), file_side("eq", 0, 1), Category::Equal);
        container.add_file(&mut ids, file_side("new", 0, 1), None, Category::LeftOnly);
        container.set_direction_recursive(Direction::Right);

        assert_eq!(container.files[0].direction(), Direction::None);
        assert_eq!(container.files[1].direction(), Direction::Right);
    }

    #[test]
    fn find_by_id_descends_into_folders() {
        let mut ids = IdIssuer::new();
        let mut container = FolderContainer::default();
        let folder = container.add_folder(
            &mut ids,
            Some(FolderSide { name: "d".into() }),
            None,
            Category::LeftOnly,
        );
        let inner =
            folder
                .children
                .add_file(&mut ids, file_side("x", 0, 1), None, Category::LeftOnly);
        let id = inner.id();

        assert_eq!(container.find_file_by_id(id).unwrap().ref_name(), "x");
        assert!(container.find_file_by_id(ObjectId(9999)).is_none());
    }
}
