//! One-way direction resolution: a pure lookup table from category to
//! direction.

use model::{Category, Direction, DirectionSet, FolderContainer};

pub(crate) use vfs::TEMP_FILE_ENDING;

/// Deletion direction for a one-sided leftover temp item, if any.
pub(crate) fn one_sided_temp_direction(category: Category, name: &str) -> Option<Direction> {
    if !name.ends_with(TEMP_FILE_ENDING) {
        return None;
    }
    match category {
        Category::LeftOnly => Some(Direction::Left),
        Category::RightOnly => Some(Direction::Right),
        _ => None,
    }
}

pub(crate) fn apply(set: &DirectionSet, container: &mut FolderContainer) {
    for pair in &mut container.files {
        let category = pair.category();
        if let Some(direction) = one_sided_temp_direction(category, pair.ref_name()) {
            pair.set_direction(direction);
            continue;
        }
        match category {
            Category::LeftOnly => pair.set_direction(set.ex_left_only),
            Category::RightOnly => pair.set_direction(set.ex_right_only),
            Category::LeftNewer => pair.set_direction(set.left_newer),
            Category::RightNewer => pair.set_direction(set.right_newer),
            Category::Different => pair.set_direction(set.different),
            Category::Conflict | Category::DifferentMetadata => {
                if set.conflict == Direction::None {
                    // keep the category's own explanation
                    let note = pair
                        .category_note()
                        .unwrap_or("Items differ in attributes only.")
                        .to_owned();
                    pair.set_direction_conflict(note);
                } else {
                    pair.set_direction(set.conflict);
                }
            }
            Category::Equal => pair.set_direction(Direction::None),
        }
    }

    for pair in &mut container.symlinks {
        match pair.category() {
            Category::LeftOnly => pair.set_direction(set.ex_left_only),
            Category::RightOnly => pair.set_direction(set.ex_right_only),
            Category::LeftNewer => pair.set_direction(set.left_newer),
            Category::RightNewer => pair.set_direction(set.right_newer),
            Category::Different => pair.set_direction(set.different),
            Category::Conflict | Category::DifferentMetadata => {
                if set.conflict == Direction::None {
                    let note = pair
                        .category_note()
                        .unwrap_or("Items differ in attributes only.")
                        .to_owned();
                    pair.set_direction_conflict(note);
                } else {
                    pair.set_direction(set.conflict);
                }
            }
            Category::Equal => pair.set_direction(Direction::None),
        }
    }

    for pair in &mut container.folders {
        let category = pair.category();
        if let Some(direction) = one_sided_temp_direction(category, pair.ref_name()) {
            // abandoned temp folder: delete the whole subtree on its side
            pair.set_direction_recursive(direction);
            continue;
        }
        match category {
            Category::LeftOnly => pair.set_direction(set.ex_left_only),
            Category::RightOnly => pair.set_direction(set.ex_right_only),
            Category::Equal => pair.set_direction(Direction::None),
            Category::DifferentMetadata | Category::Conflict => {
                if set.conflict == Direction::None {
                    let note = pair
                        .category_note()
                        .unwrap_or("Items differ in attributes only.")
                        .to_owned();
                    pair.set_direction_conflict(note);
                } else {
                    pair.set_direction(set.conflict);
                }
            }
            Category::LeftNewer | Category::RightNewer | Category::Different => {
                debug_assert!(false, "folder pairs never carry content categories");
            }
        }
        apply(set, &mut pair.children);
    }
}
