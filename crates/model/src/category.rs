/// Comparison outcome of one item pair.
///
/// Folder pairs are restricted to `LeftOnly`, `RightOnly`, `Equal`, and
/// `DifferentMetadata`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    LeftOnly,
    RightOnly,
    LeftNewer,
    RightNewer,
    Different,
    Equal,
    /// Cannot be categorized; the pair carries a conflict note.
    Conflict,
    /// Content agrees but metadata (mtime, case of the name) differs.
    DifferentMetadata,
}

impl Category {
    /// The category after swapping sides.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::LeftOnly => Self::RightOnly,
            Self::RightOnly => Self::LeftOnly,
            Self::LeftNewer => Self::RightNewer,
            Self::RightNewer => Self::LeftNewer,
            other => other,
        }
    }

    /// `true` for the one-sided categories.
    #[must_use]
    pub fn is_one_sided(self) -> bool {
        matches!(self, Self::LeftOnly | Self::RightOnly)
    }
}

/// Per-item sync decision; conflicts are annotated separately on the pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Right,
    #[default]
    None,
}

impl Direction {
    /// The direction after swapping sides.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::None => Self::None,
        }
    }

    /// The side this direction writes to, if any.
    #[must_use]
    pub fn target_side(self) -> Option<crate::side::Side> {
        match self {
            Self::Left => Some(crate::side::Side::Left),
            Self::Right => Some(crate::side::Side::Right),
            Self::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_mirrors_sided_categories() {
        assert_eq!(Category::LeftOnly.flipped(), Category::RightOnly);
        assert_eq!(Category::RightNewer.flipped(), Category::LeftNewer);
        assert_eq!(Category::Equal.flipped(), Category::Equal);
        assert_eq!(Category::Conflict.flipped(), Category::Conflict);
    }

    #[test]
    fn direction_flip_and_target() {
        assert_eq!(Direction::Left.flipped(), Direction::Right);
        assert_eq!(Direction::None.flipped(), Direction::None);
        assert_eq!(Direction::Right.target_side(), Some(crate::side::Side::Right));
        assert_eq!(Direction::None.target_side(), None);
    }
}
