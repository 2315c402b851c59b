//! Include/exclude path-mask filtering.

use model::FilterConfig;

use crate::mask::{matches_mask, matches_mask_begin};

/// Outcome of filtering a folder path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FolderMatch {
    /// The folder itself passes the filter.
    pub included: bool,
    /// Some descendant path could still match an include rule; when
    /// `false` the scanner skips the whole subtree.
    pub descendants_might_match: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct MaskSets {
    file_masks: Vec<Vec<char>>,
    folder_masks: Vec<Vec<char>>,
}

impl MaskSets {
    fn matches_file(&self, path: &[char]) -> bool {
        self.file_masks.iter().any(|m| matches_mask(path, m))
    }

    fn matches_folder(&self, path: &[char]) -> bool {
        self.folder_masks.iter().any(|m| matches_mask(path, m))
    }

    fn matches_folder_begin(&self, path: &[char]) -> bool {
        self.folder_masks
            .iter()
            .any(|m| matches_mask_begin(path, m))
    }
}

/// The hard filter: an include and an exclude list of path masks,
/// evaluated against base-folder-relative paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameFilter {
    include: MaskSets,
    exclude: MaskSets,
    case_sensitive: bool,
}

impl NameFilter {
    /// Builds a filter from `;`- or newline-separated mask phrases.
    #[must_use]
    pub fn new(include_phrase: &str, exclude_phrase: &str, case_sensitive: bool) -> Self {
        let mut include = MaskSets::default();
        let mut exclude = MaskSets::default();
        for entry in split_phrase(include_phrase) {
            add_filter_entry(&entry, case_sensitive, &mut include);
        }
        for entry in split_phrase(exclude_phrase) {
            add_filter_entry(&entry, case_sensitive, &mut exclude);
        }
        Self {
            include,
            exclude,
            case_sensitive,
        }
    }

    /// Builds the filter of one folder pair from its configuration.
    #[must_use]
    pub fn from_config(config: &FilterConfig, case_sensitive: bool) -> Self {
        Self::new(&config.include, &config.exclude, case_sensitive)
    }

    /// `true` when the filter lets everything through.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.exclude.file_masks.is_empty()
            && self.exclude.folder_masks.is_empty()
            && self
                .include
                .file_masks
                .iter()
                .any(|m| m.len() == 1 && m[0] == '*')
    }

    /// Whether a file at the given relative path passes.
    #[must_use]
    pub fn passes_file(&self, rel_path: &str) -> bool {
        let path = self.fold(rel_path);
        self.include.matches_file(&path) && !self.exclude.matches_file(&path)
    }

    /// Whether a folder at the given relative path passes, plus the
    /// traversal-pruning hint for its subtree.
    #[must_use]
    pub fn passes_folder(&self, rel_path: &str) -> FolderMatch {
        let path = self.fold(rel_path);

        if self.exclude.matches_folder(&path) {
            // an excluded folder excludes everything below it
            return FolderMatch {
                included: false,
                descendants_might_match: false,
            };
        }
        if !self.include.matches_folder(&path) {
            let mut prefix = path;
            prefix.push('/');
            return FolderMatch {
                included: false,
                descendants_might_match: self.include.matches_folder_begin(&prefix),
            };
        }
        FolderMatch {
            included: true,
            descendants_might_match: true,
        }
    }

    fn fold(&self, rel_path: &str) -> Vec<char> {
        if self.case_sensitive {
            rel_path.chars().collect()
        } else {
            rel_path.chars().flat_map(char::to_lowercase).collect()
        }
    }
}

fn split_phrase(phrase: &str) -> Vec<String> {
    phrase
        .split([';', '\n'])
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Normalizes one mask entry and registers it with the file and/or folder
/// mask sets.
///
/// Handled forms: a leading separator anchors at the base folder (by
/// stripping it); `*/abc`-style prefixes additionally register the
/// stripped variant; a trailing separator makes the mask folder-only;
/// `abc/*` also registers the parent folder itself.
fn add_filter_entry(entry: &str, case_sensitive: bool, sets: &mut MaskSets) {
    let mut mask = entry.replace('\\', "/");
    if !case_sensitive {
        mask = mask.chars().flat_map(char::to_lowercase).collect();
    }

    if let Some(stripped) = mask.strip_prefix('/') {
        mask = stripped.to_owned();
    } else if mask.starts_with("*/") || mask.starts_with("?/") {
        // the wildcard may also match "nothing": register the anchored form
        add_filter_entry(&mask[1..], true, sets);
    }

    if let Some(folder_only) = mask.strip_suffix('/') {
        if !folder_only.is_empty() {
            sets.folder_masks.push(folder_only.chars().collect());
        }
        return;
    }

    if mask.ends_with("/*") || mask.ends_with("/?") {
        let full: Vec<char> = mask.chars().collect();
        sets.file_masks.push(full.clone());
        sets.folder_masks.push(full);
        let parent = &mask[..mask.rfind('/').expect("suffix implies separator")];
        if !parent.is_empty() {
            sets.folder_masks.push(parent.chars().collect());
        }
        return;
    }

    if !mask.is_empty() {
        let full: Vec<char> = mask.chars().collect();
        sets.file_masks.push(full.clone());
        sets.folder_masks.push(full);
    }
}

/// Several name filters combined by logical AND (global filter plus
/// per-pair filter).
#[derive(Clone, Debug, Default)]
pub struct PathFilter {
    layers: Vec<NameFilter>,
}

impl PathFilter {
    #[must_use]
    pub fn new(layers: Vec<NameFilter>) -> Self {
        Self { layers }
    }

    #[must_use]
    pub fn single(filter: NameFilter) -> Self {
        Self {
            layers: vec![filter],
        }
    }

    #[must_use]
    pub fn passes_file(&self, rel_path: &str) -> bool {
        self.layers.iter().all(|f| f.passes_file(rel_path))
    }

    #[must_use]
    pub fn passes_folder(&self, rel_path: &str) -> FolderMatch {
        let mut included = true;
        let mut descendants = true;
        for layer in &self.layers {
            let m = layer.passes_folder(rel_path);
            included &= m.included;
            // a layer passing the folder cannot veto its descendants
            descendants &= m.included || m.descendants_might_match;
            if !descendants {
                break;
            }
        }
        FolderMatch {
            included,
            descendants_might_match: descendants,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(include: &str, exclude: &str) -> NameFilter {
        NameFilter::new(include, exclude, true)
    }

    #[test]
    fn default_filter_includes_everything() {
        let f = filter("*", "");
        assert!(f.is_null());
        assert!(f.passes_file("any/path.txt"));
        assert!(f.passes_folder("any/dir").included);
    }

    #[test]
    fn exclusion_wins_over_inclusion() {
        let f = filter("*", "*.tmp");
        assert!(f.passes_file("keep.txt"));
        assert!(!f.passes_file("drop.tmp"));
        assert!(!f.passes_file("deep/nested/drop.tmp"));
    }

    #[test]
    fn excluded_folder_prunes_subtree() {
        let f = filter("*", "cache/");
        let m = f.passes_folder("cache");
        assert!(!m.included);
        assert!(!m.descendants_might_match);
    }

    #[test]
    fn trailing_separator_is_folder_only() {
        let f = filter("*", "build/");
        assert!(!f.passes_folder("build").included);
        // a *file* named build is unaffected
        assert!(f.passes_file("build"));
    }

    #[test]
    fn narrow_include_keeps_descendant_hint() {
        let f = filter("docs/*.md", "");
        let m = f.passes_folder("docs");
        assert!(!m.included);
        assert!(m.descendants_might_match);
        assert!(f.passes_file("docs/readme.md"));
        assert!(!f.passes_file("src/readme.rs"));

        let unrelated = f.passes_folder("src");
        assert!(!unrelated.included);
        assert!(!unrelated.descendants_might_match);
    }

    #[test]
    fn anchored_mask_strips_leading_separator() {
        let f = filter("*", "/top.txt");
        assert!(!f.passes_file("top.txt"));
        assert!(f.passes_file("sub/top.txt"));
    }

    #[test]
    fn star_slash_prefix_also_matches_at_root() {
        let f = filter("*", "*/obj");
        assert!(!f.passes_file("a/obj"));
        assert!(!f.passes_file("obj"));
    }

    #[test]
    fn folder_star_includes_parent_folder() {
        let f = filter("work/*", "");
        assert!(f.passes_folder("work").included);
        assert!(f.passes_file("work/item"));
        assert!(!f.passes_file("other"));
    }

    #[test]
    fn case_folding_on_insensitive_devices() {
        let f = NameFilter::new("*", "*.TMP", false);
        assert!(!f.passes_file("x.tmp"));
        assert!(!f.passes_file("x.Tmp"));

        let sensitive = NameFilter::new("*", "*.TMP", true);
        assert!(sensitive.passes_file("x.tmp"));
    }

    #[test]
    fn combined_layers_are_anded() {
        let combined = PathFilter::new(vec![filter("*", "*.log"), filter("data/*;data", "")]);
        assert!(combined.passes_file("data/x.txt"));
        assert!(!combined.passes_file("data/x.log"));
        assert!(!combined.passes_file("misc/x.txt"));

        let m = combined.passes_folder("data");
        assert!(m.included);
        let other = combined.passes_folder("misc");
        assert!(!other.included);
    }
}
