#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Two filter layers combined by logical AND:
//!
//! - The **hard (name) filter**: include and exclude lists of path masks
//!   over the item's base-folder-relative path. Masks use `*` (zero or
//!   more characters, separators included), `?` (exactly one character),
//!   and `/`; a trailing separator restricts a mask to folders. For
//!   folders that do not match, [`NameFilter::passes_folder`] additionally
//!   reports whether any descendant path could still match, which the
//!   scanner uses to prune traversal.
//! - The **soft (size/time) filter**: keeps an item when its modification
//!   time reaches the cutoff and its size lies within bounds. An active
//!   date filter deactivates folders so empty shells do not appear.
//!
//! Filters are pure predicates over scanned items; they never produce
//! traversal-time errors.

mod mask;
mod name_filter;
mod soft;

pub use crate::name_filter::{FolderMatch, NameFilter, PathFilter};
pub use crate::soft::SoftFilter;
