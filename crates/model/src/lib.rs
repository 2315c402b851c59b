#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! In-memory data model of one folder comparison: the paired tree of
//! file/symlink/folder items with their per-side attributes, comparison
//! categories, and sync directions, plus the configuration types the
//! pipeline is driven by.
//!
//! # Design
//!
//! The model is deliberately symmetric: almost every operation takes a
//! [`Side`] value instead of existing twice, and [`BySide`] holds the
//! per-side halves of any state. The tree owns its children directly
//! (folders contain their [`FolderContainer`]); cross-references between
//! pairs — used by move detection — go through stable [`ObjectId`]s issued
//! by an explicit [`IdIssuer`], never through pointers.
//!
//! # Invariants
//!
//! - Within one container level, short names are unique per side.
//! - A pair has at least one non-empty side; removing the last side marks
//!   it empty and eligible for the dedicated [`FolderContainer::prune_empty`]
//!   pass, the only place where pairs are erased.
//! - `category == Equal` forces direction `None` at the setters.
//! - Object ids are issued monotonically and never reused within one
//!   comparison.

mod category;
mod config;
mod hierarchy;
mod side;

pub use crate::category::{Category, Direction};
pub use crate::config::{
    CompareVariant, DEFAULT_FILE_TIME_TOLERANCE_SECS, DEFAULT_FUTURE_TIME_GUARD_SECS,
    DirectionConfig, DirectionSet, DeletionPolicy, FilterConfig, FolderPairConfig, MainConfig,
    SoftFilterOptions, SyncVariant, SymlinkPolicy, VersioningStyle,
};
pub use crate::hierarchy::{
    BaseFolderPair, FileDescriptor, FilePair, FileSide, FolderContainer, FolderPair, FolderSide,
    IdIssuer, LinkDescriptor, LinkSide, ObjectId, PairMeta, SymlinkPair,
};
pub use crate::side::{BySide, Side};
