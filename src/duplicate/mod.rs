//! Duplicate detection module
//!
//! Finds source files that already exist in a destination index, either one
//! file at a time or for a whole source tree at once.
//!
//! # Submodules
//!
//! - `matcher` - single-file lookup and the size-first bulk scan

pub mod matcher;

pub use matcher::{find_duplicates_single, DuplicateFinder, DuplicateMatch, ScanStats};
