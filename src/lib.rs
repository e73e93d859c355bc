//! caf-dupes library
//!
//! Indexes large folder trees into CAF catalog files and finds files that
//! already exist in those trees without rescanning them.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - [`caf`] - The CAF binary index format: every reader version, the current writer
//! - [`index`] - In-memory bucketed indexes, hashing, composition, catalog and search
//! - [`duplicate`] - Single-file and bulk duplicate matching
//! - [`worker`] - Background execution with progress events and cancellation
//! - [`core`] - Configuration, error types and the progress/cancel observer
//! - [`cli`] - Command-line interface (only used by the binary)
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use caf_dupes::core::observer::NoopObserver;
//! use caf_dupes::duplicate::DuplicateFinder;
//! use caf_dupes::index::{build_destination_index, ComposeOptions, HashAlgorithm, HashMode};
//! use std::path::{Path, PathBuf};
//!
//! fn main() -> anyhow::Result<()> {
//!     let options = ComposeOptions::new(HashMode::On(HashAlgorithm::Md5));
//!     let archive = build_destination_index(
//!         &[PathBuf::from("/mnt/archive")],
//!         &options,
//!         &NoopObserver,
//!     )?;
//!
//!     let mut finder = DuplicateFinder::new(&archive);
//!     for found in finder.find(Path::new("/home/me/incoming"), &NoopObserver)? {
//!         println!("{} already archived", found.source.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - **Reusable indexes** - `<folder>_index.caf` files are loaded instead of rescanning
//! - **Legacy formats** - CAF revisions 0 through 8 are readable
//! - **Size first** - only files whose size exists in the archive are hashed
//! - **Several algorithms** - MD5, SHA-1, SHA-256, SHA-512 and BLAKE3
//! - **Cancellable** - every long operation polls a shared cancel flag

pub mod caf;
pub mod cli;
pub mod core;
pub mod duplicate;
pub mod index;
pub mod worker;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
