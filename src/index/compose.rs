//! Combining per-folder indexes into one destination index
//!
//! Every destination folder gets its own cached `<folder>_index[_algo].caf`
//! next to it. A scan loads (or rebuilds) each of them and merges the results.

use super::bucketed::BucketedIndex;
use super::hashing::HashMode;
use crate::caf::CAF_EXTENSION;
use crate::core::error::{IndexError, Result};
use crate::core::observer::ScanObserver;
use log::{info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Marker between the folder name and the optional algorithm suffix
const INDEX_MARKER: &str = "_index";

/// Absolute form of a folder given on the command line
///
/// Symlinks and `..` are resolved when the folder exists; otherwise the path
/// is only joined onto the working directory.
pub fn absolute_folder(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Drop paths nested inside other paths of the same request
///
/// Paths are made absolute first and returned that way. Order of the
/// surviving paths is preserved; exact repeats are dropped too.
pub fn filter_overlapping_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let paths: Vec<PathBuf> = paths.iter().map(|p| absolute_folder(p)).collect();
    let mut kept: Vec<PathBuf> = Vec::with_capacity(paths.len());

    for (i, path) in paths.iter().enumerate() {
        let nested = paths.iter().enumerate().any(|(j, other)| {
            if i == j {
                return false;
            }
            if path == other {
                // keep the first of two equal paths
                return j < i;
            }
            path.starts_with(other)
        });

        if nested {
            info!("Skipping {}: covered by another destination", path.display());
        } else {
            kept.push(path.clone());
        }
    }

    kept
}

/// Index file path for a folder: `<parent>/<name>_index[_algo].caf`
///
/// The suffix is omitted for the default algorithm and when hashing is off.
/// Relative folders are resolved first, so the file never lands inside the
/// folder it describes.
pub fn caf_path_for(folder: &Path, hash_mode: HashMode) -> PathBuf {
    let folder = absolute_folder(folder);
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());

    let suffix = match hash_mode.algorithm() {
        Some(algo) if !algo.is_default() => format!("_{}", algo),
        _ => String::new(),
    };

    let file_name = format!("{}{}{}.{}", name, INDEX_MARKER, suffix, CAF_EXTENSION);
    match folder.parent() {
        Some(parent) => parent.join(file_name),
        None => folder.join(file_name),
    }
}

/// Folder an index file most likely describes, derived from its name
///
/// Used as the root for old files that do not store one. Files that do not
/// follow the naming scheme map to their own directory.
pub fn folder_for_caf_path(caf_path: &Path) -> PathBuf {
    let parent = caf_path.parent().unwrap_or(Path::new("")).to_path_buf();
    let stem = match caf_path.file_stem() {
        Some(stem) => stem.to_string_lossy(),
        None => return parent,
    };

    match stem.rfind(INDEX_MARKER) {
        Some(pos) if pos > 0 => parent.join(&stem[..pos]),
        _ => parent,
    }
}

/// How cached per-folder indexes are used when composing
#[derive(Debug, Clone, Default)]
pub struct ComposeOptions {
    pub hash_mode: HashMode,
    /// Load existing index files and save freshly built ones
    pub reuse: bool,
    /// Rebuild every destination regardless of cached files
    pub recreate: bool,
    /// Rebuild only these destinations
    pub force_rebuild: HashSet<PathBuf>,
}

impl ComposeOptions {
    pub fn new(hash_mode: HashMode) -> Self {
        Self {
            hash_mode,
            reuse: true,
            ..Self::default()
        }
    }

    fn must_rebuild(&self, folder: &Path) -> bool {
        self.recreate || self.force_rebuild.iter().any(|p| absolute_folder(p) == folder)
    }
}

/// Merge several indexes into one without a root
pub fn compose<I>(indexes: I, hash_mode: HashMode) -> BucketedIndex
where
    I: IntoIterator<Item = BucketedIndex>,
{
    let mut combined = BucketedIndex::new(PathBuf::new(), hash_mode);
    for index in indexes {
        combined.merge(index);
    }
    combined
}

/// Load or build one index per destination folder and merge them
pub fn build_destination_index(
    destinations: &[PathBuf],
    options: &ComposeOptions,
    observer: &dyn ScanObserver,
) -> Result<BucketedIndex> {
    let folders = filter_overlapping_paths(destinations);
    let mut parts = Vec::with_capacity(folders.len());

    for (i, folder) in folders.iter().enumerate() {
        if observer.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        if !folder.is_dir() {
            warn!("Skipping destination {}: not a directory", folder.display());
            continue;
        }
        observer.report_progress(
            "Destination",
            &format!("{}/{}: {}", i + 1, folders.len(), folder.display()),
        );
        parts.push(index_for_folder(folder, options, observer)?);
    }

    let combined = compose(parts, options.hash_mode);
    info!(
        "Destination index ready: {} files from {} folder(s)",
        combined.len(),
        folders.len()
    );
    Ok(combined)
}

fn index_for_folder(
    folder: &Path,
    options: &ComposeOptions,
    observer: &dyn ScanObserver,
) -> Result<BucketedIndex> {
    let caf_path = caf_path_for(folder, options.hash_mode);

    if options.reuse && !options.must_rebuild(folder) && caf_path.is_file() {
        observer.report_progress("Loading index", &caf_path.display().to_string());
        match BucketedIndex::load(&caf_path, options.hash_mode) {
            Ok(index) => return Ok(index),
            Err(e) => warn!("Failed to load {}, rebuilding: {}", caf_path.display(), e),
        }
    }

    let index = BucketedIndex::build_from_folder(folder, options.hash_mode, observer)?;

    if options.reuse {
        if let Err(e) = index.save(&caf_path) {
            warn!("Failed to save {}: {}", caf_path.display(), e);
        }
    }

    Ok(index)
}
