//! Matching source files against a destination index
//!
//! Two strategies with the same contract: a match has the same size and,
//! with hashing, the same content hash; without hashing, the same file name.
//!
//! The bulk strategy groups the whole source tree by size before hashing
//! anything, hashes each source file at most once and each destination
//! candidate at most once, and never touches files whose size does not occur
//! in the destination.
//!
//! # Example
//!
//! ```rust,no_run
//! use caf_dupes::core::observer::NoopObserver;
//! use caf_dupes::duplicate::DuplicateFinder;
//! use caf_dupes::index::{BucketedIndex, HashAlgorithm, HashMode};
//! use std::path::Path;
//!
//! let mode = HashMode::On(HashAlgorithm::Md5);
//! let dest = BucketedIndex::load(Path::new("/backup/photos_index.caf"), mode).unwrap();
//! let mut finder = DuplicateFinder::new(&dest);
//! for m in finder.find(Path::new("/home/me/Pictures"), &NoopObserver).unwrap() {
//!     println!("{} -> {} copies", m.source.display(), m.destinations.len());
//! }
//! ```

use crate::core::error::{IndexError, Result};
use crate::core::observer::ScanObserver;
use crate::index::compose::absolute_folder;
use crate::index::hashing::{compute_file_hash, HashAlgorithm, HashMode};
use crate::index::{BucketedIndex, FileEntry};
use log::{info, trace};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

/// Source files between two progress reports while grouping
const GROUPING_PROGRESS_INTERVAL: usize = 200;

/// Size groups between two progress reports while matching
const MATCHING_PROGRESS_INTERVAL: usize = 50;

/// A source file and every destination entry it duplicates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateMatch {
    pub source: PathBuf,
    pub size: u64,
    /// Content hash of the source; empty when hashing is off
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source_hash: String,
    /// Destination entries in index order; a destination missing from disk
    /// carries an empty hash because it could only be matched by name
    pub destinations: Vec<FileEntry>,
}

/// Counters for one bulk scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    /// Source files stat'ed during grouping
    pub files_considered: usize,
    /// Size groups that also exist in the destination
    pub size_groups: usize,
    /// Content hashes computed (source and destination)
    pub hashes_computed: usize,
    /// Source files with at least one match
    pub matched_files: usize,
    pub elapsed_ms: u64,
}

/// Look up a single file in the index
pub fn find_duplicates_single(path: &Path, index: &BucketedIndex) -> Option<DuplicateMatch> {
    let destinations: Vec<FileEntry> = index
        .lookup_candidates(path)
        .into_iter()
        .cloned()
        .collect();
    if destinations.is_empty() {
        return None;
    }

    let size = destinations[0].size;
    let source_hash = match index.hash_mode() {
        HashMode::On(_) => destinations[0].hash.clone(),
        HashMode::Off => String::new(),
    };

    Some(DuplicateMatch {
        source: path.to_path_buf(),
        size,
        source_hash,
        destinations,
    })
}

/// Bulk matcher over one destination index
pub struct DuplicateFinder<'a> {
    index: &'a BucketedIndex,
    /// Destination path -> hash, `None` when the file cannot be read here
    dest_hashes: HashMap<PathBuf, Option<String>>,
    stats: ScanStats,
}

impl<'a> DuplicateFinder<'a> {
    pub fn new(index: &'a BucketedIndex) -> Self {
        Self {
            index,
            dest_hashes: HashMap::new(),
            stats: ScanStats::default(),
        }
    }

    /// Counters of the last (or current, after cancellation) scan
    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Find every source file under `source_root` that has a duplicate
    ///
    /// Results are ordered by source path. Cancellation is checked per file
    /// while grouping and per size group while matching.
    pub fn find(
        &mut self,
        source_root: &Path,
        observer: &dyn ScanObserver,
    ) -> Result<Vec<DuplicateMatch>> {
        if !source_root.is_dir() {
            return Err(IndexError::NotADirectory(source_root.to_path_buf()));
        }
        let source_root = absolute_folder(source_root);
        let source_root = source_root.as_path();

        let start_time = Instant::now();
        self.stats = ScanStats::default();

        let groups = self.group_by_size(source_root, observer)?;
        let mut matches = self.match_groups(groups, observer)?;
        matches.sort_by(|a, b| a.source.cmp(&b.source));

        self.stats.matched_files = matches.len();
        self.stats.elapsed_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Duplicate scan of {}: {} files, {} size groups, {} hashes, {} with duplicates in {}ms",
            source_root.display(),
            self.stats.files_considered,
            self.stats.size_groups,
            self.stats.hashes_computed,
            self.stats.matched_files,
            self.stats.elapsed_ms
        );

        Ok(matches)
    }

    fn group_by_size(
        &mut self,
        source_root: &Path,
        observer: &dyn ScanObserver,
    ) -> Result<BTreeMap<u64, Vec<PathBuf>>> {
        observer.report_progress("Grouping", &source_root.display().to_string());
        let mut groups: BTreeMap<u64, Vec<PathBuf>> = BTreeMap::new();

        for entry in WalkDir::new(source_root).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    trace!("Skipping unreadable source entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            if observer.is_cancelled() {
                info!(
                    "Duplicate scan cancelled after {} files",
                    self.stats.files_considered
                );
                return Err(IndexError::Cancelled);
            }

            self.stats.files_considered += 1;
            match fs::metadata(entry.path()) {
                Ok(m) => groups.entry(m.len()).or_default().push(entry.into_path()),
                Err(e) => trace!("Failed to read metadata for {}: {}", entry.path().display(), e),
            }

            if self.stats.files_considered % GROUPING_PROGRESS_INTERVAL == 0 {
                observer.report_progress(
                    "Grouping",
                    &format!("{} files", self.stats.files_considered),
                );
            }
        }

        Ok(groups)
    }

    fn match_groups(
        &mut self,
        groups: BTreeMap<u64, Vec<PathBuf>>,
        observer: &dyn ScanObserver,
    ) -> Result<Vec<DuplicateMatch>> {
        let total_groups = groups.len();
        let mut matches = Vec::new();

        for (i, (size, sources)) in groups.into_iter().enumerate() {
            if observer.is_cancelled() {
                info!("Duplicate scan cancelled at size group {}/{}", i, total_groups);
                return Err(IndexError::Cancelled);
            }
            if i % MATCHING_PROGRESS_INTERVAL == 0 {
                observer.report_progress("Matching", &format!("{}/{} size groups", i, total_groups));
            }
            if !self.index.has_size(size) {
                continue;
            }

            self.stats.size_groups += 1;
            let index = self.index;
            let candidates: Vec<&FileEntry> = index.size_bucket(size).collect();

            for source in sources {
                if let Some(found) = self.match_source(source, size, &candidates) {
                    matches.push(found);
                }
            }
        }

        Ok(matches)
    }

    fn match_source(
        &mut self,
        source: PathBuf,
        size: u64,
        candidates: &[&FileEntry],
    ) -> Option<DuplicateMatch> {
        let name = source.file_name().map(|n| n.to_os_string());
        let same_name = |c: &FileEntry| c.file_name() == name.as_deref();

        let (source_hash, destinations) = match self.index.hash_mode() {
            HashMode::Off => {
                let found: Vec<FileEntry> = candidates
                    .iter()
                    .filter(|c| same_name(**c))
                    .map(|c| (*c).clone())
                    .collect();
                (String::new(), found)
            }
            HashMode::On(algorithm) => {
                let source_hash = match compute_file_hash(&source, algorithm) {
                    Ok(h) => h,
                    Err(e) => {
                        trace!("Failed to hash {}: {}", source.display(), e);
                        return None;
                    }
                };
                self.stats.hashes_computed += 1;

                let mut found = Vec::new();
                for candidate in candidates {
                    match self.destination_hash(candidate, algorithm) {
                        Some(hash) if hash == source_hash => found.push(FileEntry {
                            hash,
                            ..(*candidate).clone()
                        }),
                        Some(_) => {}
                        None if same_name(*candidate) => found.push(FileEntry {
                            hash: String::new(),
                            ..(*candidate).clone()
                        }),
                        None => {}
                    }
                }
                (source_hash, found)
            }
        };

        if destinations.is_empty() {
            return None;
        }
        Some(DuplicateMatch {
            source,
            size,
            source_hash,
            destinations,
        })
    }

    /// Hash of a destination entry, computed at most once per path
    fn destination_hash(&mut self, entry: &FileEntry, algorithm: HashAlgorithm) -> Option<String> {
        if !entry.hash.is_empty() {
            return Some(entry.hash.clone());
        }
        if let Some(cached) = self.dest_hashes.get(&entry.path) {
            return cached.clone();
        }

        let hash = if entry.path.is_file() {
            match compute_file_hash(&entry.path, algorithm) {
                Ok(h) => {
                    self.stats.hashes_computed += 1;
                    Some(h)
                }
                Err(e) => {
                    trace!("Failed to hash {}: {}", entry.path.display(), e);
                    None
                }
            }
        } else {
            trace!("Destination not present here: {}", entry.path.display());
            None
        };

        self.dest_hashes.insert(entry.path.clone(), hash.clone());
        hash
    }
}
