//! Bucketed file index
//!
//! Answers "does a file of this size (and content) already exist" in O(1)
//! average time. Entries live once in an arena; the size and (size, hash)
//! buckets hold positions into it.
//!
//! # Example
//!
//! ```rust,no_run
//! use caf_dupes::core::observer::NoopObserver;
//! use caf_dupes::index::{BucketedIndex, HashAlgorithm, HashMode};
//! use std::path::Path;
//!
//! let mode = HashMode::On(HashAlgorithm::Sha256);
//! let index = BucketedIndex::build_from_folder(Path::new("D:/Photos"), mode, &NoopObserver).unwrap();
//! index.save(Path::new("D:/Photos_index_sha256.caf")).unwrap();
//!
//! for candidate in index.lookup_candidates(Path::new("C:/Downloads/img_001.jpg")) {
//!     println!("Duplicate of: {}", candidate.path.display());
//! }
//! ```

use super::compose::{absolute_folder, folder_for_caf_path};
use super::hashing::{compute_file_hash, HashMode};
use crate::caf::{self, DecodedIndex, DirectoryPathMap, FileRecord};
use crate::core::error::{IndexError, Result};
use crate::core::observer::ScanObserver;
use log::{info, trace, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Instant, UNIX_EPOCH};
use walkdir::WalkDir;

/// Files between two progress reports during traversal
const PROGRESS_INTERVAL: usize = 200;

/// One indexed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Absolute path
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Modification time, seconds since the Unix epoch
    pub mtime: i64,
    /// Hex content hash; empty when not computed
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hash: String,
}

impl FileEntry {
    /// Build an entry from a path's current metadata, without hashing
    pub fn from_metadata(path: &Path, metadata: &fs::Metadata) -> Self {
        Self {
            path: path.to_path_buf(),
            size: metadata.len(),
            mtime: modified_secs(metadata),
            hash: String::new(),
        }
    }

    pub fn file_name(&self) -> Option<&std::ffi::OsStr> {
        self.path.file_name()
    }
}

pub(crate) fn modified_secs(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Statistics about the index
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    /// Total number of files indexed
    pub total_files: usize,
    /// Total size of all indexed files
    pub total_bytes: u64,
    /// Number of distinct file sizes
    pub size_buckets: usize,
    /// Number of distinct (size, hash) pairs
    pub hash_buckets: usize,
    /// Files skipped during traversal or load
    pub errors: usize,
    /// Time taken to build or load the index (in milliseconds)
    pub build_time_ms: u64,
}

/// Size-bucketed index over one or more directory trees
#[derive(Debug, Clone)]
pub struct BucketedIndex {
    /// Advisory; empty for indexes composed from several roots
    root: PathBuf,

    hash_mode: HashMode,

    /// All entries in the index
    entries: Vec<FileEntry>,

    /// Size -> entries with that size
    size_index: HashMap<u64, Vec<usize>>,

    /// (size, hash) -> entries, only populated when hashing
    hash_index: HashMap<(u64, String), Vec<usize>>,

    /// Directory tree of the file this index was loaded from
    directories: Option<DirectoryPathMap>,

    stats: IndexStats,
}

impl BucketedIndex {
    /// Create a new empty index
    pub fn new(root: impl Into<PathBuf>, hash_mode: HashMode) -> Self {
        Self {
            root: root.into(),
            hash_mode,
            entries: Vec::new(),
            size_index: HashMap::new(),
            hash_index: HashMap::new(),
            directories: None,
            stats: IndexStats::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hash_mode(&self) -> HashMode {
        self.hash_mode
    }

    /// Stat and (when hashing) hash a file, then insert it
    ///
    /// Returns false for anything that is not a readable regular file.
    pub fn add(&mut self, path: &Path) -> bool {
        let metadata = match fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => {
                trace!("Not a regular file: {}", path.display());
                return false;
            }
            Err(e) => {
                trace!("Failed to read metadata for {}: {}", path.display(), e);
                return false;
            }
        };

        let mut entry = FileEntry::from_metadata(path, &metadata);
        if let HashMode::On(algorithm) = self.hash_mode {
            match compute_file_hash(path, algorithm) {
                Ok(hash) => entry.hash = hash,
                Err(e) => {
                    trace!("Failed to hash {}: {}", path.display(), e);
                    return false;
                }
            }
        }

        self.insert(entry);
        true
    }

    /// Insert a prepared entry
    ///
    /// The entry lands in the hash bucket only when hashing is on and the
    /// entry carries a hash.
    pub fn insert(&mut self, entry: FileEntry) {
        let idx = self.entries.len();
        let size = entry.size;

        if self.hash_mode.is_enabled() && !entry.hash.is_empty() {
            self.hash_index
                .entry((size, entry.hash.clone()))
                .or_default()
                .push(idx);
        }
        self.size_index.entry(size).or_default().push(idx);

        self.stats.total_files += 1;
        self.stats.total_bytes += size;
        self.entries.push(entry);
    }

    /// Entries that may be duplicates of the file at `path`
    ///
    /// With hashing this is an exact content match; without it, same-size
    /// entries sharing the query's file name.
    pub fn lookup_candidates(&self, path: &Path) -> Vec<&FileEntry> {
        let size = match fs::metadata(path) {
            Ok(m) => m.len(),
            Err(e) => {
                trace!("Failed to read metadata for {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        if !self.size_index.contains_key(&size) {
            return Vec::new();
        }

        match self.hash_mode {
            HashMode::On(algorithm) => match compute_file_hash(path, algorithm) {
                Ok(hash) => self.hash_bucket(size, &hash),
                Err(e) => {
                    trace!("Failed to hash {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            HashMode::Off => {
                let name = path.file_name();
                self.size_bucket(size)
                    .filter(|e| e.file_name() == name)
                    .collect()
            }
        }
    }

    /// All entries of a given size
    pub fn size_bucket(&self, size: u64) -> impl Iterator<Item = &FileEntry> + '_ {
        self.size_index
            .get(&size)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.entries[idx])
    }

    /// Entries with a given size and content hash
    pub fn hash_bucket(&self, size: u64, hash: &str) -> Vec<&FileEntry> {
        self.hash_index
            .get(&(size, hash.to_string()))
            .map(|indices| indices.iter().map(|&idx| &self.entries[idx]).collect())
            .unwrap_or_default()
    }

    pub fn has_size(&self, size: u64) -> bool {
        self.size_index.contains_key(&size)
    }

    /// Build an index by walking `root` recursively
    ///
    /// A relative `root` is resolved first, so entry paths and the saved root
    /// are always absolute. Cancellation is checked before every file and
    /// yields [`IndexError::Cancelled`].
    pub fn build_from_folder(
        root: &Path,
        hash_mode: HashMode,
        observer: &dyn ScanObserver,
    ) -> Result<Self> {
        if !root.is_dir() {
            return Err(IndexError::NotADirectory(root.to_path_buf()));
        }
        let root = absolute_folder(root);
        let root = root.as_path();

        let start_time = Instant::now();
        let mut index = Self::new(root, hash_mode);
        let root_label = root.display().to_string();
        observer.report_progress("Indexing", &root_label);

        let mut seen = 0usize;
        for entry in WalkDir::new(root).follow_links(false) {
            if observer.is_cancelled() {
                info!("Index building cancelled after {} files", seen);
                return Err(IndexError::Cancelled);
            }

            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    trace!("Skipping unreadable entry under {}: {}", root_label, e);
                    index.stats.errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            if !index.add(entry.path()) {
                index.stats.errors += 1;
            }
            seen += 1;

            if seen % PROGRESS_INTERVAL == 0 {
                observer.report_progress("Indexing", &format!("{} files in {}", seen, root_label));
            }
        }

        index.finish_stats(start_time);
        info!(
            "Index built for {}: {} files, {} size buckets, {} errors in {}ms",
            root_label,
            index.stats.total_files,
            index.stats.size_buckets,
            index.stats.errors,
            index.stats.build_time_ms
        );

        Ok(index)
    }

    /// Comment stored in saved index files
    pub fn comment(&self) -> String {
        format!("CAF duplicate index (hash: {})", self.hash_mode)
    }

    /// Write the index to `path` in the current CAF version
    pub fn save(&self, path: &Path) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(IndexError::MissingRoot);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                IndexError::IoError(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let file = File::create(path)
            .map_err(|e| IndexError::IoError(format!("Failed to create {}: {}", path.display(), e)))?;

        let records: Vec<FileRecord<'_>> = self
            .entries
            .iter()
            .map(|e| FileRecord {
                path: &e.path,
                size: e.size,
                mtime: e.mtime,
            })
            .collect();

        caf::encode(BufWriter::new(file), &self.root, &self.comment(), &records)?;
        info!("Saved {} entries to {}", records.len(), path.display());
        Ok(())
    }

    /// Read an index file written by any supported CAF version
    pub fn load(path: &Path, hash_mode: HashMode) -> Result<Self> {
        let start_time = Instant::now();
        let file = File::open(path)
            .map_err(|e| IndexError::IoError(format!("Failed to open {}: {}", path.display(), e)))?;

        let fallback_root = folder_for_caf_path(path);
        let decoded = caf::decode(BufReader::new(file), &fallback_root)?;
        let mut index = Self::from_decoded(decoded, hash_mode);
        index.finish_stats(start_time);

        info!(
            "Loaded {} entries from {} (root {})",
            index.len(),
            path.display(),
            index.root.display()
        );
        Ok(index)
    }

    /// Populate an index from a decoded CAF tree
    ///
    /// Files without a stored size are re-stated, falling back to 0 when they
    /// no longer exist. With hashing on, files present on disk are hashed.
    pub fn from_decoded(decoded: DecodedIndex, hash_mode: HashMode) -> Self {
        let mut index = Self::new(decoded.root, hash_mode);
        index.stats.errors = decoded.skipped;

        for file in decoded.files {
            let size = match file.size {
                Some(size) => size,
                None => fs::metadata(&file.path).map(|m| m.len()).unwrap_or(0),
            };

            let mut entry = FileEntry {
                path: file.path,
                size,
                mtime: i64::from(file.mtime),
                hash: String::new(),
            };

            if let HashMode::On(algorithm) = hash_mode {
                if entry.path.is_file() {
                    match compute_file_hash(&entry.path, algorithm) {
                        Ok(hash) => entry.hash = hash,
                        Err(e) => trace!("Failed to hash {}: {}", entry.path.display(), e),
                    }
                }
            }

            index.insert(entry);
        }

        index.directories = Some(decoded.directories);
        index
    }

    /// Append every entry of `other`; nothing is de-duplicated
    pub fn merge(&mut self, other: BucketedIndex) {
        if other.hash_mode != self.hash_mode {
            warn!(
                "Merging index hashed with {} into one hashed with {}",
                other.hash_mode, self.hash_mode
            );
        }
        let errors = other.stats.errors;
        for entry in other.entries {
            self.insert(entry);
        }
        self.stats.errors += errors;
        self.stats.size_buckets = self.size_index.len();
        self.stats.hash_buckets = self.hash_index.len();
    }

    fn finish_stats(&mut self, start_time: Instant) {
        self.stats.size_buckets = self.size_index.len();
        self.stats.hash_buckets = self.hash_index.len();
        self.stats.build_time_ms = start_time.elapsed().as_millis() as u64;
    }

    /// Get all entries in the index
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Directory tree cached from the last load, if any
    pub fn directories(&self) -> Option<&DirectoryPathMap> {
        self.directories.as_ref()
    }

    /// Get statistics about the index
    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// Get the number of indexed files
    pub fn len(&self) -> usize {
        self.stats.total_files
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caf::reader::fixtures::{small_tree, stream};
    use crate::core::observer::{CallbackObserver, CancelFlag, NoopObserver};
    use crate::index::hashing::HashAlgorithm;
    use std::cell::Cell;
    use std::io::Cursor;
    use tempfile::TempDir;

    const SHA256: HashMode = HashMode::On(HashAlgorithm::Sha256);

    fn write(dir: &Path, rel: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn assert_hash_subset_of_size(index: &BucketedIndex) {
        for ((size, _), indices) in &index.hash_index {
            let bucket = index.size_index.get(size).expect("size bucket missing");
            for idx in indices {
                assert!(bucket.contains(idx));
                assert_eq!(index.entries[*idx].size, *size);
            }
        }
    }

    #[test]
    fn test_hashing_matches_content_not_name() {
        let dir = TempDir::new().unwrap();
        let content = vec![7u8; 100];
        let a = write(dir.path(), "query/a.txt", &content);
        let b = write(dir.path(), "indexed/b.txt", &content);

        let mut hashed = BucketedIndex::new(dir.path().join("indexed"), SHA256);
        assert!(hashed.add(&b));
        let found = hashed.lookup_candidates(&a);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, b);

        let mut plain = BucketedIndex::new(dir.path().join("indexed"), HashMode::Off);
        assert!(plain.add(&b));
        assert!(plain.lookup_candidates(&a).is_empty());
    }

    #[test]
    fn test_name_heuristic_without_hashing() {
        let dir = TempDir::new().unwrap();
        let indexed = write(dir.path(), "one/photo.jpg", b"aaaa");
        let query = write(dir.path(), "two/photo.jpg", b"bbbb");

        let mut index = BucketedIndex::new(dir.path(), HashMode::Off);
        index.add(&indexed);
        // same size and name, different content: still a candidate
        assert_eq!(index.lookup_candidates(&query).len(), 1);

        let mut hashed = BucketedIndex::new(dir.path(), SHA256);
        hashed.add(&indexed);
        assert!(hashed.lookup_candidates(&query).is_empty());
    }

    #[test]
    fn test_add_rejects_directories_and_missing_files() {
        let dir = TempDir::new().unwrap();
        let mut index = BucketedIndex::new(dir.path(), SHA256);
        assert!(!index.add(dir.path()));
        assert!(!index.add(&dir.path().join("missing.bin")));
        assert!(index.is_empty());
        assert!(index.lookup_candidates(&dir.path().join("missing.bin")).is_empty());
    }

    #[test]
    fn test_build_from_folder_and_invariant() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/1.bin", b"same");
        write(dir.path(), "b/2.bin", b"same");
        write(dir.path(), "c/3.bin", b"diff");
        write(dir.path(), "c/d/4.bin", b"longer content");

        let index = BucketedIndex::build_from_folder(dir.path(), SHA256, &NoopObserver).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.stats().size_buckets, 2);
        assert_eq!(index.stats().hash_buckets, 3);
        assert_eq!(index.stats().total_bytes, 4 + 4 + 4 + 14);
        assert_hash_subset_of_size(&index);
    }

    #[test]
    fn test_build_from_folder_rejects_files() {
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "x", b"x");
        let err = BucketedIndex::build_from_folder(&file, HashMode::Off, &NoopObserver).unwrap_err();
        assert!(matches!(err, IndexError::NotADirectory(_)));
    }

    #[test]
    fn test_build_from_folder_cancellation() {
        let dir = TempDir::new().unwrap();
        for i in 0..20 {
            write(dir.path(), &format!("f{}.txt", i), b"data");
        }
        let cancel = CancelFlag::new();
        cancel.cancel();
        let observer = CallbackObserver::new(cancel, |_, _| {});
        let err = BucketedIndex::build_from_folder(dir.path(), HashMode::Off, &observer).unwrap_err();
        assert!(matches!(err, IndexError::Cancelled));
    }

    #[test]
    fn test_build_reports_progress() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "only.txt", b"x");
        let calls = Cell::new(0);
        let observer = CallbackObserver::new(CancelFlag::new(), |stage, _| {
            assert_eq!(stage, "Indexing");
            calls.set(calls.get() + 1);
        });
        BucketedIndex::build_from_folder(dir.path(), HashMode::Off, &observer).unwrap();
        assert!(calls.get() >= 1);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("library");
        write(&root, "x/y/deep.bin", b"deep");
        write(&root, "top.bin", b"top file");
        write(&root, "x/mid.bin", b"");

        let built = BucketedIndex::build_from_folder(&root, SHA256, &NoopObserver).unwrap();
        let caf_path = dir.path().join("library_index_sha256.caf");
        built.save(&caf_path).unwrap();

        let loaded = BucketedIndex::load(&caf_path, SHA256).unwrap();
        assert_eq!(loaded.root(), root.canonicalize().unwrap().as_path());

        let mut expected: Vec<_> = built.entries().to_vec();
        let mut actual: Vec<_> = loaded.entries().to_vec();
        expected.sort_by(|a, b| a.path.cmp(&b.path));
        actual.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(expected, actual);
        assert_hash_subset_of_size(&loaded);
        assert!(loaded.directories().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_root_is_made_absolute() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("photos");
        write(&root, "p.jpg", b"jpeg");

        // same folder, reached from the working directory through `..`
        let cwd = std::env::current_dir().unwrap();
        let mut relative = PathBuf::new();
        for _ in 1..cwd.components().count() {
            relative.push("..");
        }
        let relative = relative.join(root.strip_prefix("/").unwrap());
        assert!(relative.is_relative());

        let index = BucketedIndex::build_from_folder(&relative, HashMode::Off, &NoopObserver).unwrap();
        let canonical = root.canonicalize().unwrap();
        assert_eq!(index.root(), canonical.as_path());
        assert!(index.entries()[0].path.is_absolute());
        assert_eq!(index.entries()[0].path, canonical.join("p.jpg"));

        let caf_path = dir.path().join("photos_index.caf");
        index.save(&caf_path).unwrap();
        let info = crate::index::read_index_info(&caf_path).unwrap();
        assert_eq!(Path::new(&info.root_path), canonical.as_path());
    }

    #[test]
    fn test_non_latin1_names_reload_lossy() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("lib");
        write(&root, "日本.txt", b"nihon");
        write(&root, "café.txt", b"latin");

        let built = BucketedIndex::build_from_folder(&root, HashMode::Off, &NoopObserver).unwrap();
        let caf_path = dir.path().join("lib_index.caf");
        built.save(&caf_path).unwrap();
        let loaded = BucketedIndex::load(&caf_path, HashMode::Off).unwrap();

        let mut names: Vec<String> = loaded
            .entries()
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["??.txt", "café.txt"]);

        let replaced = loaded
            .entries()
            .iter()
            .find(|e| e.path.ends_with("??.txt"))
            .unwrap();
        assert_eq!(replaced.size, 5);
        assert_eq!(replaced.path.parent(), Some(root.canonicalize().unwrap().as_path()));
    }

    #[test]
    fn test_composed_index_cannot_be_saved() {
        let dir = TempDir::new().unwrap();
        let index = BucketedIndex::new(PathBuf::new(), HashMode::Off);
        let err = index.save(&dir.path().join("x.caf")).unwrap_err();
        assert!(matches!(err, IndexError::MissingRoot));
    }

    #[test]
    fn test_load_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "broken_index.caf", b"not an index at all");
        let err = BucketedIndex::load(&path, HashMode::Off).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_every_version_populates_buckets() {
        for version in 1..=8u16 {
            let bytes = stream(version, "/data", &small_tree(version));
            let decoded = caf::decode(Cursor::new(bytes), Path::new("/data")).unwrap();
            let index = BucketedIndex::from_decoded(decoded, HashMode::Off);
            assert_eq!(index.len(), 2, "version {}", version);
            assert!(index.has_size(6), "version {}", version);
            if version >= 7 {
                assert!(index.has_size(5));
            }
        }
    }

    #[test]
    fn test_decode_is_idempotent() {
        let bytes = stream(8, "/data", &small_tree(8));
        let first = BucketedIndex::from_decoded(
            caf::decode(Cursor::new(bytes.clone()), Path::new("/")).unwrap(),
            HashMode::Off,
        );
        let second = BucketedIndex::from_decoded(
            caf::decode(Cursor::new(bytes), Path::new("/")).unwrap(),
            HashMode::Off,
        );
        assert_eq!(first.entries(), second.entries());
        assert_eq!(first.size_index, second.size_index);
    }

    #[test]
    fn test_legacy_missing_size_restats_existing_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "real.bin", b"twelve bytes");
        let root = dir.path().to_string_lossy().into_owned();
        let bytes = stream(5, &root, &[(0, 0, 0, "real.bin"), (0, 0, 0, "gone.bin")]);

        let decoded = caf::decode(Cursor::new(bytes), Path::new("/")).unwrap();
        let index = BucketedIndex::from_decoded(decoded, HashMode::Off);
        let sizes: HashMap<_, _> = index
            .entries()
            .iter()
            .map(|e| (e.path.file_name().unwrap().to_owned(), e.size))
            .collect();
        assert_eq!(sizes[std::ffi::OsStr::new("real.bin")], 12);
        assert_eq!(sizes[std::ffi::OsStr::new("gone.bin")], 0);
    }

    #[test]
    fn test_merge_is_additive() {
        let dir = TempDir::new().unwrap();
        let f = write(dir.path(), "f.txt", b"abc");
        let mut first = BucketedIndex::new(dir.path(), SHA256);
        first.add(&f);
        let mut second = BucketedIndex::new(dir.path(), SHA256);
        second.add(&f);

        let mut combined = BucketedIndex::new(PathBuf::new(), SHA256);
        combined.merge(first);
        combined.merge(second);
        assert_eq!(combined.len(), 2);
        assert_eq!(combined.size_bucket(3).count(), 2);
        assert_eq!(combined.hash_bucket(3, &combined.entries()[0].hash).len(), 2);
        assert_hash_subset_of_size(&combined);
    }
}
