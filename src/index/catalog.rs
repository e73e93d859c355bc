//! Header-only summaries of index files
//!
//! Reading an [`IndexInfo`] stops after directory 0's summary, so browsing a
//! folder full of large indexes stays cheap.

use super::compose::folder_for_caf_path;
use super::hashing::HashAlgorithm;
use crate::caf::{self, CAF_EXTENSION};
use chrono::{DateTime, Utc};
use log::{debug, trace};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Summary of one index file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    /// Location of the index file itself
    pub file: PathBuf,
    pub format_version: u16,
    /// Root stored in the file, or the folder named by the file for versions
    /// 0 and 1 (the same root [`BucketedIndex::load`] uses)
    ///
    /// [`BucketedIndex::load`]: super::BucketedIndex::load
    pub root_path: String,
    /// Aggregate count from directory summary 0 (0 before version 3)
    pub file_count: u64,
    /// Aggregate size from directory summary 0 (0 before version 3)
    pub total_size: u64,
    pub created: Option<DateTime<Utc>>,
    pub hash_algorithm: Option<HashAlgorithm>,
}

/// Read the summary of one index file; `None` if it is not a readable index
pub fn read_index_info(path: &Path) -> Option<IndexInfo> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            trace!("Cannot open {}: {}", path.display(), e);
            return None;
        }
    };

    let preamble = match caf::decode_summary(file) {
        Ok(p) => p,
        Err(e) => {
            debug!("Not a usable index {}: {}", path.display(), e);
            return None;
        }
    };

    let header = preamble.header;
    let hash_algorithm =
        algorithm_from_comment(&header.comment).or_else(|| algorithm_from_file_name(path));

    let root_path = if header.root_path.is_empty() {
        folder_for_caf_path(path).to_string_lossy().into_owned()
    } else {
        header.root_path
    };

    Some(IndexInfo {
        file: path.to_path_buf(),
        format_version: header.version,
        root_path,
        file_count: preamble.totals.file_count.map_or(0, |n| n.max(0) as u64),
        total_size: preamble.totals.total_size.map_or(0, |s| s.max(0.0) as u64),
        created: DateTime::<Utc>::from_timestamp(i64::from(header.created), 0),
        hash_algorithm,
    })
}

/// Algorithm named by a `hash: <algo>` marker in the comment
fn algorithm_from_comment(comment: &str) -> Option<HashAlgorithm> {
    let lower = comment.to_lowercase();
    let rest = &lower[lower.find("hash:")? + "hash:".len()..];
    let word: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    word.parse().ok()
}

/// Algorithm implied by the `_index[_algo]` file naming scheme
fn algorithm_from_file_name(path: &Path) -> Option<HashAlgorithm> {
    let stem = path.file_stem()?.to_string_lossy().to_lowercase();
    if let Some(algo) = HashAlgorithm::ALL
        .into_iter()
        .find(|algo| stem.ends_with(&format!("_{}", algo)))
    {
        return Some(algo);
    }
    if stem.ends_with("index") {
        return Some(HashAlgorithm::default());
    }
    None
}

fn is_caf_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|e| e.eq_ignore_ascii_case(CAF_EXTENSION))
            .unwrap_or(false)
}

fn caf_files_in(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect(),
        Err(e) => {
            trace!("Cannot list {}: {}", dir.display(), e);
            Vec::new()
        }
    }
}

/// Find index files in each location and one directory level below it
///
/// Results are de-duplicated and sorted.
pub fn discover_indices(locations: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();

    for location in locations {
        for path in caf_files_in(location) {
            if is_caf_file(&path) {
                found.insert(path);
            } else if path.is_dir() {
                found.extend(caf_files_in(&path).into_iter().filter(|p| is_caf_file(p)));
            }
        }
    }

    found.into_iter().collect()
}

/// Summaries of every readable index found in `locations`
pub fn scan_catalog(locations: &[PathBuf]) -> Vec<IndexInfo> {
    discover_indices(locations)
        .iter()
        .filter_map(|path| read_index_info(path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caf::reader::fixtures::{small_tree, stream};
    use crate::core::observer::NoopObserver;
    use crate::index::bucketed::BucketedIndex;
    use crate::index::compose::caf_path_for;
    use crate::index::hashing::HashMode;
    use tempfile::TempDir;

    #[test]
    fn test_info_from_saved_index() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("docs");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), b"hello").unwrap();
        fs::write(root.join("sub/b.txt"), b"world!!").unwrap();

        let mode = HashMode::On(HashAlgorithm::Blake3);
        let index = BucketedIndex::build_from_folder(&root, mode, &NoopObserver).unwrap();
        let caf_path = caf_path_for(&root, mode);
        index.save(&caf_path).unwrap();

        let info = read_index_info(&caf_path).unwrap();
        assert_eq!(info.format_version, 8);
        assert_eq!(info.root_path, root.canonicalize().unwrap().to_string_lossy());
        assert_eq!(info.file_count, 2);
        assert_eq!(info.total_size, 12);
        assert_eq!(info.hash_algorithm, Some(HashAlgorithm::Blake3));
        assert!(info.created.is_some());
    }

    #[test]
    fn test_old_versions_report_zero_counts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old_index_sha256.caf");
        fs::write(&path, stream(2, "/old", &small_tree(2))).unwrap();

        let info = read_index_info(&path).unwrap();
        assert_eq!(info.format_version, 2);
        assert_eq!(info.root_path, "/old");
        assert_eq!(info.file_count, 0);
        assert_eq!(info.total_size, 0);
        // no comment before version 4, so the file name decides
        assert_eq!(info.hash_algorithm, Some(HashAlgorithm::Sha256));
    }

    #[test]
    fn test_rootless_versions_report_loader_root() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scans_index.caf");
        fs::write(&path, stream(1, "", &small_tree(1))).unwrap();

        let info = read_index_info(&path).unwrap();
        let loaded = BucketedIndex::load(&path, HashMode::Off).unwrap();
        assert_eq!(info.format_version, 1);
        assert_eq!(info.root_path, dir.path().join("scans").to_string_lossy());
        assert_eq!(Path::new(&info.root_path), loaded.root());
    }

    #[test]
    fn test_comment_beats_file_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x_index_md5.caf");
        fs::write(&path, stream(5, "/x", &small_tree(5))).unwrap();
        let info = read_index_info(&path).unwrap();
        assert_eq!(info.hash_algorithm, Some(HashAlgorithm::Sha1));
        assert_eq!(info.file_count, 7);
    }

    #[test]
    fn test_algorithm_inference() {
        assert_eq!(algorithm_from_comment("index (hash: SHA512)"), Some(HashAlgorithm::Sha512));
        assert_eq!(algorithm_from_comment("index (hash: none)"), None);
        assert_eq!(algorithm_from_comment("no marker"), None);
        assert_eq!(
            algorithm_from_file_name(Path::new("/a/b_index.caf")),
            Some(HashAlgorithm::Md5)
        );
        assert_eq!(algorithm_from_file_name(Path::new("/a/catalog.caf")), None);
    }

    #[test]
    fn test_unreadable_files_yield_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.caf");
        fs::write(&path, b"nope").unwrap();
        assert!(read_index_info(&path).is_none());
        assert!(read_index_info(&dir.path().join("missing.caf")).is_none());
    }

    #[test]
    fn test_discover_one_level_deep() {
        let dir = TempDir::new().unwrap();
        let top = dir.path().join("top_index.caf");
        let nested = dir.path().join("sub/nested_index.CAF");
        let too_deep = dir.path().join("sub/deeper/deep_index.caf");
        let other = dir.path().join("notes.txt");
        for path in [&top, &nested, &too_deep, &other] {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"x").unwrap();
        }

        let found = discover_indices(&[dir.path().to_path_buf(), dir.path().to_path_buf()]);
        let mut expected = vec![nested, top];
        expected.sort();
        assert_eq!(found, expected);
        // the placeholder files are not valid indexes
        assert!(scan_catalog(&[dir.path().to_path_buf()]).is_empty());
    }
}
