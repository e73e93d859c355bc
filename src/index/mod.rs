//! In-memory file indexes
//!
//! - `bucketed` - size and (size, hash) buckets, traversal, save/load
//! - `hashing` - content hash algorithms
//! - `compose` - per-folder index files merged into one destination index
//! - `catalog` - header-only discovery of index files
//! - `search` - name/size/date queries over an index

pub mod bucketed;
pub mod catalog;
pub mod compose;
pub mod hashing;
pub mod search;

pub use bucketed::{BucketedIndex, FileEntry, IndexStats};
pub use catalog::{discover_indices, read_index_info, scan_catalog, IndexInfo};
pub use compose::{
    absolute_folder, build_destination_index, caf_path_for, compose, filter_overlapping_paths,
    ComposeOptions,
};
pub use hashing::{compute_file_hash, HashAlgorithm, HashMode};
pub use search::{parse_date, parse_size, search, SearchCriteria};
