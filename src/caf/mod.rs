//! CAF binary index format
//!
//! Reads every historical revision (0 through 8) and writes the current one.
//! Nothing in here knows about buckets or hashing; callers hand in plain
//! file records and get plain resolved files back.

pub mod layout;
pub mod reader;
pub mod tree;
pub mod wire;
pub mod writer;

pub use layout::{Layout, CURRENT_VERSION};
pub use reader::{decode, decode_preamble, decode_summary, CafHeader, DecodedIndex, Preamble, SummaryTotals};
pub use tree::{DirectoryPathMap, ResolvedFile};
pub use writer::{encode, encode_with_timestamp, FileRecord};

/// File extension of index files
pub const CAF_EXTENSION: &str = "caf";
