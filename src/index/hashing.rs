//! Content hashing for exact duplicate verification
//!
//! Hashes are computed on demand with a fixed 8 KiB read buffer and are never
//! written to index files, so changing algorithm never invalidates an index.

use crate::core::error::{IndexError, Result};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Buffer size for streaming hash computation (8KB)
const HASH_BUFFER_SIZE: usize = 8 * 1024;

/// Supported content hash algorithms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// MD5, the historical default; index files carry no suffix for it
    #[default]
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 5] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
        HashAlgorithm::Blake3,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    pub fn is_default(&self) -> bool {
        *self == HashAlgorithm::default()
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        HashAlgorithm::ALL
            .into_iter()
            .find(|algo| algo.name() == wanted)
            .ok_or_else(|| format!("unknown hash algorithm '{}'", s))
    }
}

/// Whether an index hashes file contents, and with which algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashMode {
    /// Match on size and file name only
    #[default]
    Off,
    /// Match on size and content hash
    On(HashAlgorithm),
}

impl HashMode {
    pub fn from_config(use_hash: bool, algorithm: HashAlgorithm) -> Self {
        if use_hash {
            HashMode::On(algorithm)
        } else {
            HashMode::Off
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, HashMode::On(_))
    }

    pub fn algorithm(&self) -> Option<HashAlgorithm> {
        match self {
            HashMode::Off => None,
            HashMode::On(algo) => Some(*algo),
        }
    }
}

impl fmt::Display for HashMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashMode::Off => f.write_str("none"),
            HashMode::On(algo) => write!(f, "{}", algo),
        }
    }
}

enum ContentHasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl ContentHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => ContentHasher::Md5(Md5::new()),
            HashAlgorithm::Sha1 => ContentHasher::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => ContentHasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => ContentHasher::Sha512(Sha512::new()),
            HashAlgorithm::Blake3 => ContentHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            ContentHasher::Md5(h) => h.update(data),
            ContentHasher::Sha1(h) => h.update(data),
            ContentHasher::Sha256(h) => h.update(data),
            ContentHasher::Sha512(h) => h.update(data),
            ContentHasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            ContentHasher::Md5(h) => bytes_to_hex(&h.finalize()),
            ContentHasher::Sha1(h) => bytes_to_hex(&h.finalize()),
            ContentHasher::Sha256(h) => bytes_to_hex(&h.finalize()),
            ContentHasher::Sha512(h) => bytes_to_hex(&h.finalize()),
            ContentHasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Compute the hex digest of a file using streaming reads
pub fn compute_file_hash(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| IndexError::IoError(format!("Failed to open {}: {}", path.display(), e)))?;

    let mut hasher = ContentHasher::new(algorithm);
    let mut buffer = [0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| IndexError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize_hex())
}

/// Hex digest of in-memory data
pub fn compute_data_hash(data: &[u8], algorithm: HashAlgorithm) -> String {
    let mut hasher = ContentHasher::new(algorithm);
    hasher.update(data);
    hasher.finalize_hex()
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_known_digests() {
        let data = b"Hello, World!";
        assert_eq!(
            compute_data_hash(data, HashAlgorithm::Sha256),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
        assert_eq!(
            compute_data_hash(data, HashAlgorithm::Md5),
            "65a8e27d8879283831b664bd8b7f0ad4"
        );
        assert_eq!(
            compute_data_hash(data, HashAlgorithm::Sha1),
            "0a0a9f2a6772942557ab5355d76af442f8f65e01"
        );
    }

    #[test]
    fn test_file_hash_matches_data_hash_across_buffer_boundary() {
        let data: Vec<u8> = (0..(HASH_BUFFER_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        for algo in HashAlgorithm::ALL {
            assert_eq!(
                compute_file_hash(file.path(), algo).unwrap(),
                compute_data_hash(&data, algo),
                "mismatch for {}",
                algo
            );
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = compute_file_hash(Path::new("/definitely/not/here.bin"), HashAlgorithm::Md5)
            .unwrap_err();
        assert!(matches!(err, IndexError::IoError(_)));
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("SHA256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!(" md5 ".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        assert!("crc32".parse::<HashAlgorithm>().is_err());
        assert!(HashAlgorithm::Md5.is_default());
        assert!(!HashAlgorithm::Blake3.is_default());
    }

    #[test]
    fn test_hash_mode() {
        assert_eq!(HashMode::from_config(false, HashAlgorithm::Sha1), HashMode::Off);
        let mode = HashMode::from_config(true, HashAlgorithm::Sha1);
        assert!(mode.is_enabled());
        assert_eq!(mode.algorithm(), Some(HashAlgorithm::Sha1));
        assert_eq!(mode.to_string(), "sha1");
        assert_eq!(HashMode::Off.to_string(), "none");
    }
}
