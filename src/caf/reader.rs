//! CAF decoding
//!
//! [`read_preamble`] parses the header and the directory summary block and is
//! shared by the full decoder and the header-only catalog scan, so both skip
//! exactly the same version-dependent fields. The catalog scan stops after
//! directory 0; the decoder walks every summary to reach the elements.

use super::layout::{Layout, ParentField, SizeField, MAGIC_BASE, MAGIC_MODULUS, MAX_IMPLICIT_VERSION};
use super::tree::{classify, resolve_directories, resolve_files, DirectoryPathMap, RawElement, ResolvedFile};
use super::wire::WireReader;
use crate::core::error::{FormatError, Result};
use log::debug;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

/// Upper bound for pre-allocating element vectors from an untrusted count
const MAX_PREALLOCATED_ELEMENTS: usize = 1 << 16;

/// Header fields of a CAF file
#[derive(Debug, Clone, PartialEq)]
pub struct CafHeader {
    pub version: u16,
    /// Seconds since the Unix epoch
    pub created: u32,
    /// Empty for versions without a stored root path
    pub root_path: String,
    pub volume: String,
    pub alias: String,
    pub serial: u32,
    pub comment: String,
    pub free_size: f32,
    pub archive: i16,
}

/// Aggregate numbers from directory summary 0
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SummaryTotals {
    pub directories: usize,
    /// `None` for versions whose summaries carry no totals
    pub file_count: Option<i32>,
    pub total_size: Option<f64>,
}

/// Header plus summary block, everything before the element array
#[derive(Debug, Clone, PartialEq)]
pub struct Preamble {
    pub header: CafHeader,
    pub totals: SummaryTotals,
    pub layout: &'static Layout,
}

/// Decoded file tree, not yet bucketed
#[derive(Debug, Clone)]
pub struct DecodedIndex {
    pub header: CafHeader,
    pub root: PathBuf,
    pub directories: DirectoryPathMap,
    pub files: Vec<ResolvedFile>,
    /// Elements dropped because they could not be resolved
    pub skipped: usize,
}

/// Read the magic word and determine the format layout
fn read_layout<R: BufRead>(r: &mut WireReader<R>) -> Result<&'static Layout> {
    let magic = r.read_u32()?;
    if magic == 0 || magic % MAGIC_MODULUS != MAGIC_BASE {
        return Err(FormatError::BadMagic(magic).into());
    }

    let quotient = magic / MAGIC_MODULUS;
    let version = if quotient <= MAX_IMPLICIT_VERSION {
        quotient as i32
    } else {
        i32::from(r.read_i16()?)
    };

    Layout::for_version(version).ok_or_else(|| FormatError::UnsupportedVersion(version).into())
}

/// How much of the directory summary block to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryScan {
    /// Every entry, leaving the reader at the element block
    All,
    /// Entry 0 only; the rest of the stream is left unread
    FirstOnly,
}

/// Parse everything up to the element block
pub fn read_preamble<R: BufRead>(r: &mut WireReader<R>) -> Result<Preamble> {
    read_preamble_with(r, SummaryScan::All)
}

/// Parse the header and as much of the summary block as `scan` asks for
pub fn read_preamble_with<R: BufRead>(r: &mut WireReader<R>, scan: SummaryScan) -> Result<Preamble> {
    let layout = read_layout(r)?;

    let created = r.read_u32()?;
    let root_path = if layout.root_path {
        r.read_string()?
    } else {
        String::new()
    };
    let volume = r.read_string()?;
    let alias = r.read_string()?;
    let serial = r.read_u32()?;
    let comment = if layout.comment {
        r.read_string()?
    } else {
        String::new()
    };
    let free_size = if layout.free_size { r.read_f32()? } else { 0.0 };
    let archive = if layout.archive_flag { r.read_i16()? } else { 0 };

    let header = CafHeader {
        version: layout.version,
        created,
        root_path,
        volume,
        alias,
        serial,
        comment,
        free_size,
        archive,
    };

    let totals = read_summaries(r, layout, scan)?;

    Ok(Preamble {
        header,
        totals,
        layout,
    })
}

/// Walk the directory summary block, keeping only entry 0's totals
fn read_summaries<R: BufRead>(
    r: &mut WireReader<R>,
    layout: &Layout,
    scan: SummaryScan,
) -> Result<SummaryTotals> {
    let count = r.read_count("directory")?;
    let mut totals = SummaryTotals {
        directories: count,
        ..SummaryTotals::default()
    };

    let to_read = match scan {
        SummaryScan::All => count,
        SummaryScan::FirstOnly => count.min(1),
    };
    for i in 0..to_read {
        if i == 0 || layout.named_summaries {
            r.skip_string()?;
        }
        if layout.summary_totals {
            let file_count = r.read_i32()?;
            let total_size = r.read_f64()?;
            if i == 0 {
                totals.file_count = Some(file_count);
                totals.total_size = Some(total_size);
            }
        }
    }

    Ok(totals)
}

fn read_elements<R: BufRead>(r: &mut WireReader<R>, layout: &Layout) -> Result<Vec<RawElement>> {
    let count = r.read_count("element")?;
    let mut elements = Vec::with_capacity(count.min(MAX_PREALLOCATED_ELEMENTS));

    for _ in 0..count {
        let mtime = r.read_u32()?;
        let size = match layout.size_field {
            SizeField::Legacy32 => i64::from(r.read_i32()?),
            SizeField::Signed64 => r.read_i64()?,
        };
        let parent = match layout.parent_field {
            ParentField::U16 => u32::from(r.read_u16()?),
            ParentField::U32 => r.read_u32()?,
        };
        let name = r.read_string()?;
        elements.push(RawElement {
            mtime,
            size,
            parent,
            name,
        });
    }

    Ok(elements)
}

/// Decode a complete CAF stream
///
/// `fallback_root` is used when the file stores no root path (versions 0 and 1)
/// or stores an empty one.
pub fn decode<R: Read>(reader: R, fallback_root: &Path) -> Result<DecodedIndex> {
    let mut r = WireReader::new(BufReader::new(reader));
    let preamble = read_preamble(&mut r)?;
    let raw = read_elements(&mut r, preamble.layout)?;

    let root = if preamble.header.root_path.is_empty() {
        fallback_root.to_path_buf()
    } else {
        PathBuf::from(&preamble.header.root_path)
    };

    let element_count = raw.len();
    let elements = classify(raw, preamble.layout);
    let directories = resolve_directories(&root, &elements);
    let (files, skipped) = resolve_files(elements, &directories);

    debug!(
        "Decoded CAF v{}: {} elements, {} directories, {} files, {} skipped",
        preamble.header.version,
        element_count,
        directories.len(),
        files.len(),
        skipped
    );

    Ok(DecodedIndex {
        header: preamble.header,
        root,
        directories,
        files,
        skipped,
    })
}

/// Parse only the header and summary block of a CAF stream
pub fn decode_preamble<R: Read>(reader: R) -> Result<Preamble> {
    let mut r = WireReader::new(BufReader::new(reader));
    read_preamble(&mut r)
}

/// Header plus directory 0's totals, without touching the rest of the file
pub fn decode_summary<R: Read>(reader: R) -> Result<Preamble> {
    let mut r = WireReader::new(BufReader::new(reader));
    read_preamble_with(&mut r, SummaryScan::FirstOnly)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Hand-assembled streams in the field layout of each format version

    use super::super::layout::{Layout, ParentField, SizeField, MAGIC_BASE, MAGIC_MODULUS};
    use super::super::wire::latin1_encode;

    /// (mtime, size, parent, name)
    pub type Record<'a> = (u32, i64, u32, &'a str);

    fn string(out: &mut Vec<u8>, s: &str) {
        out.extend(latin1_encode(s));
        out.push(0);
    }

    /// Build a minimal stream for `version` containing `records`
    pub fn stream(version: u16, root: &str, records: &[Record<'_>]) -> Vec<u8> {
        let layout = Layout::for_version(i32::from(version)).unwrap();
        let mut out = Vec::new();

        let quotient = if version <= 2 { u32::from(version) } else { 3 };
        out.extend((quotient * MAGIC_MODULUS + MAGIC_BASE).to_le_bytes());
        if quotient > 2 {
            out.extend((version as i16).to_le_bytes());
        }
        out.extend(1_600_000_000u32.to_le_bytes());
        if layout.root_path {
            string(&mut out, root);
        }
        string(&mut out, "VOLUME");
        string(&mut out, "alias");
        out.extend(0xABCDu32.to_le_bytes());
        if layout.comment {
            string(&mut out, "legacy catalog (hash: sha1)");
        }
        if layout.free_size {
            out.extend(123.5f32.to_le_bytes());
        }
        if layout.archive_flag {
            out.extend(0i16.to_le_bytes());
        }

        // two summaries: root and one directory
        out.extend(2i32.to_le_bytes());
        for i in 0..2 {
            if i == 0 || layout.named_summaries {
                string(&mut out, if i == 0 { "" } else { "dir" });
            }
            if layout.summary_totals {
                out.extend(7i32.to_le_bytes());
                out.extend(4096f64.to_le_bytes());
            }
        }

        out.extend((records.len() as i32).to_le_bytes());
        for (mtime, size, parent, name) in records {
            out.extend(mtime.to_le_bytes());
            match layout.size_field {
                SizeField::Legacy32 => out.extend((*size as i32).to_le_bytes()),
                SizeField::Signed64 => out.extend(size.to_le_bytes()),
            }
            match layout.parent_field {
                ParentField::U16 => out.extend((*parent as u16).to_le_bytes()),
                ParentField::U32 => out.extend(parent.to_le_bytes()),
            }
            string(&mut out, name);
        }
        out
    }

    /// Records describing `sub/inner.txt` and `top.txt` in the given convention
    pub fn small_tree(version: u16) -> Vec<Record<'static>> {
        if version <= 6 {
            vec![(10, 0, 0, "sub"), (11, 5, 1, "inner.txt"), (12, 6, 0, "top.txt")]
        } else {
            vec![(10, -1, 0, "sub"), (11, 5, 1, "inner.txt"), (12, 6, 0, "top.txt")]
        }
    }
}
