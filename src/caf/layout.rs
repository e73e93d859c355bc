//! Per-version field table for the CAF format
//!
//! Every optional or variable-width field is listed here once, keyed by
//! format version. The reader, the writer and the catalog scanner all consult
//! this table instead of comparing version numbers inline.

/// Width of the per-element size field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeField {
    /// 4-byte signed integer; not a directory marker, not always meaningful
    Legacy32,
    /// 8-byte signed integer; negative values mark directories
    Signed64,
}

/// Width of the per-element parent id field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentField {
    U16,
    U32,
}

/// How directories are told apart from files in the element block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryMarker {
    /// An element is a directory when another element names its 1-based
    /// position as parent
    ParentReference,
    /// An element is a directory when its size is negative; `-size` is its id
    NegativeSize,
}

/// Field layout of one format version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub version: u16,
    /// Root path string follows the creation date
    pub root_path: bool,
    /// Free-text comment follows the serial number
    pub comment: bool,
    /// 4-byte float free-space field
    pub free_size: bool,
    /// 2-byte archive flag
    pub archive_flag: bool,
    /// Every directory summary carries a name (otherwise only entry 0 does)
    pub named_summaries: bool,
    /// Directory summaries carry a file count and a total size
    pub summary_totals: bool,
    pub size_field: SizeField,
    pub parent_field: ParentField,
    pub directory_marker: DirectoryMarker,
}

const fn layout(version: u16) -> Layout {
    Layout {
        version,
        root_path: version >= 2,
        comment: version >= 4,
        free_size: version >= 1,
        archive_flag: version >= 6,
        named_summaries: version <= 3,
        summary_totals: version >= 3,
        size_field: if version <= 6 {
            SizeField::Legacy32
        } else {
            SizeField::Signed64
        },
        parent_field: if version <= 7 {
            ParentField::U16
        } else {
            ParentField::U32
        },
        directory_marker: if version <= 6 {
            DirectoryMarker::ParentReference
        } else {
            DirectoryMarker::NegativeSize
        },
    }
}

/// Layouts of every readable version, indexed by version number
pub const LAYOUTS: [Layout; 9] = [
    layout(0),
    layout(1),
    layout(2),
    layout(3),
    layout(4),
    layout(5),
    layout(6),
    layout(7),
    layout(8),
];

/// Version written by this crate
pub const CURRENT_VERSION: u16 = 8;

/// Magic words are `version * MAGIC_MODULUS + MAGIC_BASE`
pub const MAGIC_MODULUS: u32 = 1_000_000_000;
pub const MAGIC_BASE: u32 = 500_410_407;

/// Quotients above this are followed by an explicit 16-bit version field
pub const MAX_IMPLICIT_VERSION: u32 = 2;

/// Magic word written by the current encoder
pub const CURRENT_MAGIC: u32 = 3 * MAGIC_MODULUS + MAGIC_BASE;

impl Layout {
    /// Layout for a version, or `None` when the version is unknown
    pub fn for_version(version: i32) -> Option<&'static Layout> {
        usize::try_from(version).ok().and_then(|v| LAYOUTS.get(v))
    }

    pub fn current() -> &'static Layout {
        &LAYOUTS[CURRENT_VERSION as usize]
    }

    /// Byte width of the element size field
    pub fn size_width(&self) -> usize {
        match self.size_field {
            SizeField::Legacy32 => 4,
            SizeField::Signed64 => 8,
        }
    }

    /// Byte width of the element parent id field
    pub fn parent_width(&self) -> usize {
        match self.parent_field {
            ParentField::U16 => 2,
            ParentField::U32 => 4,
        }
    }
}
