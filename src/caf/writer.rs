//! CAF encoding (always the current format version)

use super::layout::{
    Layout, ParentField, SizeField, CURRENT_MAGIC, MAGIC_MODULUS, MAX_IMPLICIT_VERSION,
};
use super::wire::WireWriter;
use crate::core::error::{FormatError, IndexError, Result};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// One file to be written to the element block
#[derive(Debug, Clone, Copy)]
pub struct FileRecord<'a> {
    pub path: &'a Path,
    pub size: u64,
    /// Seconds since the Unix epoch
    pub mtime: i64,
}

struct PlannedFile {
    parent: u32,
    name: String,
    size: u64,
    mtime: u32,
}

struct PlannedDirectory {
    id: u32,
    parent: u32,
    name: String,
    mtime: u32,
    file_count: i32,
    total_size: f64,
}

/// Directory ids and element order for one root
struct TreePlan {
    directories: Vec<PlannedDirectory>,
    files: Vec<PlannedFile>,
    total_files: i32,
    total_size: f64,
}

fn clamp_mtime(secs: i64) -> u32 {
    u32::try_from(secs.max(0)).unwrap_or(u32::MAX)
}

fn directory_mtime(path: &Path) -> u32 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| clamp_mtime(d.as_secs() as i64))
        .unwrap_or(0)
}

fn leaf_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn plan_tree(root: &Path, records: &[FileRecord<'_>]) -> TreePlan {
    // (relative parent dir, name, record)
    let mut placed: Vec<(PathBuf, String, &FileRecord<'_>)> = Vec::with_capacity(records.len());
    let mut relative_dirs: BTreeSet<PathBuf> = BTreeSet::new();

    for record in records {
        let relative = match record.path.strip_prefix(root) {
            Ok(rel) => rel,
            Err(_) => {
                warn!(
                    "Not saving {}: outside index root {}",
                    record.path.display(),
                    root.display()
                );
                continue;
            }
        };
        let Some(name) = relative.file_name() else {
            warn!("Not saving {}: no file name", record.path.display());
            continue;
        };
        let parent = relative.parent().unwrap_or(Path::new("")).to_path_buf();

        for ancestor in parent.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            relative_dirs.insert(ancestor.to_path_buf());
        }
        placed.push((parent, name.to_string_lossy().into_owned(), record));
    }

    let mut ordered: Vec<PathBuf> = relative_dirs.into_iter().collect();
    ordered.sort_by(|a, b| {
        a.components()
            .count()
            .cmp(&b.components().count())
            .then_with(|| a.cmp(b))
    });

    let mut ids: BTreeMap<PathBuf, u32> = BTreeMap::new();
    ids.insert(PathBuf::new(), 0);
    let mut directories = Vec::with_capacity(ordered.len());
    for (i, rel) in ordered.into_iter().enumerate() {
        let id = u32::try_from(i + 1).unwrap_or(u32::MAX);
        let parent_rel = rel.parent().unwrap_or(Path::new(""));
        let parent = ids.get(parent_rel).copied().unwrap_or(0);
        directories.push(PlannedDirectory {
            id,
            parent,
            name: leaf_name(&rel),
            mtime: directory_mtime(&root.join(&rel)),
            file_count: 0,
            total_size: 0.0,
        });
        ids.insert(rel, id);
    }

    placed.sort_by(|a, b| a.2.path.cmp(b.2.path));

    let mut total_files = 0i32;
    let mut total_size = 0f64;
    let mut files = Vec::with_capacity(placed.len());
    for (parent_rel, name, record) in placed {
        let parent = ids.get(&parent_rel).copied().unwrap_or(0);
        total_files = total_files.saturating_add(1);
        total_size += record.size as f64;
        if parent > 0 {
            let dir = &mut directories[(parent - 1) as usize];
            dir.file_count = dir.file_count.saturating_add(1);
            dir.total_size += record.size as f64;
        }
        files.push(PlannedFile {
            parent,
            name,
            size: record.size,
            mtime: clamp_mtime(record.mtime),
        });
    }

    TreePlan {
        directories,
        files,
        total_files,
        total_size,
    }
}

/// Encode with the current time as creation timestamp
pub fn encode<W: Write>(
    writer: W,
    root: &Path,
    comment: &str,
    records: &[FileRecord<'_>],
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    encode_with_timestamp(writer, root, comment, records, clamp_mtime(now))
}

/// Encode an index tree rooted at `root` in the current format version
///
/// Files outside `root` are skipped. Every directory between the root and a
/// file is written, so each saved file resolves on reload.
pub fn encode_with_timestamp<W: Write>(
    writer: W,
    root: &Path,
    comment: &str,
    records: &[FileRecord<'_>],
    created: u32,
) -> Result<()> {
    if root.as_os_str().is_empty() {
        return Err(IndexError::MissingRoot);
    }

    let layout = Layout::current();
    let plan = plan_tree(root, records);
    let element_count = i32::try_from(plan.directories.len() + plan.files.len())
        .map_err(|_| FormatError::Corrupt("too many elements for one index".into()))?;
    let summary_count = i32::try_from(plan.directories.len() + 1)
        .map_err(|_| FormatError::Corrupt("too many directories for one index".into()))?;

    let mut w = WireWriter::new(writer);

    w.write_u32(CURRENT_MAGIC)?;
    if CURRENT_MAGIC / MAGIC_MODULUS > MAX_IMPLICIT_VERSION {
        w.write_i16(layout.version as i16)?;
    }
    w.write_u32(created)?;
    if layout.root_path {
        w.write_string(&root.to_string_lossy())?;
    }
    let volume = leaf_name(root);
    w.write_string(&volume)?;
    w.write_string(&volume)?;
    w.write_u32(0)?;
    if layout.comment {
        w.write_string(comment)?;
    }
    if layout.free_size {
        w.write_f32(0.0)?;
    }
    if layout.archive_flag {
        w.write_i16(0)?;
    }

    // Summary 0 aggregates the whole tree
    w.write_i32(summary_count)?;
    w.write_string("")?;
    if layout.summary_totals {
        w.write_i32(plan.total_files)?;
        w.write_f64(plan.total_size)?;
    }
    for dir in &plan.directories {
        if layout.named_summaries {
            w.write_string(&dir.name)?;
        }
        if layout.summary_totals {
            w.write_i32(dir.file_count)?;
            w.write_f64(dir.total_size)?;
        }
    }

    w.write_i32(element_count)?;
    for dir in &plan.directories {
        w.write_u32(dir.mtime)?;
        write_size(&mut w, layout, -i64::from(dir.id))?;
        write_parent(&mut w, layout, dir.parent)?;
        w.write_string(&dir.name)?;
    }
    for file in &plan.files {
        w.write_u32(file.mtime)?;
        write_size(&mut w, layout, i64::try_from(file.size).unwrap_or(i64::MAX))?;
        write_parent(&mut w, layout, file.parent)?;
        w.write_string(&file.name)?;
    }
    w.flush()?;

    debug!(
        "Encoded {} directories and {} files under {}",
        plan.directories.len(),
        plan.files.len(),
        root.display()
    );
    Ok(())
}

fn write_size<W: Write>(w: &mut WireWriter<W>, layout: &Layout, size: i64) -> Result<()> {
    match layout.size_field {
        SizeField::Signed64 => w.write_i64(size)?,
        SizeField::Legacy32 => w.write_i32(i32::try_from(size).unwrap_or(0))?,
    }
    Ok(())
}

fn write_parent<W: Write>(w: &mut WireWriter<W>, layout: &Layout, parent: u32) -> Result<()> {
    match layout.parent_field {
        ParentField::U32 => w.write_u32(parent)?,
        ParentField::U16 => {
            let narrow = u16::try_from(parent)
                .map_err(|_| FormatError::Corrupt(format!("parent id {} too wide", parent)))?;
            w.write_u16(narrow)?
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::reader::{decode, decode_preamble};
    use super::*;
    use std::io::Cursor;

    fn record(path: &Path, size: u64, mtime: i64) -> FileRecord<'_> {
        FileRecord { path, size, mtime }
    }

    #[test]
    fn test_round_trip_through_decoder() {
        let root = Path::new("/library");
        let a = root.join("music/rock/a.flac");
        let b = root.join("music/b.mp3");
        let c = root.join("c.txt");
        let records = [record(&a, 100, 1_000), record(&b, 200, 2_000), record(&c, 0, 3_000)];

        let mut bytes = Vec::new();
        encode_with_timestamp(&mut bytes, root, "test (hash: none)", &records, 42).unwrap();

        let decoded = decode(Cursor::new(bytes), Path::new("/elsewhere")).unwrap();
        assert_eq!(decoded.root, root);
        assert_eq!(decoded.header.created, 42);
        assert_eq!(decoded.header.comment, "test (hash: none)");
        assert_eq!(decoded.header.volume, "library");
        assert_eq!(decoded.skipped, 0);

        let mut files: Vec<_> = decoded
            .files
            .iter()
            .map(|f| (f.path.clone(), f.size, f.mtime))
            .collect();
        files.sort();
        assert_eq!(
            files,
            vec![
                (c.clone(), Some(0), 3_000),
                (b.clone(), Some(200), 2_000),
                (a.clone(), Some(100), 1_000),
            ]
        );
        // root, music, music/rock
        assert_eq!(decoded.directories.len(), 3);
    }

    #[test]
    fn test_intermediate_directories_get_ids() {
        // No file lives directly in "deep" or "deep/er"; both still need ids
        let root = Path::new("/r");
        let f = root.join("deep/er/est/file.bin");
        let mut bytes = Vec::new();
        encode_with_timestamp(&mut bytes, root, "", &[record(&f, 9, 0)], 0).unwrap();

        let decoded = decode(Cursor::new(bytes), root).unwrap();
        assert_eq!(decoded.files.len(), 1);
        assert_eq!(decoded.files[0].path, f);
    }

    #[test]
    fn test_summary_totals_are_aggregated() {
        let root = Path::new("/r");
        let a = root.join("x/a");
        let b = root.join("b");
        let mut bytes = Vec::new();
        encode_with_timestamp(&mut bytes, root, "", &[record(&a, 10, 0), record(&b, 5, 0)], 0)
            .unwrap();

        let preamble = decode_preamble(Cursor::new(bytes)).unwrap();
        assert_eq!(preamble.totals.file_count, Some(2));
        assert_eq!(preamble.totals.total_size, Some(15.0));
        assert_eq!(preamble.totals.directories, 2);
        assert_eq!(preamble.header.version, 8);
    }

    #[test]
    fn test_files_outside_root_are_skipped() {
        let root = Path::new("/r");
        let inside = root.join("in.txt");
        let outside = PathBuf::from("/other/out.txt");
        let mut bytes = Vec::new();
        encode_with_timestamp(
            &mut bytes,
            root,
            "",
            &[record(&inside, 1, 0), record(&outside, 1, 0)],
            0,
        )
        .unwrap();

        let decoded = decode(Cursor::new(bytes), root).unwrap();
        assert_eq!(decoded.files.len(), 1);
        assert_eq!(decoded.files[0].path, inside);
    }

    #[test]
    fn test_output_is_deterministic() {
        let root = Path::new("/r");
        let a = root.join("z/a");
        let b = root.join("a/b");
        let forward = [record(&a, 1, 0), record(&b, 2, 0)];
        let backward = [record(&b, 2, 0), record(&a, 1, 0)];

        let mut first = Vec::new();
        let mut second = Vec::new();
        encode_with_timestamp(&mut first, root, "", &forward, 7).unwrap();
        encode_with_timestamp(&mut second, root, "", &backward, 7).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_root_cannot_be_saved() {
        let mut bytes = Vec::new();
        let err = encode_with_timestamp(&mut bytes, Path::new(""), "", &[], 0).unwrap_err();
        assert!(matches!(err, IndexError::MissingRoot));
    }
}
