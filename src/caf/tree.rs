//! Directory tree reconstruction
//!
//! CAF files store directories and files in one flat array linked by parent
//! ids. Elements are classified once into [`Element`] according to the
//! version's [`DirectoryMarker`], then directory paths are resolved by a
//! fixed-point pass (parents may appear after their children).

use super::layout::{DirectoryMarker, Layout, SizeField};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// One element record as stored on disk
#[derive(Debug, Clone, PartialEq)]
pub struct RawElement {
    pub mtime: u32,
    /// File size, or `-id` for directories in versions that mark them
    pub size: i64,
    pub parent: u32,
    pub name: String,
}

/// An element after the version-specific directory convention is applied
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Directory {
        id: u32,
        parent: u32,
        name: String,
    },
    File {
        parent: u32,
        name: String,
        /// `None` when the stored size carries no usable information
        size: Option<u64>,
        mtime: u32,
    },
}

/// Classify raw records into directories and files
pub fn classify(raw: Vec<RawElement>, layout: &Layout) -> Vec<Element> {
    match layout.directory_marker {
        DirectoryMarker::NegativeSize => raw.into_iter().filter_map(classify_marked).collect(),
        DirectoryMarker::ParentReference => {
            let referenced: HashSet<u32> = raw.iter().map(|e| e.parent).collect();
            raw.into_iter()
                .enumerate()
                .map(|(i, e)| {
                    let position = u32::try_from(i + 1).unwrap_or(u32::MAX);
                    if referenced.contains(&position) {
                        Element::Directory {
                            id: position,
                            parent: e.parent,
                            name: e.name,
                        }
                    } else {
                        Element::File {
                            parent: e.parent,
                            name: e.name,
                            size: legacy_size(e.size, layout),
                            mtime: e.mtime,
                        }
                    }
                })
                .collect()
        }
    }
}

fn classify_marked(e: RawElement) -> Option<Element> {
    if e.size >= 0 {
        return Some(Element::File {
            parent: e.parent,
            name: e.name,
            size: Some(e.size as u64),
            mtime: e.mtime,
        });
    }

    match u32::try_from(e.size.unsigned_abs()) {
        Ok(id) => Some(Element::Directory {
            id,
            parent: e.parent,
            name: e.name,
        }),
        Err(_) => {
            warn!("Skipping directory '{}' with out-of-range id {}", e.name, e.size);
            None
        }
    }
}

fn legacy_size(size: i64, layout: &Layout) -> Option<u64> {
    match layout.size_field {
        SizeField::Legacy32 if size > 0 => Some(size as u64),
        SizeField::Legacy32 => None,
        SizeField::Signed64 => u64::try_from(size).ok(),
    }
}

/// Resolved absolute path of every directory id; id 0 is the index root
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryPathMap {
    paths: HashMap<u32, PathBuf>,
}

impl DirectoryPathMap {
    pub fn with_root(root: &Path) -> Self {
        let mut paths = HashMap::new();
        paths.insert(0, root.to_path_buf());
        Self { paths }
    }

    pub fn get(&self, id: u32) -> Option<&Path> {
        self.paths.get(&id).map(PathBuf::as_path)
    }

    pub fn root(&self) -> Option<&Path> {
        self.get(0)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Directory paths sorted by id
    pub fn sorted(&self) -> Vec<(u32, &Path)> {
        let mut dirs: Vec<_> = self.paths.iter().map(|(id, p)| (*id, p.as_path())).collect();
        dirs.sort_by_key(|(id, _)| *id);
        dirs
    }
}

/// Resolve every directory element whose ancestry reaches the root
pub fn resolve_directories(root: &Path, elements: &[Element]) -> DirectoryPathMap {
    let mut map = DirectoryPathMap::with_root(root);
    let mut pending: Vec<(u32, u32, &str)> = elements
        .iter()
        .filter_map(|e| match e {
            Element::Directory { id, parent, name } => Some((*id, *parent, name.as_str())),
            Element::File { .. } => None,
        })
        .collect();

    loop {
        let before = pending.len();
        pending.retain(|&(id, parent, name)| {
            if map.paths.contains_key(&id) {
                debug!("Ignoring repeated directory id {} ('{}')", id, name);
                return false;
            }
            match map.paths.get(&parent).map(|p| p.join(name)) {
                Some(path) => {
                    map.paths.insert(id, path);
                    false
                }
                None => true,
            }
        });
        if pending.is_empty() || pending.len() == before {
            break;
        }
    }

    for (id, parent, name) in &pending {
        warn!(
            "Skipping directory '{}' (id {}): parent {} never resolved",
            name, id, parent
        );
    }

    map
}

/// A file element with its absolute path resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFile {
    pub path: PathBuf,
    pub size: Option<u64>,
    pub mtime: u32,
}

/// Resolve file elements against the directory map, skipping unresolvable ones
///
/// Returns the resolved files and the number of skipped elements.
pub fn resolve_files(elements: Vec<Element>, dirs: &DirectoryPathMap) -> (Vec<ResolvedFile>, usize) {
    let mut files = Vec::new();
    let mut skipped = 0;

    for element in elements {
        let Element::File {
            parent,
            name,
            size,
            mtime,
        } = element
        else {
            continue;
        };

        if name.is_empty() {
            debug!("Skipping file element with empty name under directory {}", parent);
            skipped += 1;
            continue;
        }

        match dirs.get(parent) {
            Some(dir) => files.push(ResolvedFile {
                path: dir.join(&name),
                size,
                mtime,
            }),
            None => {
                warn!("Skipping file '{}': parent directory {} not found", name, parent);
                skipped += 1;
            }
        }
    }

    (files, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(mtime: u32, size: i64, parent: u32, name: &str) -> RawElement {
        RawElement {
            mtime,
            size,
            parent,
            name: name.to_string(),
        }
    }

    fn paths(files: &[ResolvedFile]) -> Vec<PathBuf> {
        let mut out: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
        out.sort();
        out
    }

    #[test]
    fn test_negative_size_marks_directories() {
        let layout = Layout::for_version(8).unwrap();
        let elements = classify(
            vec![raw(1, -1, 0, "photos"), raw(2, 10, 1, "a.jpg"), raw(3, 0, 0, "empty.txt")],
            layout,
        );
        assert_eq!(
            elements[0],
            Element::Directory {
                id: 1,
                parent: 0,
                name: "photos".into()
            }
        );
        assert!(matches!(elements[1], Element::File { size: Some(10), .. }));
        assert!(matches!(elements[2], Element::File { size: Some(0), .. }));
    }

    #[test]
    fn test_parent_reference_marks_directories() {
        let layout = Layout::for_version(5).unwrap();
        // position 1 is referenced by position 2, so it is a directory
        let elements = classify(
            vec![raw(1, 0, 0, "docs"), raw(2, 42, 1, "readme.txt"), raw(3, -7, 0, "big.iso")],
            layout,
        );
        assert!(matches!(elements[0], Element::Directory { id: 1, .. }));
        assert!(matches!(elements[1], Element::File { size: Some(42), .. }));
        // legacy negative sizes are not markers and carry no usable size
        assert!(matches!(elements[2], Element::File { size: None, .. }));
    }

    #[test]
    fn test_children_before_parents_resolve() {
        let layout = Layout::for_version(8).unwrap();
        let elements = classify(
            vec![
                raw(0, 5, 2, "deep.txt"),
                raw(0, -2, 1, "inner"),
                raw(0, -1, 0, "outer"),
            ],
            layout,
        );
        let dirs = resolve_directories(Path::new("/root"), &elements);
        assert_eq!(dirs.get(2), Some(Path::new("/root/outer/inner")));
        assert_eq!(dirs.len(), 3);

        let (files, skipped) = resolve_files(elements, &dirs);
        assert_eq!(skipped, 0);
        assert_eq!(paths(&files), vec![PathBuf::from("/root/outer/inner/deep.txt")]);
    }

    #[test]
    fn test_dangling_and_empty_names_are_skipped() {
        let layout = Layout::for_version(8).unwrap();
        let elements = classify(
            vec![
                raw(0, -1, 0, "ok"),
                raw(0, 3, 1, "kept.txt"),
                raw(0, 3, 99, "orphan.txt"),
                raw(0, 3, 1, ""),
                raw(0, -5, 77, "lost_dir"),
                raw(0, 3, 5, "in_lost_dir.txt"),
            ],
            layout,
        );
        let dirs = resolve_directories(Path::new("/r"), &elements);
        assert!(dirs.get(5).is_none());

        let (files, skipped) = resolve_files(elements, &dirs);
        assert_eq!(skipped, 3);
        assert_eq!(paths(&files), vec![PathBuf::from("/r/ok/kept.txt")]);
    }

    #[test]
    fn test_legacy_and_modern_trees_resolve_identically() {
        // Same tree: /r/a/b/x.txt, /r/a/y.txt, /r/z.txt
        let modern = classify(
            vec![
                raw(0, -1, 0, "a"),
                raw(0, -2, 1, "b"),
                raw(0, 1, 2, "x.txt"),
                raw(0, 2, 1, "y.txt"),
                raw(0, 3, 0, "z.txt"),
            ],
            Layout::for_version(8).unwrap(),
        );
        let legacy = classify(
            vec![
                raw(0, 0, 0, "a"),
                raw(0, 0, 1, "b"),
                raw(0, 1, 2, "x.txt"),
                raw(0, 2, 1, "y.txt"),
                raw(0, 3, 0, "z.txt"),
            ],
            Layout::for_version(6).unwrap(),
        );

        let root = Path::new("/r");
        let modern_dirs = resolve_directories(root, &modern);
        let legacy_dirs = resolve_directories(root, &legacy);
        let (modern_files, _) = resolve_files(modern, &modern_dirs);
        let (legacy_files, _) = resolve_files(legacy, &legacy_dirs);

        assert_eq!(paths(&modern_files), paths(&legacy_files));
        assert_eq!(paths(&modern_files).len(), 3);
    }

    #[test]
    fn test_repeated_directory_id_keeps_first() {
        let elements = classify(
            vec![raw(0, -1, 0, "first"), raw(0, -1, 0, "second")],
            Layout::for_version(8).unwrap(),
        );
        let dirs = resolve_directories(Path::new("/r"), &elements);
        assert_eq!(dirs.get(1), Some(Path::new("/r/first")));
    }
}
