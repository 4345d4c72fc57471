//! Slash-separated path resolution.
//!
//! Paths are resolved component by component against the current
//! directory, or against the root when they start with `/`. `.` stays in
//! place, `..` follows the directory's parent slot (the root's parent is
//! itself), and every component before the last must name a directory.

use crate::dir::{self, Found};
use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::hash::hash_name;
use crate::record::{FileHeader, FileKind};

/// Outcome of resolving a path.
///
/// When `name` is empty the path named a directory purely by navigation
/// (`""`, `/`, `.`, `..`, or a trailing run of them) and `dir` itself is
/// the target. Otherwise `dir` is the directory containing the final
/// component, and `entry` is that component's location if it exists.
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    /// Directory containing the final component (or the target itself).
    pub dir: u64,
    /// The final component, when present in `dir`.
    pub entry: Option<Found>,
    /// The final component's name; empty when the target is `dir`.
    pub name: String,
}

impl Resolved {
    /// The header offset of the existing file or directory this path
    /// names, or `NotFound` if the final component is missing.
    pub fn target(&self, path: &str) -> Result<u64> {
        if self.name.is_empty() {
            Ok(self.dir)
        } else {
            self.entry
                .map(|found| found.header)
                .ok_or_else(|| Error::NotFound { path: path.into() })
        }
    }
}

/// Resolves `path` starting from the header's current directory (or the
/// root for absolute paths).
pub(crate) fn resolve(disk: &Disk, path: &str) -> Result<Resolved> {
    let mut current = if path.starts_with('/') {
        disk.root_directory()
    } else {
        disk.current_directory()
    };
    disk.check_access(current)?;

    let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    for (index, part) in parts.iter().enumerate() {
        let is_last = index + 1 == parts.len();
        match *part {
            "." => {}
            ".." => current = dir::parent_of(disk, current)?,
            name => {
                let found = dir::find_child(disk, current, hash_name(name))?;
                if is_last {
                    return Ok(Resolved {
                        dir: current,
                        entry: found,
                        name: name.to_owned(),
                    });
                }
                match found {
                    Some(child) => {
                        if FileHeader::read_at(disk, child.header)?.kind != FileKind::Dir {
                            return Err(Error::InvalidPath { path: path.into() });
                        }
                        current = child.header;
                    }
                    None => return Err(Error::NotFound { path: path.into() }),
                }
            }
        }
    }

    Ok(Resolved {
        dir: current,
        entry: None,
        name: String::new(),
    })
}

/// Resolves `path` all the way to an existing directory.
pub(crate) fn resolve_dir(disk: &Disk, path: &str) -> Result<u64> {
    let resolved = resolve(disk, path)?;
    let target = resolved.target(path)?;
    let header = FileHeader::read_at(disk, target)?;
    if header.kind != FileKind::Dir {
        return Err(Error::WrongType {
            name: header.name_str(),
            expected: "directory",
        });
    }
    Ok(target)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::alloc;
    use crate::block;
    use crate::record::FILE_HEADER_SIZE;

    /// Root plus `a/`, `a/b/`, and regular files `f` and `a/g`.
    fn sample_tree() -> (Disk, u64, u64, u64) {
        let mut disk = Disk::format(64 * 1024).unwrap();
        let root = alloc::allocate(&mut disk, FILE_HEADER_SIZE).unwrap();
        FileHeader::new("root", hash_name("root"), FileKind::Dir)
            .write_at(&mut disk, root)
            .unwrap();
        block::write_data(&mut disk, root, &root.to_le_bytes()).unwrap();
        block::write_data(&mut disk, root, &root.to_le_bytes()).unwrap();
        disk.set_root_directory(root).unwrap();
        disk.set_current_directory(root).unwrap();

        let a = dir::create_child(&mut disk, root, "a", FileKind::Dir).unwrap();
        let b = dir::create_child(&mut disk, a, "b", FileKind::Dir).unwrap();
        dir::create_child(&mut disk, root, "f", FileKind::File).unwrap();
        dir::create_child(&mut disk, a, "g", FileKind::File).unwrap();
        (disk, root, a, b)
    }

    #[test]
    fn resolves_relative_and_absolute() {
        let (disk, root, a, b) = sample_tree();
        assert_eq!(resolve_dir(&disk, "a").unwrap(), a);
        assert_eq!(resolve_dir(&disk, "/a/b").unwrap(), b);
        assert_eq!(resolve_dir(&disk, "a/b").unwrap(), b);
        assert_eq!(resolve_dir(&disk, "/").unwrap(), root);
        assert_eq!(resolve_dir(&disk, "").unwrap(), root);
    }

    #[test]
    fn dot_and_dotdot() {
        let (mut disk, root, a, b) = sample_tree();
        assert_eq!(resolve_dir(&disk, ".").unwrap(), root);
        assert_eq!(resolve_dir(&disk, "a/..").unwrap(), root);
        assert_eq!(resolve_dir(&disk, "a/b/../..").unwrap(), root);
        assert_eq!(resolve_dir(&disk, "./a/./b").unwrap(), b);
        // Root's parent is root.
        assert_eq!(resolve_dir(&disk, "..").unwrap(), root);
        assert_eq!(resolve_dir(&disk, "/..").unwrap(), root);

        disk.set_current_directory(a).unwrap();
        assert_eq!(resolve_dir(&disk, "..").unwrap(), root);
        assert_eq!(resolve_dir(&disk, "b").unwrap(), b);
        assert_eq!(resolve_dir(&disk, "/a").unwrap(), a);
    }

    #[test]
    fn file_in_the_middle_is_invalid() {
        let (disk, ..) = sample_tree();
        assert!(matches!(
            resolve(&disk, "f/x"),
            Err(Error::InvalidPath { .. })
        ));
    }

    #[test]
    fn missing_middle_component_is_not_found() {
        let (disk, ..) = sample_tree();
        assert!(matches!(
            resolve(&disk, "nope/x"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn final_component_may_be_missing() {
        let (disk, root, ..) = sample_tree();
        let resolved = resolve(&disk, "new.txt").unwrap();
        assert_eq!(resolved.dir, root);
        assert!(resolved.entry.is_none());
        assert_eq!(resolved.name, "new.txt");
        assert!(resolved.target("new.txt").is_err());
    }

    #[test]
    fn nested_lookup_returns_parent_dir() {
        let (disk, _, a, _) = sample_tree();
        let resolved = resolve(&disk, "/a/g").unwrap();
        assert_eq!(resolved.dir, a);
        assert!(resolved.entry.is_some());
        assert_eq!(resolved.name, "g");
    }

    #[test]
    fn chdir_to_file_is_wrong_type() {
        let (disk, ..) = sample_tree();
        assert!(matches!(
            resolve_dir(&disk, "f"),
            Err(Error::WrongType { .. })
        ));
    }
}
