//! Inode number to virtual path mapping
//!
//! The kernel addresses files by inode number while the content path works
//! on virtual paths. Numbers are allocated on first lookup and released when
//! the kernel forgets every reference.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Inode number of the mount root
pub const ROOT_INO: u64 = 1;

#[derive(Debug)]
struct InodeEntry {
    /// None once the name was unlinked or replaced by a rename
    path: Option<PathBuf>,
    /// Outstanding kernel lookups
    lookups: u64,
}

#[derive(Debug)]
struct Inner {
    next_ino: u64,
    inodes: HashMap<u64, InodeEntry>,
    path_to_ino: HashMap<PathBuf, u64>,
}

/// Manages inode allocation and path mapping
#[derive(Debug)]
pub struct InodeTable {
    inner: RwLock<Inner>,
}

impl InodeTable {
    pub fn new() -> Self {
        let root = PathBuf::from("/");
        let mut inodes = HashMap::new();
        inodes.insert(
            ROOT_INO,
            InodeEntry {
                path: Some(root.clone()),
                lookups: 1,
            },
        );
        let mut path_to_ino = HashMap::new();
        path_to_ino.insert(root, ROOT_INO);

        Self {
            inner: RwLock::new(Inner {
                next_ino: ROOT_INO + 1,
                inodes,
                path_to_ino,
            }),
        }
    }

    /// Virtual path of an inode, or None if it is unknown or detached
    pub fn path(&self, ino: u64) -> Option<PathBuf> {
        self.inner.read().inodes.get(&ino).and_then(|e| e.path.clone())
    }

    /// Virtual path of `name` inside directory `parent`
    pub fn child_path(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        self.inner
            .read()
            .inodes
            .get(&parent)
            .and_then(|e| e.path.as_ref())
            .map(|p| p.join(name))
    }

    /// Inode currently mapped to a path, without taking a reference
    pub fn ino_of(&self, path: &Path) -> Option<u64> {
        self.inner.read().path_to_ino.get(path).copied()
    }

    /// Record a kernel lookup of `path`, allocating an inode if needed
    pub fn lookup(&self, path: &Path) -> u64 {
        let mut inner = self.inner.write();

        if let Some(&ino) = inner.path_to_ino.get(path) {
            if let Some(entry) = inner.inodes.get_mut(&ino) {
                entry.lookups += 1;
            }
            return ino;
        }

        let ino = inner.next_ino;
        inner.next_ino += 1;
        inner.inodes.insert(
            ino,
            InodeEntry {
                path: Some(path.to_path_buf()),
                lookups: 1,
            },
        );
        inner.path_to_ino.insert(path.to_path_buf(), ino);
        ino
    }

    /// Drop `nlookup` kernel references; the inode is released at zero
    pub fn forget(&self, ino: u64, nlookup: u64) {
        if ino == ROOT_INO {
            return;
        }

        let mut inner = self.inner.write();
        let released = match inner.inodes.get_mut(&ino) {
            Some(entry) => {
                entry.lookups = entry.lookups.saturating_sub(nlookup);
                entry.lookups == 0
            }
            None => false,
        };

        if released {
            if let Some(path) = inner.inodes.remove(&ino).and_then(|e| e.path) {
                if inner.path_to_ino.get(&path) == Some(&ino) {
                    inner.path_to_ino.remove(&path);
                }
            }
        }
    }

    /// Detach a path after unlink/rmdir. The inode lives on until forgotten
    /// but no longer resolves to any path.
    pub fn unlink(&self, path: &Path) {
        let mut inner = self.inner.write();
        if let Some(ino) = inner.path_to_ino.remove(path) {
            inner.detach(ino);
        }
    }

    /// Move `from` and every cached descendant under `to`
    pub fn rename(&self, from: &Path, to: &Path) {
        if from == to {
            return;
        }
        let mut inner = self.inner.write();

        // Whatever `to` pointed at has been replaced
        let replaced: Vec<u64> = inner
            .path_to_ino
            .iter()
            .filter(|(path, _)| path.starts_with(to))
            .map(|(_, &ino)| ino)
            .collect();
        for ino in replaced {
            inner.detach(ino);
        }

        let moved: Vec<(PathBuf, u64)> = inner
            .path_to_ino
            .iter()
            .filter(|(path, _)| path.starts_with(from))
            .map(|(path, &ino)| (path.clone(), ino))
            .collect();

        for (old_path, ino) in moved {
            let new_path = match old_path.strip_prefix(from) {
                Ok(rest) if rest.as_os_str().is_empty() => to.to_path_buf(),
                Ok(rest) => to.join(rest),
                Err(_) => continue,
            };

            inner.path_to_ino.remove(&old_path);
            inner.path_to_ino.insert(new_path.clone(), ino);
            if let Some(entry) = inner.inodes.get_mut(&ino) {
                entry.path = Some(new_path);
            }
        }
    }

    /// Number of live inodes, root included
    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.read().inodes.len()
    }
}

impl Inner {
    /// Drop the path mapping of `ino`, leaving the entry for `forget`
    fn detach(&mut self, ino: u64) {
        if let Some(entry) = self.inodes.get_mut(&ino) {
            if let Some(path) = entry.path.take() {
                if self.path_to_ino.get(&path) == Some(&ino) {
                    self.path_to_ino.remove(&path);
                }
            }
        }
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_registered() {
        let table = InodeTable::new();
        assert_eq!(table.path(ROOT_INO), Some(PathBuf::from("/")));
        assert_eq!(
            table.child_path(ROOT_INO, OsStr::new("a")),
            Some(PathBuf::from("/a"))
        );
    }

    #[test]
    fn test_lookup_is_stable() {
        let table = InodeTable::new();
        let a = table.lookup(Path::new("/a"));
        let b = table.lookup(Path::new("/b"));

        assert_ne!(a, b);
        assert_ne!(a, ROOT_INO);
        assert_eq!(table.lookup(Path::new("/a")), a);
        assert_eq!(table.path(a), Some(PathBuf::from("/a")));
    }

    #[test]
    fn test_forget_releases_after_all_lookups() {
        let table = InodeTable::new();
        let ino = table.lookup(Path::new("/f"));
        table.lookup(Path::new("/f"));

        table.forget(ino, 1);
        assert!(table.path(ino).is_some());

        table.forget(ino, 1);
        assert!(table.path(ino).is_none());
        assert!(table.ino_of(Path::new("/f")).is_none());
    }

    #[test]
    fn test_root_never_forgotten() {
        let table = InodeTable::new();
        table.forget(ROOT_INO, 100);
        assert!(table.path(ROOT_INO).is_some());
    }

    #[test]
    fn test_rename_moves_descendants() {
        let table = InodeTable::new();
        let dir = table.lookup(Path::new("/dir"));
        let file = table.lookup(Path::new("/dir/sub/file"));
        let sibling = table.lookup(Path::new("/dirx"));

        table.rename(Path::new("/dir"), Path::new("/moved"));

        assert_eq!(table.path(dir), Some(PathBuf::from("/moved")));
        assert_eq!(table.path(file), Some(PathBuf::from("/moved/sub/file")));
        assert_eq!(table.path(sibling), Some(PathBuf::from("/dirx")));
        assert_eq!(table.ino_of(Path::new("/moved/sub/file")), Some(file));
        assert!(table.ino_of(Path::new("/dir")).is_none());
    }

    #[test]
    fn test_rename_over_existing_target() {
        let table = InodeTable::new();
        let src = table.lookup(Path::new("/src"));
        let dst = table.lookup(Path::new("/dst"));

        table.rename(Path::new("/src"), Path::new("/dst"));

        assert_eq!(table.ino_of(Path::new("/dst")), Some(src));
        assert_eq!(table.path(src), Some(PathBuf::from("/dst")));
        // The replaced inode no longer names the new file
        assert_eq!(table.path(dst), None);
        assert_eq!(table.child_path(dst, OsStr::new("x")), None);

        table.forget(dst, 1);
        assert_eq!(table.ino_of(Path::new("/dst")), Some(src));
    }

    #[test]
    fn test_unlink_detaches_path() {
        let table = InodeTable::new();
        let ino = table.lookup(Path::new("/gone"));
        table.unlink(Path::new("/gone"));

        assert!(table.ino_of(Path::new("/gone")).is_none());
        assert_eq!(table.path(ino), None);

        let fresh = table.lookup(Path::new("/gone"));
        assert_ne!(fresh, ino);
        assert_eq!(table.path(ino), None);
        assert_eq!(table.len(), 3);

        table.forget(ino, 1);
        assert_eq!(table.ino_of(Path::new("/gone")), Some(fresh));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_rename_onto_itself_is_noop() {
        let table = InodeTable::new();
        let ino = table.lookup(Path::new("/same"));
        table.rename(Path::new("/same"), Path::new("/same"));
        assert_eq!(table.path(ino), Some(PathBuf::from("/same")));
    }
}
