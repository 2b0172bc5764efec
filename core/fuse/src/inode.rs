//! Inode numbers for mount-relative paths.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Inode of the mount root.
pub const ROOT_INODE: u64 = 1;

/// Set on inode numbers reported for directory entries that were never
/// looked up. Allocated inodes count up from the root and never reach it.
const LISTING_BIT: u64 = 1 << 63;

/// Bidirectional inode/path map.
///
/// Inodes are handed out on first lookup and dropped again once the kernel
/// forgets every lookup of them. The root is never dropped.
#[derive(Debug)]
pub struct InodeTable {
    path_to_inode: HashMap<String, u64>,
    inode_to_path: HashMap<u64, String>,
    lookups: HashMap<u64, u64>,
    next_inode: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let mut table = Self {
            path_to_inode: HashMap::new(),
            inode_to_path: HashMap::new(),
            lookups: HashMap::new(),
            next_inode: ROOT_INODE + 1,
        };
        table.path_to_inode.insert("/".to_string(), ROOT_INODE);
        table.inode_to_path.insert(ROOT_INODE, "/".to_string());
        table
    }

    /// Inode for `path`, allocating one if needed. Does not count a lookup.
    fn get_or_create(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.path_to_inode.get(path) {
            return ino;
        }
        let ino = self.next_inode;
        self.next_inode += 1;
        self.path_to_inode.insert(path.to_string(), ino);
        self.inode_to_path.insert(ino, path.to_string());
        ino
    }

    /// Inode for `path`, recording one kernel lookup of it.
    pub fn lookup(&mut self, path: &str) -> u64 {
        let ino = self.get_or_create(path);
        *self.lookups.entry(ino).or_insert(0) += 1;
        ino
    }

    /// Inode to report for `path` in a directory listing.
    ///
    /// Returns the allocated inode when the path has one. Otherwise a
    /// number derived from the path is returned and nothing is stored, since
    /// the kernel never forgets entries it only saw through `readdir`.
    pub fn listing_inode(&self, path: &str) -> u64 {
        if let Some(&ino) = self.path_to_inode.get(path) {
            return ino;
        }
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        hasher.finish() | LISTING_BIT
    }

    pub fn path(&self, ino: u64) -> Option<&str> {
        self.inode_to_path.get(&ino).map(String::as_str)
    }

    pub fn inode(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(path).copied()
    }

    /// Drop `nlookup` lookups of `ino`, releasing it when none remain.
    pub fn forget(&mut self, ino: u64, nlookup: u64) {
        if ino == ROOT_INODE {
            return;
        }
        let remaining = match self.lookups.get_mut(&ino) {
            Some(count) => {
                *count = count.saturating_sub(nlookup);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            self.lookups.remove(&ino);
            if let Some(path) = self.inode_to_path.remove(&ino) {
                self.path_to_inode.remove(&path);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inode_to_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inode_to_path.is_empty()
    }
}

/// Join a child name onto a mount-relative directory path.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Parent directory of a mount-relative path; the root is its own parent.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}
