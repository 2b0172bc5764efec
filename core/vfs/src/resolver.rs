//! Resolution of `(commit, subpath)` locations against an object store.
//!
//! Every call walks from the commit's root tree. Trees are immutable, so
//! nothing is retained between calls.

use std::io::{Cursor, Read};

use tracing::error;

use gitmount_common::{Error, ObjectId, Result};
use gitmount_store::{mode, CommitInfo, ObjectStore, RawTreeEntry};

/// What a tree entry is, derived from its mode bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEntry {
    File { size: u64, executable: bool },
    Directory,
    /// In-tree symbolic link; `size` is the length of the link payload.
    Symlink { size: u64 },
    /// Gitlink pointing at a commit in a submodule's repository.
    Submodule { target_commit: ObjectId },
}

/// File type as presented to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
    Symlink,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Decoded mode bits of a raw tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryMode {
    Tree,
    Blob { executable: bool },
    Link,
    Gitlink,
}

const MODE_TYPE_MASK: u32 = 0o170000;
const MODE_REGULAR: u32 = 0o100000;

impl EntryMode {
    fn from_bits(bits: u32) -> Result<Self> {
        match bits & MODE_TYPE_MASK {
            mode::TREE => Ok(EntryMode::Tree),
            mode::LINK => Ok(EntryMode::Link),
            mode::COMMIT => Ok(EntryMode::Gitlink),
            MODE_REGULAR => Ok(EntryMode::Blob {
                executable: bits & 0o111 != 0,
            }),
            _ => Err(Error::ObjectStore(format!("unsupported tree entry mode {:o}", bits))),
        }
    }

    fn node_kind(self) -> NodeKind {
        match self {
            EntryMode::Tree => NodeKind::Directory,
            EntryMode::Blob { .. } => NodeKind::File,
            EntryMode::Link | EntryMode::Gitlink => NodeKind::Symlink,
        }
    }
}

/// An object located by walking a tree.
struct Located {
    mode: EntryMode,
    id: ObjectId,
}

/// Resolves commits and tree paths against one object store.
pub struct Resolver<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Parse a commit.
    ///
    /// # Errors
    /// - `NotFound` if `id` does not name a commit
    pub fn resolve_commit(&self, id: &ObjectId) -> Result<CommitInfo> {
        self.store.find_commit(id)
    }

    /// Walk from the commit's root tree down to `subpath`.
    fn locate(&self, commit: &CommitInfo, subpath: &str) -> Result<Located> {
        let mut current = Located {
            mode: EntryMode::Tree,
            id: commit.tree.clone(),
        };

        for component in subpath.split('/').filter(|c| !c.is_empty()) {
            if current.mode != EntryMode::Tree {
                return Err(Error::NotFound(format!(
                    "'{}' in {} is below a non-directory",
                    subpath, commit.id
                )));
            }
            let entries = self
                .store
                .find_tree(&current.id)
                .map_err(|e| at(e, &commit.id, subpath))?;
            let RawTreeEntry { mode, id, .. } = entries
                .into_iter()
                .find(|entry| entry.name == component)
                .ok_or_else(|| {
                    Error::NotFound(format!("'{}' not found in {}", subpath, commit.id))
                })?;
            current = Located {
                mode: EntryMode::from_bits(mode).map_err(|e| at(e, &commit.id, subpath))?,
                id,
            };
        }

        Ok(current)
    }

    fn entry_for(&self, located: &Located, commit: &ObjectId, subpath: &str) -> Result<TreeEntry> {
        let size = || {
            self.store
                .blob_size(&located.id)
                .map_err(|e| at(e, commit, subpath))
        };
        Ok(match located.mode {
            EntryMode::Tree => TreeEntry::Directory,
            EntryMode::Blob { executable } => TreeEntry::File {
                size: size()?,
                executable,
            },
            EntryMode::Link => TreeEntry::Symlink { size: size()? },
            EntryMode::Gitlink => TreeEntry::Submodule {
                target_commit: located.id.clone(),
            },
        })
    }

    /// Resolve the commit and the entry at `subpath` in one pass.
    pub fn stat(&self, commit: &ObjectId, subpath: &str) -> Result<(CommitInfo, TreeEntry)> {
        let info = self.resolve_commit(commit)?;
        let located = self.locate(&info, subpath)?;
        let entry = self.entry_for(&located, commit, subpath)?;
        Ok((info, entry))
    }

    /// Report what lives at `subpath` (the root tree when empty).
    pub fn read_type(&self, commit: &ObjectId, subpath: &str) -> Result<TreeEntry> {
        self.stat(commit, subpath).map(|(_, entry)| entry)
    }

    /// Open the contents of the file at `subpath`.
    ///
    /// # Errors
    /// - `NotFound` if the commit or path does not exist
    /// - `InvariantViolation` if the entry is not a regular file
    pub fn open_blob(&self, commit: &ObjectId, subpath: &str) -> Result<Box<dyn Read + Send>> {
        let info = self.resolve_commit(commit)?;
        let located = self.locate(&info, subpath)?;
        if !matches!(located.mode, EntryMode::Blob { .. }) {
            error!(%commit, subpath, mode = ?located.mode, "read requested on a non-file entry");
            return Err(Error::InvariantViolation(format!(
                "'{}' in {} is not a regular file",
                subpath, commit
            )));
        }
        let data = self
            .store
            .find_blob(&located.id)
            .map_err(|e| at(e, commit, subpath))?;
        Ok(Box::new(Cursor::new(data)))
    }

    /// Payload of the in-tree symbolic link at `subpath`.
    pub fn read_link(&self, commit: &ObjectId, subpath: &str) -> Result<Vec<u8>> {
        let info = self.resolve_commit(commit)?;
        let located = self.locate(&info, subpath)?;
        if located.mode != EntryMode::Link {
            return Err(Error::InvariantViolation(format!(
                "'{}' in {} is not a symbolic link",
                subpath, commit
            )));
        }
        self.store
            .find_blob(&located.id)
            .map_err(|e| at(e, commit, subpath))
    }

    /// Single-level listing of the directory at `subpath`, in tree order.
    ///
    /// # Errors
    /// - `NotFound` if the commit or path does not exist
    /// - `InvariantViolation` if the entry is not a directory
    pub fn list_directory(&self, commit: &ObjectId, subpath: &str) -> Result<Vec<DirEntry>> {
        let info = self.resolve_commit(commit)?;
        let located = self.locate(&info, subpath)?;
        if located.mode != EntryMode::Tree {
            return Err(Error::InvariantViolation(format!(
                "'{}' in {} is not a directory",
                subpath, commit
            )));
        }

        self.store
            .find_tree(&located.id)
            .and_then(|entries| {
                entries
                    .into_iter()
                    .map(|entry| {
                        let kind = EntryMode::from_bits(entry.mode)?.node_kind();
                        Ok(DirEntry::new(entry.name, kind))
                    })
                    .collect()
            })
            .map_err(|e| at(e, commit, subpath))
    }
}

/// Attach the location being resolved to a store failure.
fn at(err: Error, commit: &ObjectId, subpath: &str) -> Error {
    err.context(format_args!("{}:{}", commit, subpath))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitmount_store::{MemoryEntry, MemoryStore};

    fn fixture() -> (MemoryStore, ObjectId, ObjectId) {
        let store = MemoryStore::new("test");
        let sub = store.commit_files(&[("x", MemoryEntry::File(b"x"))], &[], 1);
        let commit = store.commit_files(
            &[
                ("README.md", MemoryEntry::File(b"# project\n")),
                ("bin/run", MemoryEntry::Executable(b"#!/bin/sh\n")),
                ("docs/guide/intro.txt", MemoryEntry::File(b"intro")),
                ("latest", MemoryEntry::Symlink("docs/guide")),
                ("lib", MemoryEntry::Gitlink(sub.clone())),
            ],
            &[],
            1_700_000_000,
        );
        (store, commit, sub)
    }

    #[test]
    fn test_read_type_variants() {
        let (store, commit, sub) = fixture();
        let resolver = Resolver::new(&store);

        assert_eq!(resolver.read_type(&commit, "").unwrap(), TreeEntry::Directory);
        assert_eq!(resolver.read_type(&commit, "docs/guide").unwrap(), TreeEntry::Directory);
        assert_eq!(
            resolver.read_type(&commit, "README.md").unwrap(),
            TreeEntry::File {
                size: 10,
                executable: false
            }
        );
        assert_eq!(
            resolver.read_type(&commit, "bin/run").unwrap(),
            TreeEntry::File {
                size: 10,
                executable: true
            }
        );
        assert_eq!(
            resolver.read_type(&commit, "latest").unwrap(),
            TreeEntry::Symlink { size: 10 }
        );
        assert_eq!(
            resolver.read_type(&commit, "lib").unwrap(),
            TreeEntry::Submodule { target_commit: sub }
        );
    }

    #[test]
    fn test_read_type_is_idempotent() {
        let (store, commit, _) = fixture();
        let resolver = Resolver::new(&store);

        let first = resolver.read_type(&commit, "docs/guide/intro.txt").unwrap();
        let second = resolver.read_type(&commit, "docs/guide/intro.txt").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_paths_are_not_found() {
        let (store, commit, _) = fixture();
        let resolver = Resolver::new(&store);

        assert!(resolver.read_type(&commit, "nope").unwrap_err().is_not_found());
        assert!(resolver.read_type(&commit, "README.md/child").unwrap_err().is_not_found());

        let missing = ObjectId::parse("0000000000000000000000000000000000000000").unwrap();
        assert!(resolver.read_type(&missing, "").unwrap_err().is_not_found());
    }

    #[test]
    fn test_open_blob_roundtrip() {
        let (store, commit, _) = fixture();
        let resolver = Resolver::new(&store);

        let mut content = Vec::new();
        resolver
            .open_blob(&commit, "docs/guide/intro.txt")
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, b"intro");
    }

    #[test]
    fn test_open_blob_on_directory_is_invariant_violation() {
        let (store, commit, _) = fixture();
        let resolver = Resolver::new(&store);

        let err = resolver.open_blob(&commit, "docs").err().unwrap();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_list_directory() {
        let (store, commit, _) = fixture();
        let resolver = Resolver::new(&store);

        let root = resolver.list_directory(&commit, "").unwrap();
        assert_eq!(
            root,
            vec![
                DirEntry::new("README.md", NodeKind::File),
                DirEntry::new("bin", NodeKind::Directory),
                DirEntry::new("docs", NodeKind::Directory),
                DirEntry::new("latest", NodeKind::Symlink),
                DirEntry::new("lib", NodeKind::Symlink),
            ]
        );

        let err = resolver.list_directory(&commit, "README.md").unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_read_link_payload() {
        let (store, commit, _) = fixture();
        let resolver = Resolver::new(&store);

        assert_eq!(resolver.read_link(&commit, "latest").unwrap(), b"docs/guide");
        assert!(matches!(
            resolver.read_link(&commit, "README.md").unwrap_err(),
            Error::InvariantViolation(_)
        ));
    }

    /// Store whose tree or blob-size reads fail as if the object database were corrupt.
    struct CorruptStore {
        inner: MemoryStore,
        trees: bool,
    }

    impl ObjectStore for CorruptStore {
        fn name(&self) -> &str {
            self.inner.name()
        }
        fn refs(&self) -> Result<Vec<gitmount_store::RefInfo>> {
            self.inner.refs()
        }
        fn find_commit(&self, id: &ObjectId) -> Result<CommitInfo> {
            self.inner.find_commit(id)
        }
        fn find_tree(&self, id: &ObjectId) -> Result<Vec<RawTreeEntry>> {
            if self.trees {
                return Err(Error::ObjectStore(format!("corrupt tree {}", id)));
            }
            self.inner.find_tree(id)
        }
        fn find_blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
            self.inner.find_blob(id)
        }
        fn blob_size(&self, id: &ObjectId) -> Result<u64> {
            Err(Error::ObjectStore(format!("corrupt blob {}", id)))
        }
        fn submodules(&self) -> Result<Vec<gitmount_store::SubmoduleInfo>> {
            self.inner.submodules()
        }
        fn open_submodule(
            &self,
            info: &gitmount_store::SubmoduleInfo,
        ) -> Result<std::sync::Arc<dyn ObjectStore>> {
            self.inner.open_submodule(info)
        }
    }

    #[test]
    fn test_store_failures_carry_location() {
        let (inner, commit, _) = fixture();
        let store = CorruptStore { inner, trees: true };
        let err = Resolver::new(&store).read_type(&commit, "docs/guide").unwrap_err();
        assert!(matches!(err, Error::ObjectStore(_)));
        assert!(err.to_string().contains(&format!("{}:docs/guide", commit)));

        let (inner, commit, _) = fixture();
        let store = CorruptStore { inner, trees: false };
        let err = Resolver::new(&store).read_type(&commit, "README.md").unwrap_err();
        assert!(matches!(err, Error::ObjectStore(_)));
        assert!(err.to_string().contains(&format!("{}:README.md", commit)));
    }

    #[test]
    fn test_unsupported_mode() {
        assert!(EntryMode::from_bits(0o020000).is_err());
        assert_eq!(
            EntryMode::from_bits(0o100664).unwrap(),
            EntryMode::Blob { executable: false }
        );
    }
}
