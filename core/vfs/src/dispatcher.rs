//! Path-based filesystem operations.
//!
//! [`GitFs`] answers `getattr`, `readdir`, `read` and `readlink` for path
//! strings. It holds no per-file state: every call classifies the path,
//! enters the submodule scope it names, and resolves against that store.

use std::io::{self, Read};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, error, instrument};

use gitmount_common::{Error, ObjectId, RefKind, Result};
use gitmount_store::ObjectStore;

use crate::config::FsConfig;
use crate::link_cache::LinkCache;
use crate::path::{PathClassifier, VirtualPath, TOP_LEVEL};
use crate::refs::RefEnumerator;
use crate::resolver::{DirEntry, NodeKind, Resolver, TreeEntry};
use crate::submodule::StoreNode;

/// Attributes of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    pub kind: NodeKind,
    pub size: u64,
    pub executable: bool,
    pub mtime: SystemTime,
}

impl Attributes {
    fn directory(mtime: SystemTime) -> Self {
        Self {
            kind: NodeKind::Directory,
            size: 0,
            executable: true,
            mtime,
        }
    }

    fn file(size: u64, executable: bool, mtime: SystemTime) -> Self {
        Self {
            kind: NodeKind::File,
            size,
            executable,
            mtime,
        }
    }

    fn symlink(size: u64, mtime: SystemTime) -> Self {
        Self {
            kind: NodeKind::Symlink,
            size,
            executable: false,
            mtime,
        }
    }
}

/// Read-only view of a repository's history as a directory tree.
pub struct GitFs {
    root: Arc<StoreNode>,
    links: LinkCache,
    classifier: PathClassifier,
    config: FsConfig,
    mounted_at: SystemTime,
}

impl GitFs {
    /// Create a filesystem over `store`.
    ///
    /// # Errors
    /// - `InvalidInput` if `config` fails validation
    pub fn new(store: Arc<dyn ObjectStore>, config: FsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            root: Arc::new(StoreNode::root(store)),
            links: LinkCache::from_config(&config),
            classifier: PathClassifier::new(config.hidden_marker.clone()),
            config,
            mounted_at: SystemTime::now(),
        })
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    /// The mounted repository's store.
    pub fn store(&self) -> &dyn ObjectStore {
        self.root.store()
    }

    pub fn link_cache(&self) -> &LinkCache {
        &self.links
    }

    /// Attributes of `path`.
    #[instrument(level = "debug", skip(self))]
    pub fn getattr(&self, path: &str) -> Result<Attributes> {
        let result = self.prepare(path).and_then(|(node, vpath)| self.attr_of(&node, &vpath, path));
        self.finish("getattr", path, result)
    }

    /// Entries of the directory at `path`, excluding `.` and `..`.
    #[instrument(level = "debug", skip(self))]
    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let result = self.prepare(path).and_then(|(node, vpath)| self.list(&node, &vpath));
        self.finish("readdir", path, result)
    }

    /// Read up to `buf.len()` bytes of the file at `path` starting at `offset`.
    ///
    /// Returns the number of bytes read; zero at or past end of file.
    #[instrument(level = "debug", skip(self, buf), fields(len = buf.len()))]
    pub fn read(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let result = self
            .prepare(path)
            .and_then(|(node, vpath)| self.read_file(&node, &vpath, offset, buf));
        self.finish("read", path, result)
    }

    /// Target of the symbolic link at `path`.
    #[instrument(level = "debug", skip(self))]
    pub fn readlink(&self, path: &str) -> Result<Vec<u8>> {
        let result = self.prepare(path).and_then(|(node, vpath)| self.link_of(&node, &vpath, path));
        self.finish("readlink", path, result)
    }

    /// Sweep the link cache if due, classify `path` and enter its store.
    fn prepare(&self, path: &str) -> Result<(Arc<StoreNode>, VirtualPath)> {
        self.links.maybe_sweep();

        let mut node = Arc::clone(&self.root);
        let mut vpath = self.classifier.classify(path);
        while let VirtualPath::SubmodulePath { name, rest } = vpath {
            node = node.submodule(&name)?;
            vpath = *rest;
        }
        Ok((node, vpath))
    }

    /// Log the outcome of an operation at a level matching its error kind.
    fn finish<T>(&self, op: &str, path: &str, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => {}
            Err(e) if e.is_not_found() => debug!(op, path, "not found"),
            Err(e) if matches!(e, Error::InvariantViolation(_)) => {
                error!(op, path, error = %e, "invariant violated")
            }
            Err(e) => error!(op, path, error = %e, "operation failed"),
        }
        result
    }

    fn attr_of(&self, node: &StoreNode, vpath: &VirtualPath, path: &str) -> Result<Attributes> {
        match vpath {
            VirtualPath::Root
            | VirtualPath::CommitRoot
            | VirtualPath::CommitShard(_)
            | VirtualPath::BranchRoot
            | VirtualPath::TagRoot
            | VirtualPath::RemoteRoot
            | VirtualPath::SubmoduleRoot => Ok(Attributes::directory(self.mounted_at)),

            VirtualPath::SubmoduleName(name) => {
                node.submodule(name)?;
                Ok(Attributes::directory(self.mounted_at))
            }

            VirtualPath::CommitDir(commit) => {
                let info = Resolver::new(node.store()).resolve_commit(commit)?;
                Ok(Attributes::directory(info.time.into()))
            }

            VirtualPath::CommitSubPath { commit, subpath } => {
                let (info, entry) = Resolver::new(node.store()).stat(commit, subpath)?;
                let mtime: SystemTime = info.time.into();
                Ok(match entry {
                    TreeEntry::Directory => Attributes::directory(mtime),
                    TreeEntry::File { size, executable } => Attributes::file(size, executable, mtime),
                    TreeEntry::Symlink { size } => Attributes::symlink(size, mtime),
                    TreeEntry::Submodule { target_commit } => {
                        let size = match self.gitlink_target(node, path, subpath, &target_commit) {
                            Ok(target) => target.len() as u64,
                            // Undeclared gitlinks still show up as dangling links.
                            Err(e) if e.is_not_found() => 0,
                            Err(e) => return Err(e),
                        };
                        Attributes::symlink(size, mtime)
                    }
                })
            }

            VirtualPath::BranchDir(_) | VirtualPath::TagDir(_) | VirtualPath::RemoteDir(_) => {
                let target = self.ref_target(node, vpath)?;
                Ok(Attributes::symlink(target.len() as u64, self.mounted_at))
            }

            VirtualPath::SubmodulePath { .. } | VirtualPath::Unknown => Err(not_found(path)),
        }
    }

    fn list(&self, node: &StoreNode, vpath: &VirtualPath) -> Result<Vec<DirEntry>> {
        let dirs = |names: Vec<String>| -> Vec<DirEntry> {
            names
                .into_iter()
                .map(|n| DirEntry::new(n, NodeKind::Directory))
                .collect()
        };
        let top_level = || -> Vec<DirEntry> {
            TOP_LEVEL
                .iter()
                .map(|n| DirEntry::new(*n, NodeKind::Directory))
                .collect()
        };

        match vpath {
            VirtualPath::Root => Ok(top_level()),

            VirtualPath::CommitRoot => {
                let shards = RefEnumerator::new(node.store()).all_commit_shards()?;
                Ok(dirs(shards.into_iter().map(|s| s.to_string()).collect()))
            }

            VirtualPath::CommitShard(shard) => {
                let commits = RefEnumerator::new(node.store()).commits_in_shard(Some(shard))?;
                Ok(dirs(commits.iter().map(|id| id.rest().to_string()).collect()))
            }

            VirtualPath::CommitDir(commit) => Resolver::new(node.store()).list_directory(commit, ""),

            VirtualPath::CommitSubPath { commit, subpath } => {
                Resolver::new(node.store()).list_directory(commit, subpath)
            }

            VirtualPath::BranchRoot => list_refs(node, RefKind::Branch),
            VirtualPath::TagRoot => list_refs(node, RefKind::Tag),
            VirtualPath::RemoteRoot => list_refs(node, RefKind::Remote),

            VirtualPath::SubmoduleRoot => {
                let mut names = Vec::new();
                for name in node.submodule_names()? {
                    match node.submodule(&name) {
                        Ok(_) => names.push(name),
                        Err(e) if e.is_not_found() => {
                            debug!(submodule = %name, error = %e, "skipping unavailable submodule")
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(dirs(names))
            }

            VirtualPath::SubmoduleName(name) => {
                node.submodule(name)?;
                Ok(top_level())
            }

            VirtualPath::BranchDir(_) | VirtualPath::TagDir(_) | VirtualPath::RemoteDir(_) => Err(
                Error::InvariantViolation(format!("{:?} is a link, not a directory", vpath)),
            ),

            VirtualPath::SubmodulePath { .. } | VirtualPath::Unknown => {
                Err(Error::NotFound(format!("{:?}", vpath)))
            }
        }
    }

    fn read_file(
        &self,
        node: &StoreNode,
        vpath: &VirtualPath,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        match vpath {
            VirtualPath::CommitSubPath { commit, subpath } => {
                let mut reader = Resolver::new(node.store()).open_blob(commit, subpath)?;
                io::copy(&mut reader.by_ref().take(offset), &mut io::sink())?;
                read_full(&mut reader, buf)
            }
            VirtualPath::Unknown => Err(Error::NotFound(format!("{:?}", vpath))),
            other => Err(Error::InvariantViolation(format!(
                "read requested on {:?}, which is not a file",
                other
            ))),
        }
    }

    fn link_of(&self, node: &StoreNode, vpath: &VirtualPath, path: &str) -> Result<Vec<u8>> {
        match vpath {
            VirtualPath::BranchDir(_) | VirtualPath::TagDir(_) | VirtualPath::RemoteDir(_) => {
                Ok(self.ref_target(node, vpath)?.into_bytes())
            }
            VirtualPath::CommitSubPath { commit, subpath } => {
                let resolver = Resolver::new(node.store());
                match resolver.read_type(commit, subpath)? {
                    TreeEntry::Symlink { .. } => resolver.read_link(commit, subpath),
                    TreeEntry::Submodule { target_commit } => Ok(self
                        .gitlink_target(node, path, subpath, &target_commit)?
                        .into_bytes()),
                    _ => Err(Error::InvariantViolation(format!(
                        "'{}' in {} is not a link",
                        subpath, commit
                    ))),
                }
            }
            VirtualPath::Unknown => Err(not_found(path)),
            other => Err(Error::InvariantViolation(format!("{:?} is not a link", other))),
        }
    }

    /// Cached `../commit/<shard>/<rest>` target of a ref link.
    fn ref_target(&self, node: &StoreNode, vpath: &VirtualPath) -> Result<String> {
        let Some((kind, name)) = vpath.ref_link() else {
            return Err(Error::InvariantViolation(format!("{:?} is not a ref link", vpath)));
        };
        let key = format!("/{}{}/{}", node.scope(), kind.dir_name(), name);
        self.links
            .get_or_resolve(&key, || RefEnumerator::new(node.store()).head_commit(kind, name))
    }

    /// Relative target that carries a gitlink at `path` into its submodule's
    /// commit directory.
    fn gitlink_target(
        &self,
        node: &StoreNode,
        path: &str,
        subpath: &str,
        target: &ObjectId,
    ) -> Result<String> {
        let name = node.submodule_for_gitlink(subpath, target)?;
        let depth = path
            .trim_matches('/')
            .split('/')
            .filter(|c| !c.is_empty())
            .count()
            .saturating_sub(1);
        Ok(format!(
            "{}{}submodule/{}/commit/{}/{}",
            "../".repeat(depth),
            node.scope(),
            name,
            target.shard(),
            target.rest()
        ))
    }
}

fn list_refs(node: &StoreNode, kind: RefKind) -> Result<Vec<DirEntry>> {
    Ok(RefEnumerator::new(node.store())
        .list(kind)?
        .into_iter()
        .map(|name| DirEntry::new(name, NodeKind::Symlink))
        .collect())
}

fn not_found(path: &str) -> Error {
    Error::NotFound(format!("'{}' does not exist", path))
}

/// Fill `buf` from `reader` until it is full or the reader is exhausted.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}


#[cfg(test)]
mod git_tests {
    use super::*;
    use git2::{Repository, Signature, Time};
    use gitmount_store::{mode, GitStore};
    use tempfile::TempDir;

    /// Two commits on `main`, the first also tagged `v1`.
    fn repository() -> (TempDir, String, String) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let sig = Signature::new("Test User", "test@example.com", &Time::new(1_700_000_000, 0)).unwrap();

        let v1 = repo.blob(b"first\n").unwrap();
        let mut builder = repo.treebuilder(None).unwrap();
        builder.insert("notes.txt", v1, mode::BLOB as i32).unwrap();
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        let first = repo
            .commit(Some("refs/heads/main"), &sig, &sig, "first", &tree, &[])
            .unwrap();
        repo.reference("refs/tags/v1", first, false, "tag").unwrap();

        let v2 = repo.blob(b"second\n").unwrap();
        let mut builder = repo.treebuilder(Some(&tree)).unwrap();
        builder.insert("notes.txt", v2, mode::BLOB as i32).unwrap();
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        let parent = repo.find_commit(first).unwrap();
        let second = repo
            .commit(Some("refs/heads/main"), &sig, &sig, "second", &tree, &[&parent])
            .unwrap();

        (dir, first.to_string(), second.to_string())
    }

    fn read_all(fs: &GitFs, path: &str) -> Vec<u8> {
        let mut buf = vec![0u8; 4096];
        let n = fs.read(path, 0, &mut buf).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn test_history_of_real_repository() {
        let (dir, first, second) = repository();
        let store = Arc::new(GitStore::open(dir.path()).unwrap());
        let fs = GitFs::new(store, FsConfig::default()).unwrap();

        let main = String::from_utf8(fs.readlink("/branch/main").unwrap()).unwrap();
        assert_eq!(main, format!("../commit/{}/{}", &second[..2], &second[2..]));
        let tag = String::from_utf8(fs.readlink("/tag/v1").unwrap()).unwrap();
        assert_eq!(tag, format!("../commit/{}/{}", &first[..2], &first[2..]));

        let old = format!("/commit/{}/{}/notes.txt", &first[..2], &first[2..]);
        let new = format!("/commit/{}/{}/notes.txt", &second[..2], &second[2..]);
        assert_eq!(read_all(&fs, &old), b"first\n");
        assert_eq!(read_all(&fs, &new), b"second\n");

        let shard = fs.readdir(&format!("/commit/{}", &first[..2])).unwrap();
        assert!(shard.iter().any(|e| e.name == first[2..]));
    }

    #[test]
    fn test_submodule_that_is_not_checked_out() {
        let (dir, _, _) = repository();
        let repo = Repository::open(dir.path()).unwrap();
        let sig = Signature::new("Test User", "test@example.com", &Time::new(1_700_000_100, 0)).unwrap();

        let gitmodules = b"[submodule \"lib\"]\n\tpath = lib\n\turl = https://example.invalid/lib.git\n";
        std::fs::write(dir.path().join(".gitmodules"), gitmodules).unwrap();
        let pinned = git2::Oid::from_str("3333333333333333333333333333333333333333").unwrap();
        let parent = repo.head().unwrap().peel_to_commit().unwrap();
        let mut builder = repo.treebuilder(Some(&parent.tree().unwrap())).unwrap();
        builder
            .insert(".gitmodules", repo.blob(gitmodules).unwrap(), mode::BLOB as i32)
            .unwrap();
        builder.insert("lib", pinned, mode::COMMIT as i32).unwrap();
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        let head = repo
            .commit(Some("refs/heads/main"), &sig, &sig, "add lib", &tree, &[&parent])
            .unwrap()
            .to_string();

        let store = Arc::new(GitStore::open(dir.path()).unwrap());
        let fs = GitFs::new(store, FsConfig::default()).unwrap();

        assert!(fs.readdir("/submodule").unwrap().is_empty());
        let err = fs.getattr("/submodule/lib").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string().matches("submodule 'lib'").count(), 1);
        assert!(fs.readdir("/submodule/lib").unwrap_err().is_not_found());
        assert!(fs.getattr("/submodule/lib/branch").unwrap_err().is_not_found());

        let gitlink = format!("/commit/{}/{}/lib", &head[..2], &head[2..]);
        let target = String::from_utf8(fs.readlink(&gitlink).unwrap()).unwrap();
        assert_eq!(target, format!("../../../submodule/lib/commit/33/{}", "3".repeat(38)));
    }
}
