//! In-memory object store for testing.

use chrono::DateTime;
use parking_lot::RwLock;
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::provider::{mode, CommitInfo, ObjectStore, RawTreeEntry, RefInfo, SubmoduleInfo};
use gitmount_common::{Error, ObjectId, Result};

/// Stored object.
#[derive(Debug, Clone)]
enum Object {
    Commit {
        tree: ObjectId,
        parents: Vec<ObjectId>,
        time: i64,
    },
    Tree(Vec<RawTreeEntry>),
    Blob(Vec<u8>),
}

/// File content to place into a commit built with [`MemoryStore::commit_files`].
#[derive(Debug, Clone)]
pub enum MemoryEntry<'a> {
    File(&'a [u8]),
    Executable(&'a [u8]),
    Symlink(&'a str),
    Gitlink(ObjectId),
}

/// Nested directory being assembled by `commit_files`.
#[derive(Default)]
struct DirBuilder<'a> {
    files: BTreeMap<String, MemoryEntry<'a>>,
    dirs: BTreeMap<String, DirBuilder<'a>>,
}

/// In-memory object store.
///
/// Objects are content-addressed with SHA-1 over a simple canonical
/// encoding, so ids look and behave like real object ids. All data is lost
/// on drop.
pub struct MemoryStore {
    name: String,
    objects: RwLock<HashMap<ObjectId, Object>>,
    refs: RwLock<Vec<(String, ObjectId)>>,
    submodules: RwLock<Vec<(SubmoduleInfo, Arc<dyn ObjectStore>)>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: RwLock::new(HashMap::new()),
            refs: RwLock::new(Vec::new()),
            submodules: RwLock::new(Vec::new()),
        }
    }

    fn hash(kind: &str, payload: &[u8]) -> ObjectId {
        let mut hasher = Sha1::new();
        hasher.update(format!("{} {}\0", kind, payload.len()).as_bytes());
        hasher.update(payload);
        let mut digest = [0u8; 20];
        digest.copy_from_slice(&hasher.finalize());
        ObjectId::from_bytes(&digest)
    }

    fn insert(&self, id: ObjectId, object: Object) -> ObjectId {
        self.objects.write().entry(id.clone()).or_insert(object);
        id
    }

    /// Store a blob.
    pub fn add_blob(&self, data: &[u8]) -> ObjectId {
        let id = Self::hash("blob", data);
        self.insert(id, Object::Blob(data.to_vec()))
    }

    /// Store a tree. Entries are sorted by name, as in a real tree object.
    pub fn add_tree(&self, mut entries: Vec<RawTreeEntry>) -> ObjectId {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let mut payload = Vec::new();
        for entry in &entries {
            payload.extend_from_slice(format!("{:o} {}\0{}\n", entry.mode, entry.name, entry.id).as_bytes());
        }
        let id = Self::hash("tree", &payload);
        self.insert(id, Object::Tree(entries))
    }

    /// Store a commit with the given root tree, parents and timestamp.
    pub fn add_commit(&self, tree: &ObjectId, parents: &[ObjectId], time: i64) -> ObjectId {
        let mut payload = format!("tree {}\n", tree);
        for parent in parents {
            payload.push_str(&format!("parent {}\n", parent));
        }
        payload.push_str(&format!("time {}\n", time));
        let id = Self::hash("commit", payload.as_bytes());
        self.insert(
            id,
            Object::Commit {
                tree: tree.clone(),
                parents: parents.to_vec(),
                time,
            },
        )
    }

    /// Build nested trees from slash-separated paths and commit them.
    pub fn commit_files(
        &self,
        files: &[(&str, MemoryEntry<'_>)],
        parents: &[ObjectId],
        time: i64,
    ) -> ObjectId {
        let mut root = DirBuilder::default();
        for (path, entry) in files {
            let mut components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
            let Some(leaf) = components.pop() else {
                continue;
            };
            let mut dir = &mut root;
            for component in components {
                dir = dir.dirs.entry(component.to_string()).or_default();
            }
            dir.files.insert(leaf.to_string(), entry.clone());
        }
        let tree = self.write_dir(root);
        self.add_commit(&tree, parents, time)
    }

    fn write_dir(&self, dir: DirBuilder<'_>) -> ObjectId {
        let mut entries = Vec::new();
        for (name, sub) in dir.dirs {
            entries.push(RawTreeEntry {
                name,
                mode: mode::TREE,
                id: self.write_dir(sub),
            });
        }
        for (name, entry) in dir.files {
            let (mode, id) = match entry {
                MemoryEntry::File(data) => (mode::BLOB, self.add_blob(data)),
                MemoryEntry::Executable(data) => (mode::BLOB_EXECUTABLE, self.add_blob(data)),
                MemoryEntry::Symlink(target) => (mode::LINK, self.add_blob(target.as_bytes())),
                MemoryEntry::Gitlink(commit) => (mode::COMMIT, commit),
            };
            entries.push(RawTreeEntry { name, mode, id });
        }
        self.add_tree(entries)
    }

    /// Create or move a ref. New refs are appended, keeping creation order.
    pub fn set_ref(&self, full_name: &str, target: &ObjectId) {
        let mut refs = self.refs.write();
        match refs.iter_mut().find(|(name, _)| name == full_name) {
            Some((_, existing)) => *existing = target.clone(),
            None => refs.push((full_name.to_string(), target.clone())),
        }
    }

    /// Delete a ref if present.
    pub fn remove_ref(&self, full_name: &str) {
        self.refs.write().retain(|(name, _)| name != full_name);
    }

    /// Declare a submodule backed by another store.
    pub fn add_submodule(&self, name: &str, path: &str, store: Arc<dyn ObjectStore>) {
        let info = SubmoduleInfo {
            name: name.to_string(),
            path: path.to_string(),
        };
        self.submodules.write().push((info, store));
    }

    fn get(&self, id: &ObjectId) -> Result<Object> {
        self.objects
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("object {} not found", id)))
    }
}

impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn refs(&self) -> Result<Vec<RefInfo>> {
        let refs = self.refs.read();
        let mut out = Vec::with_capacity(refs.len());
        for (full_name, target) in refs.iter() {
            // Like a real repository, refs must peel to a commit to be listed.
            if !matches!(self.get(target), Ok(Object::Commit { .. })) {
                continue;
            }
            if let Some(info) = RefInfo::from_full_name(full_name, target.clone()) {
                out.push(info);
            }
        }
        Ok(out)
    }

    fn find_commit(&self, id: &ObjectId) -> Result<CommitInfo> {
        match self.get(id)? {
            Object::Commit {
                tree,
                parents,
                time,
            } => Ok(CommitInfo {
                id: id.clone(),
                tree,
                parents,
                time: DateTime::from_timestamp(time, 0).ok_or_else(|| {
                    Error::ObjectStore(format!("commit {} has invalid time {}", id, time))
                })?,
            }),
            _ => Err(Error::NotFound(format!("{} is not a commit", id))),
        }
    }

    fn find_tree(&self, id: &ObjectId) -> Result<Vec<RawTreeEntry>> {
        match self.get(id)? {
            Object::Tree(entries) => Ok(entries),
            _ => Err(Error::NotFound(format!("{} is not a tree", id))),
        }
    }

    fn find_blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
        match self.get(id)? {
            Object::Blob(data) => Ok(data),
            _ => Err(Error::NotFound(format!("{} is not a blob", id))),
        }
    }

    fn submodules(&self) -> Result<Vec<SubmoduleInfo>> {
        Ok(self
            .submodules
            .read()
            .iter()
            .map(|(info, _)| info.clone())
            .collect())
    }

    fn open_submodule(&self, info: &SubmoduleInfo) -> Result<Arc<dyn ObjectStore>> {
        self.submodules
            .read()
            .iter()
            .find(|(candidate, _)| candidate.name == info.name)
            .map(|(_, store)| store.clone())
            .ok_or_else(|| Error::NotFound(format!("submodule '{}' not found", info.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_roundtrip() {
        let store = MemoryStore::new("test");
        let id = store.add_blob(b"Hello, World!");

        assert_eq!(store.find_blob(&id).unwrap(), b"Hello, World!");
        assert_eq!(store.blob_size(&id).unwrap(), 13);
    }

    #[test]
    fn test_content_addressing_is_stable() {
        let store = MemoryStore::new("test");
        assert_eq!(store.add_blob(b"same"), store.add_blob(b"same"));
        assert_ne!(store.add_blob(b"same"), store.add_blob(b"other"));
    }

    #[test]
    fn test_commit_files_builds_nested_trees() {
        let store = MemoryStore::new("test");
        let commit = store.commit_files(
            &[
                ("README", MemoryEntry::File(b"readme")),
                ("src/main.rs", MemoryEntry::File(b"fn main() {}")),
                ("bin/run", MemoryEntry::Executable(b"#!/bin/sh")),
            ],
            &[],
            1_700_000_000,
        );

        let info = store.find_commit(&commit).unwrap();
        let root = store.find_tree(&info.tree).unwrap();
        let names: Vec<_> = root.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["README", "bin", "src"]);

        let bin = root.iter().find(|e| e.name == "bin").unwrap();
        assert_eq!(bin.mode, mode::TREE);
        let run = &store.find_tree(&bin.id).unwrap()[0];
        assert_eq!(run.mode, mode::BLOB_EXECUTABLE);
    }

    #[test]
    fn test_wrong_object_type_is_not_found() {
        let store = MemoryStore::new("test");
        let blob = store.add_blob(b"data");

        assert!(store.find_commit(&blob).unwrap_err().is_not_found());
        assert!(store.find_tree(&blob).unwrap_err().is_not_found());
    }

    #[test]
    fn test_refs_keep_order_and_move() {
        let store = MemoryStore::new("test");
        let first = store.commit_files(&[("a", MemoryEntry::File(b"1"))], &[], 1);
        let second = store.commit_files(&[("a", MemoryEntry::File(b"2"))], &[first.clone()], 2);

        store.set_ref("refs/heads/main", &first);
        store.set_ref("refs/tags/v1", &first);
        store.set_ref("refs/heads/main", &second);

        let refs = store.refs().unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].full_name, "refs/heads/main");
        assert_eq!(refs[0].target, second);

        store.remove_ref("refs/tags/v1");
        assert_eq!(store.refs().unwrap().len(), 1);
    }

    #[test]
    fn test_refs_skip_non_commits_and_stash() {
        let store = MemoryStore::new("test");
        let blob = store.add_blob(b"not a commit");
        let commit = store.commit_files(&[("a", MemoryEntry::File(b"1"))], &[], 1);
        store.set_ref("refs/tags/blob", &blob);
        store.set_ref("refs/stash", &commit);

        assert!(store.refs().unwrap().is_empty());
    }

    #[test]
    fn test_submodules() {
        let store = MemoryStore::new("parent");
        let child: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new("child"));
        store.add_submodule("lib", "vendor/lib", child);

        let subs = store.submodules().unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].path, "vendor/lib");
        assert_eq!(store.open_submodule(&subs[0]).unwrap().name(), "child");
    }
}
