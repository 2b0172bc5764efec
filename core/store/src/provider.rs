//! Object store trait definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use gitmount_common::{ObjectId, RefKind, Result};

/// Raw file mode bits as recorded in tree objects.
pub mod mode {
    pub const TREE: u32 = 0o040000;
    pub const BLOB: u32 = 0o100644;
    pub const BLOB_EXECUTABLE: u32 = 0o100755;
    pub const LINK: u32 = 0o120000;
    pub const COMMIT: u32 = 0o160000;
}

/// A branch, tag or remote-tracking ref, peeled to the commit it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefInfo {
    /// Fully-qualified name, e.g. `refs/heads/main`.
    pub full_name: String,
    /// Namespace of the ref.
    pub kind: RefKind,
    /// Name without the namespace prefix, e.g. `main` or `origin/main`.
    pub short_name: String,
    /// Commit the ref currently points at.
    pub target: ObjectId,
}

impl RefInfo {
    /// Build a ref entry from its fully-qualified name.
    ///
    /// Returns `None` for refs outside the exposed namespaces.
    pub fn from_full_name(full_name: &str, target: ObjectId) -> Option<Self> {
        let (kind, short) = RefKind::split_full_name(full_name)?;
        Some(Self {
            full_name: full_name.to_string(),
            kind,
            short_name: short.to_string(),
            target,
        })
    }
}

/// Parsed commit object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub id: ObjectId,
    /// Root tree of the snapshot.
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    /// Committer timestamp.
    pub time: DateTime<Utc>,
}

/// One entry of a tree object, exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTreeEntry {
    pub name: String,
    pub mode: u32,
    pub id: ObjectId,
}

/// A submodule declared by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmoduleInfo {
    /// Logical name from the submodule configuration.
    pub name: String,
    /// Location of the gitlink inside the parent's tree.
    pub path: String,
}

/// Read-only access to a repository's object graph.
///
/// Implementations must be safe to call from many threads at once. Objects
/// are immutable, so no ordering is required between concurrent reads; ref
/// reads may observe different states across calls.
pub trait ObjectStore: Send + Sync {
    /// Get the store name (used in log output).
    fn name(&self) -> &str;

    /// List branch, tag and remote-tracking refs in the store's native order.
    ///
    /// Refs that do not peel to a commit are skipped.
    fn refs(&self) -> Result<Vec<RefInfo>>;

    /// Parse a commit object.
    ///
    /// # Errors
    /// - `NotFound` if `id` is absent or is not a commit
    fn find_commit(&self, id: &ObjectId) -> Result<CommitInfo>;

    /// Read the entries of a tree object.
    ///
    /// # Errors
    /// - `NotFound` if `id` is absent or is not a tree
    fn find_tree(&self, id: &ObjectId) -> Result<Vec<RawTreeEntry>>;

    /// Read the full contents of a blob.
    ///
    /// # Errors
    /// - `NotFound` if `id` is absent or is not a blob
    fn find_blob(&self, id: &ObjectId) -> Result<Vec<u8>>;

    /// Size of a blob in bytes.
    fn blob_size(&self, id: &ObjectId) -> Result<u64> {
        Ok(self.find_blob(id)?.len() as u64)
    }

    /// List submodules declared by the repository.
    fn submodules(&self) -> Result<Vec<SubmoduleInfo>>;

    /// Open the object store of a declared submodule.
    ///
    /// # Errors
    /// - `NotFound` if the submodule is not checked out locally
    fn open_submodule(&self, info: &SubmoduleInfo) -> Result<Arc<dyn ObjectStore>>;
}
