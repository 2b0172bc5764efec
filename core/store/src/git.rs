//! git2-backed object store.

use chrono::DateTime;
use git2::{ErrorCode, Oid, Repository};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::provider::{CommitInfo, ObjectStore, RawTreeEntry, RefInfo, SubmoduleInfo};
use gitmount_common::{Error, ObjectId, Result};

/// Idle repository handles kept around for reuse.
const MAX_IDLE_HANDLES: usize = 16;

fn map_git(err: git2::Error) -> Error {
    match err.code() {
        ErrorCode::NotFound => Error::NotFound(err.message().to_string()),
        _ => Error::ObjectStore(err.message().to_string()),
    }
}

fn to_oid(id: &ObjectId) -> Result<Oid> {
    Oid::from_str(id.as_str()).map_err(map_git)
}

fn from_oid(oid: Oid) -> Result<ObjectId> {
    ObjectId::parse(oid.to_string())
}

/// Object store over an on-disk git repository.
///
/// `git2::Repository` is `Send` but not `Sync`, so the store keeps a pool of
/// handles opened on the same repository. Each call checks one out, and the
/// pool lock is never held while objects are being read.
pub struct GitStore {
    name: String,
    git_dir: PathBuf,
    pool: Mutex<Vec<Repository>>,
}

impl GitStore {
    /// Open the repository containing `path`.
    ///
    /// # Errors
    /// - `NotFound` if no repository exists at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|e| map_git(e).context(path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_repository(name, repo))
    }

    /// Wrap an already opened repository.
    pub fn from_repository(name: impl Into<String>, repo: Repository) -> Self {
        let git_dir = repo.path().to_path_buf();
        Self {
            name: name.into(),
            git_dir,
            pool: Mutex::new(vec![repo]),
        }
    }

    /// Path of the repository's git directory.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn with_repo<T>(&self, f: impl FnOnce(&Repository) -> Result<T>) -> Result<T> {
        let idle = self.pool.lock().pop();
        let repo = match idle {
            Some(repo) => repo,
            None => {
                debug!(store = %self.name, "opening additional repository handle");
                Repository::open(&self.git_dir).map_err(map_git)?
            }
        };

        let result = f(&repo);

        let mut pool = self.pool.lock();
        if pool.len() < MAX_IDLE_HANDLES {
            pool.push(repo);
        }
        result
    }
}

impl ObjectStore for GitStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn refs(&self) -> Result<Vec<RefInfo>> {
        self.with_repo(|repo| {
            let mut refs = Vec::new();
            for reference in repo.references().map_err(map_git)? {
                let reference = reference.map_err(map_git)?;
                let Some(full_name) = reference.name() else {
                    continue;
                };
                if gitmount_common::RefKind::split_full_name(full_name).is_none() {
                    continue;
                }
                let commit = match reference.peel_to_commit() {
                    Ok(commit) => commit,
                    Err(e) => {
                        warn!(store = %self.name, reference = full_name, "skipping ref: {}", e);
                        continue;
                    }
                };
                if let Some(info) = RefInfo::from_full_name(full_name, from_oid(commit.id())?) {
                    refs.push(info);
                }
            }
            Ok(refs)
        })
    }

    fn find_commit(&self, id: &ObjectId) -> Result<CommitInfo> {
        self.with_repo(|repo| {
            let commit = repo.find_commit(to_oid(id)?).map_err(map_git)?;
            let seconds = commit.time().seconds();
            let time = DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
                Error::ObjectStore(format!("commit {} has invalid time {}", id, seconds))
            })?;
            let parents = commit
                .parent_ids()
                .map(from_oid)
                .collect::<Result<Vec<_>>>()?;

            Ok(CommitInfo {
                id: id.clone(),
                tree: from_oid(commit.tree_id())?,
                parents,
                time,
            })
        })
    }

    fn find_tree(&self, id: &ObjectId) -> Result<Vec<RawTreeEntry>> {
        self.with_repo(|repo| {
            let tree = repo.find_tree(to_oid(id)?).map_err(map_git)?;
            tree.iter()
                .map(|entry| {
                    Ok(RawTreeEntry {
                        name: String::from_utf8_lossy(entry.name_bytes()).into_owned(),
                        mode: entry.filemode() as u32,
                        id: from_oid(entry.id())?,
                    })
                })
                .collect()
        })
    }

    fn find_blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
        self.with_repo(|repo| {
            let blob = repo.find_blob(to_oid(id)?).map_err(map_git)?;
            Ok(blob.content().to_vec())
        })
    }

    fn blob_size(&self, id: &ObjectId) -> Result<u64> {
        self.with_repo(|repo| {
            let odb = repo.odb().map_err(map_git)?;
            let (size, kind) = odb.read_header(to_oid(id)?).map_err(map_git)?;
            if kind != git2::ObjectType::Blob {
                return Err(Error::NotFound(format!("{} is not a blob", id)));
            }
            Ok(size as u64)
        })
    }

    fn submodules(&self) -> Result<Vec<SubmoduleInfo>> {
        self.with_repo(|repo| {
            let submodules = repo.submodules().map_err(map_git)?;
            Ok(submodules
                .iter()
                .map(|sm| {
                    let path = sm.path().to_string_lossy().into_owned();
                    SubmoduleInfo {
                        name: sm.name().map(str::to_string).unwrap_or_else(|| path.clone()),
                        path,
                    }
                })
                .collect())
        })
    }

    fn open_submodule(&self, info: &SubmoduleInfo) -> Result<Arc<dyn ObjectStore>> {
        self.with_repo(|repo| {
            let submodule = repo.find_submodule(&info.name).map_err(map_git)?;
            let checked_out = repo
                .workdir()
                .is_some_and(|workdir| workdir.join(submodule.path()).join(".git").exists());
            if !checked_out {
                return Err(Error::NotFound(format!(
                    "'{}' is not checked out",
                    submodule.path().display()
                )));
            }
            let sub_repo = submodule.open().map_err(map_git)?;
            let store: Arc<dyn ObjectStore> =
                Arc::new(GitStore::from_repository(info.name.clone(), sub_repo));
            Ok(store)
        })
    }
}
