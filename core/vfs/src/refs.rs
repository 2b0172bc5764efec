//! Enumeration of refs and of every commit reachable from them.

use std::collections::{BTreeSet, HashSet};
use std::ops::ControlFlow;

use tracing::{debug, warn};

use gitmount_common::{flatten_ref_name, Error, ObjectId, RefKind, Result, Shard, SHARD_COUNT};
use gitmount_store::{ObjectStore, RefInfo};

/// Lists refs of one store and walks commit history from their tips.
///
/// Nothing is cached: every call observes the store's current ref state.
pub struct RefEnumerator<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> RefEnumerator<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Exposed names of refs of `kind`, in the store's native order.
    ///
    /// Names are flattened to a single path segment. When two refs flatten
    /// to the same name the first one wins.
    pub fn list(&self, kind: RefKind) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let names = self
            .store
            .refs()?
            .into_iter()
            .filter(|info| info.kind == kind)
            .map(|info| flatten_ref_name(&info.short_name))
            .filter(|name| seen.insert(name.clone()))
            .collect();
        Ok(names)
    }

    pub fn list_branches(&self) -> Result<Vec<String>> {
        self.list(RefKind::Branch)
    }

    pub fn list_tags(&self) -> Result<Vec<String>> {
        self.list(RefKind::Tag)
    }

    pub fn list_remotes(&self) -> Result<Vec<String>> {
        self.list(RefKind::Remote)
    }

    /// Commit currently named by the ref `name` of `kind`.
    ///
    /// `name` may be the exposed short name (`feature_x`) or the flattened
    /// fully-qualified name (`refs_heads_feature_x`).
    ///
    /// # Errors
    /// - `NotFound` if no such ref exists
    pub fn head_commit(&self, kind: RefKind, name: &str) -> Result<ObjectId> {
        self.store
            .refs()?
            .into_iter()
            .filter(|info| info.kind == kind)
            .find(|info| matches_exposed_name(info, name))
            .map(|info| info.target)
            .ok_or_else(|| Error::NotFound(format!("{} '{}' not found", kind, name)))
    }

    /// Shards that contain at least one reachable commit.
    pub fn all_commit_shards(&self) -> Result<BTreeSet<Shard>> {
        let mut shards = BTreeSet::new();
        self.walk(|id| {
            shards.insert(id.shard());
            if shards.len() == SHARD_COUNT {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;
        Ok(shards)
    }

    /// Reachable commits, restricted to `shard` when given.
    pub fn commits_in_shard(&self, shard: Option<&Shard>) -> Result<BTreeSet<ObjectId>> {
        let mut commits = BTreeSet::new();
        self.walk(|id| {
            if shard.map_or(true, |s| s.contains(id)) {
                commits.insert(id.clone());
            }
            ControlFlow::Continue(())
        })?;
        Ok(commits)
    }

    /// Visit every commit reachable from any exposed ref exactly once.
    ///
    /// A ref whose tip was already reached from an earlier ref is not walked
    /// again. Parents missing from the store (shallow history) end the walk
    /// along that line.
    fn walk(&self, mut visit: impl FnMut(&ObjectId) -> ControlFlow<()>) -> Result<()> {
        let mut visited: HashSet<ObjectId> = HashSet::new();

        for info in self.store.refs()? {
            if visited.contains(&info.target) {
                debug!(r#ref = %info.full_name, "tip already visited, skipping walk");
                continue;
            }

            let mut pending = vec![info.target];
            while let Some(id) = pending.pop() {
                if !visited.insert(id.clone()) {
                    continue;
                }

                let commit = match self.store.find_commit(&id) {
                    Ok(commit) => commit,
                    Err(e) if e.is_not_found() => {
                        warn!(commit = %id, store = self.store.name(), "commit missing from history walk");
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                if visit(&id).is_break() {
                    return Ok(());
                }

                pending.extend(
                    commit
                        .parents
                        .into_iter()
                        .filter(|parent| !visited.contains(parent)),
                );
            }
        }

        Ok(())
    }
}

fn matches_exposed_name(info: &RefInfo, name: &str) -> bool {
    info.short_name == name
        || flatten_ref_name(&info.short_name) == name
        || flatten_ref_name(&info.full_name) == name
}
