//! Lazily opened submodule stores.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use gitmount_common::{flatten_ref_name, Error, ObjectId, Result};
use gitmount_store::{ObjectStore, SubmoduleInfo};

/// An object store together with the submodule stores opened beneath it.
///
/// Each submodule is opened at most once, on first access, and shared by
/// every later operation. Nodes nest: a submodule's own submodules hang off
/// its node.
pub struct StoreNode {
    store: Arc<dyn ObjectStore>,
    /// Mount-relative prefix of this node, e.g. `submodule/lib/`.
    scope: String,
    children: DashMap<String, Arc<OnceCell<Arc<StoreNode>>>>,
}

impl StoreNode {
    /// Node for the mounted repository itself.
    pub fn root(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_scope(store, String::new())
    }

    fn with_scope(store: Arc<dyn ObjectStore>, scope: String) -> Self {
        Self {
            store,
            scope,
            children: DashMap::new(),
        }
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Exposed names of declared submodules, in declaration order.
    pub fn submodule_names(&self) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        Ok(self
            .store
            .submodules()?
            .iter()
            .map(|info| flatten_ref_name(&info.name))
            .filter(|name| seen.insert(name.clone()))
            .collect())
    }

    /// Declaration of the submodule exposed as `name`.
    ///
    /// # Errors
    /// - `NotFound` if no submodule has that name
    pub fn find_submodule(&self, name: &str) -> Result<SubmoduleInfo> {
        self.store
            .submodules()?
            .into_iter()
            .find(|info| info.name == name || flatten_ref_name(&info.name) == name)
            .ok_or_else(|| Error::NotFound(format!("submodule '{}' not found", name)))
    }

    /// Node for the submodule exposed as `name`, opening it on first use.
    ///
    /// Concurrent first accesses open the store once; the others wait for
    /// that result. A failed open is retried by the next caller.
    pub fn submodule(&self, name: &str) -> Result<Arc<StoreNode>> {
        if let Some(cell) = self.children.get(name) {
            if let Some(node) = cell.get() {
                return Ok(Arc::clone(node));
            }
        }

        let info = self.find_submodule(name)?;
        let exposed = flatten_ref_name(&info.name);
        let cell = Arc::clone(&*self.children.entry(exposed.clone()).or_default());
        let node = cell.get_or_try_init(|| {
            info!(
                parent = self.store.name(),
                submodule = %info.name,
                path = %info.path,
                "opening submodule"
            );
            let store = self
                .store
                .open_submodule(&info)
                .map_err(|e| e.context(format!("submodule '{}'", info.name)))?;
            let scope = format!("{}submodule/{}/", self.scope, exposed);
            Ok::<_, Error>(Arc::new(StoreNode::with_scope(store, scope)))
        })?;
        Ok(Arc::clone(node))
    }

    /// Exposed name of the submodule that a gitlink at `path` refers to.
    ///
    /// Matches the declared path first. Failing that, the first opened
    /// submodule whose store contains `target` is used.
    ///
    /// # Errors
    /// - `NotFound` if no declared submodule matches
    pub fn submodule_for_gitlink(&self, path: &str, target: &ObjectId) -> Result<String> {
        let declared = self.store.submodules()?;
        let path = path.trim_matches('/');

        if let Some(info) = declared.iter().find(|info| info.path.trim_matches('/') == path) {
            return Ok(flatten_ref_name(&info.name));
        }

        for info in &declared {
            let name = flatten_ref_name(&info.name);
            let node = match self.submodule(&name) {
                Ok(node) => node,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            match node.store().find_commit(target) {
                Ok(_) => {
                    debug!(path, submodule = %name, "matched gitlink by target commit");
                    return Ok(name);
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }

        Err(Error::NotFound(format!(
            "no submodule declared for gitlink '{}'",
            path
        )))
    }
}
