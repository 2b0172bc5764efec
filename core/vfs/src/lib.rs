//! Virtual filesystem over a repository's history.
//!
//! This crate provides:
//! - Classification of mount-relative paths
//! - Commit and tree resolution against an [`ObjectStore`](gitmount_store::ObjectStore)
//! - Ref and reachable-commit enumeration
//! - A bounded, single-flight cache of ref link targets
//! - Lazily opened submodule stores
//!
//! # Layout
//! ```text
//! /commit/<shard>/<rest>/...   snapshot of every reachable commit
//! /branch/<name>               link to ../commit/<shard>/<rest>
//! /tag/<name>                  link to ../commit/<shard>/<rest>
//! /remote/<name>               link to ../commit/<shard>/<rest>
//! /submodule/<name>/...        the same layout for each submodule
//! ```
//!
//! [`GitFs`] is the entry point used by the FUSE adapter and the CLI.

pub mod config;
pub mod dispatcher;
pub mod link_cache;
pub mod path;
pub mod refs;
pub mod resolver;
pub mod submodule;

pub use config::FsConfig;
pub use dispatcher::{Attributes, GitFs};
pub use link_cache::{link_target, LinkCache, LinkCacheStats};
pub use path::{classify, PathClassifier, VirtualPath, TOP_LEVEL};
pub use refs::RefEnumerator;
pub use resolver::{DirEntry, NodeKind, Resolver, TreeEntry};
pub use submodule::StoreNode;
