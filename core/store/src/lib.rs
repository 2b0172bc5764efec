//! Repository object store abstraction for gitmount.
//!
//! This module provides a trait-based interface over a repository's object
//! graph (refs, commits, trees, blobs, submodules) and two implementations:
//! a git2-backed store for real repositories and an in-memory store for
//! tests and development.
//!
//! # Design Principles
//! - Read-only: nothing here ever writes to a repository
//! - Thread-safe: every store is `Send + Sync` and serves concurrent callers
//! - Unified error semantics: absent objects are `NotFound`, everything else
//!   is an object store failure

pub mod git;
pub mod memory;
pub mod provider;

pub use git::GitStore;
pub use memory::{MemoryEntry, MemoryStore};
pub use provider::{mode, CommitInfo, ObjectStore, RawTreeEntry, RefInfo, SubmoduleInfo};
