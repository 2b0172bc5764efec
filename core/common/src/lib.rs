//! Common utilities and types shared across gitmount modules.
//!
//! This module provides the foundational types (object ids, shards, ref
//! kinds) and the error taxonomy used by every layer of the filesystem.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{flatten_ref_name, ObjectId, RefKind, Shard, SHARD_COUNT};
