//! Common types used throughout gitmount.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of distinct shard values (two hex characters).
pub const SHARD_COUNT: usize = 256;

/// Length of a hex-encoded object id.
const OID_HEX_LEN: usize = 40;

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// A 40-character lowercase hex object id (commit, tree or blob).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse a hex object id.
    ///
    /// # Errors
    /// - Returns error unless `hex` is exactly 40 lowercase hex characters
    pub fn parse(hex: impl Into<String>) -> crate::Result<Self> {
        let hex = hex.into();
        if hex.len() != OID_HEX_LEN || !is_lower_hex(&hex) {
            return Err(crate::Error::InvalidInput(format!(
                "'{}' is not a 40 character lowercase hex object id",
                hex
            )));
        }
        Ok(Self(hex))
    }

    /// Hex-encode a raw 20-byte digest.
    pub fn from_bytes(bytes: &[u8; 20]) -> Self {
        Self(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// Rebuild an id from its shard and the remaining 38 characters.
    pub fn from_parts(shard: &Shard, rest: &str) -> crate::Result<Self> {
        Self::parse(format!("{}{}", shard.as_str(), rest))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first two hex characters.
    pub fn shard(&self) -> Shard {
        Shard(self.0[..2].to_string())
    }

    /// The 38 hex characters following the shard.
    pub fn rest(&self) -> &str {
        &self.0[2..]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The first two lowercase hex characters of an object id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Shard(String);

impl Shard {
    /// Parse a shard value.
    ///
    /// # Errors
    /// - Returns error unless `hex` matches `[a-f0-9]{2}`
    pub fn parse(hex: impl Into<String>) -> crate::Result<Self> {
        let hex = hex.into();
        if hex.len() != 2 || !is_lower_hex(&hex) {
            return Err(crate::Error::InvalidInput(format!(
                "'{}' is not a shard",
                hex
            )));
        }
        Ok(Self(hex))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `id` falls into this shard.
    pub fn contains(&self, id: &ObjectId) -> bool {
        id.as_str().starts_with(&self.0)
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Namespaces of refs that are exposed in the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefKind {
    Branch,
    Tag,
    Remote,
}

impl RefKind {
    /// All exposed kinds, in listing order.
    pub const ALL: [RefKind; 3] = [RefKind::Branch, RefKind::Tag, RefKind::Remote];

    /// Fully-qualified ref prefix for this namespace.
    pub fn prefix(&self) -> &'static str {
        match self {
            RefKind::Branch => "refs/heads/",
            RefKind::Tag => "refs/tags/",
            RefKind::Remote => "refs/remotes/",
        }
    }

    /// Top-level directory holding refs of this kind.
    pub fn dir_name(&self) -> &'static str {
        match self {
            RefKind::Branch => "branch",
            RefKind::Tag => "tag",
            RefKind::Remote => "remote",
        }
    }

    /// Classify a fully-qualified ref name, returning the kind and short name.
    ///
    /// Refs outside the branch/tag/remote namespaces (stash, notes, ...)
    /// yield `None`.
    pub fn split_full_name(full: &str) -> Option<(RefKind, &str)> {
        Self::ALL.iter().find_map(|kind| {
            full.strip_prefix(kind.prefix())
                .filter(|short| !short.is_empty())
                .map(|short| (*kind, short))
        })
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// Substitute path separators so a ref or submodule name fits one path segment.
pub fn flatten_ref_name(name: &str) -> String {
    name.replace('/', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HEAD: &str = "abcdef0123456789abcdef0123456789abcdef01";

    #[test]
    fn test_object_id_parse() {
        let id = ObjectId::parse(HEAD).unwrap();
        assert_eq!(id.shard().as_str(), "ab");
        assert_eq!(id.rest(), "cdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn test_object_id_rejects_uppercase_and_length() {
        assert!(ObjectId::parse(HEAD.to_uppercase()).is_err());
        assert!(ObjectId::parse(&HEAD[..39]).is_err());
        assert!(ObjectId::parse(format!("{}0", HEAD)).is_err());
    }

    #[test]
    fn test_from_bytes() {
        let mut bytes = [0u8; 20];
        bytes[0] = 0xab;
        bytes[19] = 0x01;
        let id = ObjectId::from_bytes(&bytes);
        assert_eq!(id.as_str(), "ab00000000000000000000000000000000000001");
    }

    #[test]
    fn test_from_parts() {
        let id = ObjectId::parse(HEAD).unwrap();
        let rebuilt = ObjectId::from_parts(&id.shard(), id.rest()).unwrap();
        assert_eq!(rebuilt, id);
    }

    #[test]
    fn test_shard_parse() {
        assert!(Shard::parse("0f").is_ok());
        assert!(Shard::parse("0F").is_err());
        assert!(Shard::parse("zz").is_err());
        assert!(Shard::parse("abc").is_err());
    }

    #[test]
    fn test_split_full_name() {
        assert_eq!(
            RefKind::split_full_name("refs/heads/feature/x"),
            Some((RefKind::Branch, "feature/x"))
        );
        assert_eq!(
            RefKind::split_full_name("refs/remotes/origin/main"),
            Some((RefKind::Remote, "origin/main"))
        );
        assert_eq!(RefKind::split_full_name("refs/stash"), None);
        assert_eq!(RefKind::split_full_name("refs/heads/"), None);
    }

    #[test]
    fn test_flatten_ref_name() {
        assert_eq!(flatten_ref_name("feature/x"), "feature_x");
        assert_eq!(flatten_ref_name("main"), "main");
    }

    proptest! {
        #[test]
        fn prop_shard_of_parsed_id_contains_it(hex in "[a-f0-9]{40}") {
            let id = ObjectId::parse(hex.clone()).unwrap();
            prop_assert!(id.shard().contains(&id));
            prop_assert_eq!(format!("{}{}", id.shard(), id.rest()), hex);
        }
    }
}
