//! Path grammar for the virtual filesystem.
//!
//! Every incoming path is classified into a [`VirtualPath`] before anything
//! touches the repository. Classification is purely syntactic: a commit
//! directory classifies the same whether or not the commit exists.

use gitmount_common::{ObjectId, RefKind, Shard};

use crate::config::DEFAULT_HIDDEN_MARKER;

/// Entries of the filesystem root, in listing order.
pub const TOP_LEVEL: [&str; 5] = ["commit", "branch", "tag", "remote", "submodule"];

/// Classified form of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualPath {
    Root,
    /// `/commit`
    CommitRoot,
    /// `/commit/xx`
    CommitShard(Shard),
    /// `/commit/xx/yyyy…`
    CommitDir(ObjectId),
    /// `/commit/xx/yyyy…/sub/path`
    CommitSubPath { commit: ObjectId, subpath: String },
    BranchRoot,
    BranchDir(String),
    TagRoot,
    TagDir(String),
    RemoteRoot,
    RemoteDir(String),
    SubmoduleRoot,
    SubmoduleName(String),
    /// A path inside a submodule, classified against the submodule's own layout.
    SubmodulePath { name: String, rest: Box<VirtualPath> },
    Unknown,
}

impl VirtualPath {
    /// The ref namespace and name for branch, tag and remote links.
    pub fn ref_link(&self) -> Option<(RefKind, &str)> {
        match self {
            VirtualPath::BranchDir(name) => Some((RefKind::Branch, name)),
            VirtualPath::TagDir(name) => Some((RefKind::Tag, name)),
            VirtualPath::RemoteDir(name) => Some((RefKind::Remote, name)),
            _ => None,
        }
    }
}

/// Classifies path strings, treating a configurable marker name as hidden.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    hidden_marker: String,
}

impl Default for PathClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_HIDDEN_MARKER)
    }
}

impl PathClassifier {
    pub fn new(hidden_marker: impl Into<String>) -> Self {
        Self {
            hidden_marker: hidden_marker.into(),
        }
    }

    /// Classify `path`. Never fails; unrecognized paths are `Unknown`.
    pub fn classify(&self, path: &str) -> VirtualPath {
        match path {
            "/" => return VirtualPath::Root,
            "/commit" => return VirtualPath::CommitRoot,
            "/branch" => return VirtualPath::BranchRoot,
            "/tag" => return VirtualPath::TagRoot,
            "/remote" => return VirtualPath::RemoteRoot,
            "/submodule" => return VirtualPath::SubmoduleRoot,
            _ => {}
        }

        let Some((head, tail)) = path.strip_prefix('/').and_then(|p| p.split_once('/')) else {
            return VirtualPath::Unknown;
        };

        match head {
            "commit" => self.classify_commit(tail),
            "branch" => self.segment(tail).map_or(VirtualPath::Unknown, |n| VirtualPath::BranchDir(n.to_string())),
            "tag" => self.segment(tail).map_or(VirtualPath::Unknown, |n| VirtualPath::TagDir(n.to_string())),
            "remote" => self.segment(tail).map_or(VirtualPath::Unknown, |n| VirtualPath::RemoteDir(n.to_string())),
            "submodule" => self.classify_submodule(tail),
            _ => VirtualPath::Unknown,
        }
    }

    /// `tail` is everything after `/commit/`.
    fn classify_commit(&self, tail: &str) -> VirtualPath {
        let Some(shard) = tail.get(..2).and_then(|s| Shard::parse(s).ok()) else {
            return VirtualPath::Unknown;
        };
        if tail.len() == 2 {
            return VirtualPath::CommitShard(shard);
        }

        let bytes = tail.as_bytes();
        if bytes[2] != b'/' {
            return VirtualPath::Unknown;
        }
        let Some(commit) = tail
            .get(3..41)
            .and_then(|rest| ObjectId::from_parts(&shard, rest).ok())
        else {
            return VirtualPath::Unknown;
        };
        if tail.len() == 41 {
            return VirtualPath::CommitDir(commit);
        }

        if bytes[41] != b'/' {
            return VirtualPath::Unknown;
        }
        let subpath = &tail[42..];
        if subpath.is_empty() || self.is_hidden(subpath) {
            return VirtualPath::Unknown;
        }
        VirtualPath::CommitSubPath {
            commit,
            subpath: subpath.to_string(),
        }
    }

    /// `tail` is everything after `/submodule/`.
    fn classify_submodule(&self, tail: &str) -> VirtualPath {
        let (name, rest) = match tail.split_once('/') {
            Some((name, rest)) => (name, rest),
            None => (tail, ""),
        };
        let Some(name) = self.segment(name) else {
            return VirtualPath::Unknown;
        };
        if rest.is_empty() {
            return VirtualPath::SubmoduleName(name.to_string());
        }

        match self.classify(&format!("/{}", rest)) {
            VirtualPath::Unknown => VirtualPath::Unknown,
            inner => VirtualPath::SubmodulePath {
                name: name.to_string(),
                rest: Box::new(inner),
            },
        }
    }

    /// A single non-empty, non-hidden path segment.
    fn segment<'a>(&self, name: &'a str) -> Option<&'a str> {
        if name.is_empty() || name.contains('/') || name == self.hidden_marker {
            None
        } else {
            Some(name)
        }
    }

    fn is_hidden(&self, subpath: &str) -> bool {
        subpath.rsplit('/').next() == Some(self.hidden_marker.as_str())
    }
}

/// Classify with the default hidden marker.
pub fn classify(path: &str) -> VirtualPath {
    PathClassifier::default().classify(path)
}
