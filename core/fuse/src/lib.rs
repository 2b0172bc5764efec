//! FUSE filesystem adapter for gitmount.
//!
//! This module provides FUSE mount support for Linux and macOS, exposing a
//! repository's history as a read-only filesystem.
//!
//! # Architecture
//! The kernel speaks in inodes; [`gitmount_core::GitFs`] speaks in paths.
//! The adapter keeps the inode/path table and maps errors onto errno values.
//!
//! # Feature Flags
//! - `fuse`: Enable FUSE support (requires libfuse3-dev on Linux or macFUSE on macOS)

pub mod inode;

#[cfg(feature = "fuse")]
pub mod filesystem;

#[cfg(feature = "fuse")]
pub mod mount;

#[cfg(feature = "fuse")]
pub use filesystem::{error_to_errno, GitFilesystem};

#[cfg(feature = "fuse")]
pub use mount::{fuse_info, is_fuse_available, mount, MountHandle, MountOptions};

pub use inode::{InodeTable, ROOT_INODE};

/// Stub module for when FUSE is not available.
#[cfg(not(feature = "fuse"))]
pub mod mount {
    use gitmount_common::{Error, Result};
    use gitmount_core::GitFs;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    /// Mount options placeholder.
    #[derive(Debug, Clone, Default)]
    pub struct MountOptions {
        pub allow_other: bool,
        pub auto_unmount: bool,
        pub default_permissions: bool,
    }

    /// Mount handle placeholder.
    pub struct MountHandle {
        mount_point: PathBuf,
    }

    impl MountHandle {
        pub fn mount_point(&self) -> &Path {
            &self.mount_point
        }

        pub fn unmount(self) {
            drop(self);
        }
    }

    /// Check if FUSE is available (always false without feature).
    pub fn is_fuse_available() -> bool {
        false
    }

    /// Get FUSE info message.
    pub fn fuse_info() -> String {
        "FUSE support not compiled in. Rebuild with --features fuse".to_string()
    }

    /// Mount stub - always returns error.
    pub fn mount<P: AsRef<Path>>(
        _fs: Arc<GitFs>,
        _mount_point: P,
        _options: MountOptions,
    ) -> Result<MountHandle> {
        Err(Error::NotPermitted(
            "FUSE support not compiled. Rebuild with --features fuse".to_string(),
        ))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_stub_reports_unavailable() {
            assert!(!is_fuse_available());
            let store = Arc::new(gitmount_store::MemoryStore::new("test"));
            let fs = Arc::new(GitFs::new(store, Default::default()).unwrap());
            assert!(mount(fs, "/tmp", MountOptions::default()).is_err());
        }
    }
}

#[cfg(not(feature = "fuse"))]
pub use mount::{fuse_info, is_fuse_available, mount, MountHandle, MountOptions};
