//! FUSE mount management.
//!
//! Provides a high-level interface for mounting and unmounting a repository.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fuser::{BackgroundSession, MountOption};
use tracing::{error, info};

use crate::filesystem::GitFilesystem;
use gitmount_common::{Error, Result};
use gitmount_core::GitFs;

/// Mount options for the FUSE filesystem.
///
/// The mount is always read-only.
#[derive(Debug, Clone)]
pub struct MountOptions {
    /// Allow other users to access the mount.
    pub allow_other: bool,
    /// Enable auto unmount when process exits.
    pub auto_unmount: bool,
    /// Let the kernel enforce permission bits.
    pub default_permissions: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            allow_other: false,
            auto_unmount: true,
            default_permissions: true,
        }
    }
}

impl MountOptions {
    /// Kernel mount options, always including `ro`.
    pub fn to_fuse_options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName("gitmount".to_string()),
            MountOption::Subtype("gitmount".to_string()),
            MountOption::RO,
        ];
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if self.default_permissions {
            options.push(MountOption::DefaultPermissions);
        }
        options
    }
}

/// Handle to a mounted FUSE filesystem.
///
/// The mount is unmounted when this handle is dropped.
pub struct MountHandle {
    mount_point: PathBuf,
    session: Option<BackgroundSession>,
}

impl MountHandle {
    /// Get the mount point path.
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Unmount the filesystem and wait for the session thread to finish.
    pub fn unmount(mut self) {
        if let Some(session) = self.session.take() {
            info!("Unmounting {:?}", self.mount_point);
            session.join();
        }
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        if self.session.take().is_some() {
            info!("Unmounting {:?}", self.mount_point);
        }
    }
}

/// Mount `fs` at `mount_point`, serving requests on a background thread.
///
/// # Preconditions
/// - Mount point must exist and be a directory
/// - User must have FUSE permissions
///
/// # Errors
/// - Mount point does not exist or is not a directory
/// - FUSE session could not be created
pub fn mount(
    fs: Arc<GitFs>,
    mount_point: impl AsRef<Path>,
    options: MountOptions,
) -> Result<MountHandle> {
    let mount_point = mount_point.as_ref().to_path_buf();

    if !mount_point.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Mount point does not exist: {:?}", mount_point),
        )));
    }

    if !mount_point.is_dir() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Mount point is not a directory: {:?}", mount_point),
        )));
    }

    info!(store = fs.store().name(), "Mounting at {:?}", mount_point);

    let filesystem = GitFilesystem::new(fs);
    let session = fuser::spawn_mount2(filesystem, &mount_point, &options.to_fuse_options())
        .map_err(|e| {
            error!("Failed to create FUSE session: {}", e);
            Error::Io(e)
        })?;

    info!("Mounted successfully at {:?}", mount_point);

    Ok(MountHandle {
        mount_point,
        session: Some(session),
    })
}

/// Check if FUSE is available on the system.
pub fn is_fuse_available() -> bool {
    #[cfg(target_os = "linux")]
    {
        Path::new("/dev/fuse").exists()
    }

    #[cfg(target_os = "macos")]
    {
        Path::new("/Library/Filesystems/macfuse.fs").exists()
            || Path::new("/Library/Filesystems/osxfuse.fs").exists()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        false
    }
}

/// Get platform-specific FUSE information.
pub fn fuse_info() -> String {
    #[cfg(target_os = "linux")]
    {
        if is_fuse_available() {
            "FUSE available via /dev/fuse".to_string()
        } else {
            "FUSE not available. Install the fuse3 package.".to_string()
        }
    }

    #[cfg(target_os = "macos")]
    {
        if is_fuse_available() {
            "macFUSE available".to_string()
        } else {
            "macFUSE not installed. Visit https://osxfuse.github.io/".to_string()
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        "FUSE not supported on this platform".to_string()
    }
}
