//! FUSE filesystem implementation for gitmount.
//!
//! Implements `fuser::Filesystem` by translating inode-based kernel requests
//! into path-based [`GitFs`] calls. The mount is read-only; every mutating
//! request is answered with `EROFS`.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use gitmount_common::Error;
use gitmount_core::{Attributes, DirEntry, GitFs, NodeKind};

use crate::inode::{child_path, parent_path, InodeTable, ROOT_INODE};

const BLOCK_SIZE: u32 = 4096;
const MAX_NAME_LEN: u32 = 255;

/// Map a filesystem error onto the errno reported to the kernel.
pub fn error_to_errno(err: &Error) -> c_int {
    match err {
        Error::NotFound(_) => libc::ENOENT,
        Error::InvariantViolation(_) | Error::InvalidInput(_) => libc::EINVAL,
        Error::NotPermitted(_) => libc::EROFS,
        Error::ObjectStore(_) | Error::Io(_) | Error::Serialization(_) => libc::EIO,
    }
}

/// Permission bits for a node; nothing is ever writable.
fn permissions(attrs: &Attributes) -> u16 {
    match attrs.kind {
        NodeKind::Directory => 0o555,
        NodeKind::File if attrs.executable => 0o555,
        NodeKind::File => 0o444,
        NodeKind::Symlink => 0o777,
    }
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
        NodeKind::Symlink => FileType::Symlink,
    }
}

/// FUSE adapter over a [`GitFs`].
pub struct GitFilesystem {
    fs: Arc<GitFs>,
    inodes: RwLock<InodeTable>,
    ttl: Duration,
    uid: u32,
    gid: u32,
}

impl GitFilesystem {
    /// Create the adapter. Attribute TTL comes from the filesystem config.
    pub fn new(fs: Arc<GitFs>) -> Self {
        let ttl = fs.config().attr_ttl();
        Self {
            fs,
            inodes: RwLock::new(InodeTable::new()),
            ttl,
            // SAFETY: getuid/getgid cannot fail and touch no memory.
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        }
    }

    /// Convert path attributes to FUSE file attributes.
    fn file_attr(&self, ino: u64, attrs: &Attributes) -> FileAttr {
        FileAttr {
            ino,
            size: attrs.size,
            blocks: attrs.size.div_ceil(512),
            atime: attrs.mtime,
            mtime: attrs.mtime,
            ctime: attrs.mtime,
            crtime: attrs.mtime,
            kind: file_type(attrs.kind),
            perm: permissions(attrs),
            nlink: if attrs.kind == NodeKind::Directory { 2 } else { 1 },
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.inodes.read().path(ino).map(str::to_string)
    }

    /// Directory entries of `path`, with `.` and `..` first. Children that
    /// were never looked up are not entered into the inode table.
    fn listing(&self, ino: u64, path: &str, entries: Vec<DirEntry>) -> Vec<(u64, FileType, String)> {
        let inodes = self.inodes.read();
        let parent_ino = inodes.inode(parent_path(path)).unwrap_or(ROOT_INODE);
        let mut listing = Vec::with_capacity(entries.len() + 2);
        listing.push((ino, FileType::Directory, ".".to_string()));
        listing.push((parent_ino, FileType::Directory, "..".to_string()));
        for entry in entries {
            let child_ino = inodes.listing_inode(&child_path(path, &entry.name));
            listing.push((child_ino, file_type(entry.kind), entry.name));
        }
        listing
    }
}

impl Filesystem for GitFilesystem {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = child_path(&parent_path, name);
        trace!(parent, path = %path, "lookup");

        match self.fs.getattr(&path) {
            Ok(attrs) => {
                let ino = self.inodes.write().lookup(&path);
                reply.entry(&self.ttl, &self.file_attr(ino, &attrs), 0);
            }
            Err(e) => reply.error(error_to_errno(&e)),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        trace!(ino, nlookup, "forget");
        self.inodes.write().forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        trace!(ino, path = %path, "getattr");

        match self.fs.getattr(&path) {
            Ok(attrs) => reply.attr(&self.ttl, &self.file_attr(ino, &attrs)),
            Err(e) => reply.error(error_to_errno(&e)),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        trace!(ino, path = %path, "readlink");

        match self.fs.readlink(&path) {
            Ok(target) => reply.data(&target),
            Err(e) => reply.error(error_to_errno(&e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            debug!(ino, flags, "rejecting write open");
            reply.error(libc::EROFS);
            return;
        }
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.fs.getattr(&path) {
            // Objects never change, so the kernel may keep cached pages.
            Ok(_) => reply.opened(0, fuser::consts::FOPEN_KEEP_CACHE),
            Err(e) => reply.error(error_to_errno(&e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        trace!(ino, path = %path, offset, size, "read");

        let mut buf = vec![0u8; size as usize];
        match self.fs.read(&path, offset, &mut buf) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(error_to_errno(&e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        trace!(ino, path = %path, offset, "readdir");

        let entries = match self.fs.readdir(&path) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(error_to_errno(&e));
                return;
            }
        };

        let listing = self.listing(ino, &path, entries);
        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, (child_ino, kind, name)) in listing.into_iter().enumerate().skip(skip) {
            if reply.add(child_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        reply.statfs(0, 0, 0, 0, 0, BLOCK_SIZE, MAX_NAME_LEN, BLOCK_SIZE);
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        warn!(ino, "setattr on read-only mount");
        reply.error(libc::EROFS);
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        warn!(ino, "write on read-only mount");
        reply.error(libc::EROFS);
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        reply.error(libc::EROFS);
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        reply.error(libc::EROFS);
    }

    fn unlink(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(libc::EROFS);
    }

    fn rmdir(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(libc::EROFS);
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(libc::EROFS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitmount_core::FsConfig;
    use gitmount_store::{MemoryEntry, MemoryStore};

    fn filesystem() -> GitFilesystem {
        let store = Arc::new(MemoryStore::new("test"));
        let head = store.commit_files(&[("a", MemoryEntry::File(b"a"))], &[], 1);
        store.set_ref("refs/heads/main", &head);
        let fs = GitFs::new(store, FsConfig::default()).unwrap();
        GitFilesystem::new(Arc::new(fs))
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(error_to_errno(&Error::NotFound("x".into())), libc::ENOENT);
        assert_eq!(error_to_errno(&Error::InvariantViolation("x".into())), libc::EINVAL);
        assert_eq!(error_to_errno(&Error::ObjectStore("x".into())), libc::EIO);
        assert_eq!(
            error_to_errno(&Error::Io(std::io::Error::other("x"))),
            libc::EIO
        );
    }

    #[test]
    fn test_attrs_are_read_only() {
        let fs = filesystem();
        let now = SystemTime::now();
        let exe = Attributes {
            kind: NodeKind::File,
            size: 1024,
            executable: true,
            mtime: now,
        };
        let attr = fs.file_attr(7, &exe);
        assert_eq!(attr.perm, 0o555);
        assert_eq!(attr.blocks, 2);
        assert_eq!(attr.kind, FileType::RegularFile);

        let link = Attributes {
            kind: NodeKind::Symlink,
            size: 50,
            executable: false,
            mtime: now,
        };
        assert_eq!(fs.file_attr(8, &link).kind, FileType::Symlink);
    }

    #[test]
    fn test_listing_leaves_inode_table_alone() {
        let fs = filesystem();
        let entries = fs.fs.readdir("/").unwrap();
        let listing = fs.listing(ROOT_INODE, "/", entries);

        assert_eq!(listing[0].2, ".");
        assert_eq!(listing[1], (ROOT_INODE, FileType::Directory, "..".to_string()));
        assert_eq!(listing.len(), 7);
        assert_eq!(fs.inodes.read().len(), 1);

        let branch = fs.inodes.write().lookup("/branch");
        let listing = fs.listing(ROOT_INODE, "/", fs.fs.readdir("/").unwrap());
        assert!(listing.iter().any(|(ino, _, name)| *ino == branch && name == "branch"));
    }

    #[test]
    fn test_ttl_from_config() {
        assert_eq!(filesystem().ttl, Duration::from_secs(1));
    }
}
