//! FUSE filesystem implementation
//!
//! File content goes through the read/write transactions. Every other verb
//! is forwarded to the same operation on the resolved backing path.

use fuser::{
    FileAttr, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use libc::c_int;
use nix::sys::stat::{Mode, SFlag, UtimensatFlags};
use nix::sys::time::TimeSpec;
use std::ffi::{OsStr, OsString};
use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, DirEntryExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, error, info};

use super::{attr, transaction, xattr, InodeTable, MountContext, ROOT_INO};
use crate::config::MountConfig;
use crate::error::Error;

type FsResult<T> = std::result::Result<T, c_int>;

fn io_errno(e: io::Error) -> c_int {
    e.raw_os_error().unwrap_or(libc::EIO)
}

fn nix_errno(e: nix::Error) -> c_int {
    e as c_int
}

fn core_errno(e: Error) -> c_int {
    e.errno()
}

fn timespec(time: Option<TimeOrNow>) -> TimeSpec {
    match time {
        None => TimeSpec::UTIME_OMIT,
        Some(TimeOrNow::Now) => TimeSpec::UTIME_NOW,
        Some(TimeOrNow::SpecificTime(t)) => {
            TimeSpec::from(t.duration_since(UNIX_EPOCH).unwrap_or_default())
        }
    }
}

/// Requested attribute changes from a setattr call
#[derive(Debug, Default, Clone, Copy)]
pub struct SetAttr {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<TimeOrNow>,
    pub mtime: Option<TimeOrNow>,
}

/// One directory listing entry
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub ino: u64,
    pub kind: fuser::FileType,
    pub name: OsString,
}

/// Encrypting passthrough FUSE filesystem
pub struct CryptFs {
    /// Backing root and key
    ctx: MountContext,
    /// Kernel inode numbers
    inodes: InodeTable,
    /// Attribute/entry cache TTL
    ttl: Duration,
}

impl CryptFs {
    /// Create a filesystem over an established mount context
    pub fn new(ctx: MountContext, config: &MountConfig) -> Self {
        Self {
            ctx,
            inodes: InodeTable::new(),
            ttl: Duration::from_secs(config.attr_ttl_secs),
        }
    }

    /// fuser mount options for a configuration
    pub fn mount_options(config: &MountConfig) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName(config.fs_name.clone()),
            MountOption::Subtype("cryptmirror".to_string()),
            MountOption::RW,
        ];
        if config.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if config.allow_other {
            options.push(MountOption::AllowOther);
        }
        if config.allow_root {
            options.push(MountOption::AllowRoot);
        }
        options
    }

    /// Virtual and backing path of an inode
    fn resolve_ino(&self, ino: u64) -> FsResult<(PathBuf, PathBuf)> {
        let path = self.inodes.path(ino).ok_or(libc::ENOENT)?;
        let backing = self.ctx.resolve(&path).map_err(core_errno)?;
        Ok((path, backing))
    }

    /// Virtual and backing path of `name` inside `parent`
    fn resolve_child(&self, parent: u64, name: &OsStr) -> FsResult<(PathBuf, PathBuf)> {
        let path = self.inodes.child_path(parent, name).ok_or(libc::ENOENT)?;
        let backing = self.ctx.resolve(&path).map_err(core_errno)?;
        Ok((path, backing))
    }

    /// Stat a freshly created or looked-up entry and take a kernel reference
    fn entry(&self, path: &Path, backing: &Path) -> FsResult<FileAttr> {
        let meta = fs::symlink_metadata(backing).map_err(io_errno)?;
        let ino = self.inodes.lookup(path);
        Ok(attr::to_file_attr(ino, &meta))
    }

    pub fn do_lookup(&self, parent: u64, name: &OsStr) -> FsResult<FileAttr> {
        let (path, backing) = self.resolve_child(parent, name)?;
        self.entry(&path, &backing)
    }

    pub fn do_getattr(&self, ino: u64) -> FsResult<FileAttr> {
        let (_, backing) = self.resolve_ino(ino)?;
        let meta = fs::symlink_metadata(&backing).map_err(io_errno)?;
        Ok(attr::to_file_attr(ino, &meta))
    }

    pub fn do_setattr(&self, ino: u64, changes: SetAttr) -> FsResult<FileAttr> {
        let (path, backing) = self.resolve_ino(ino)?;

        if let Some(mode) = changes.mode {
            fs::set_permissions(&backing, Permissions::from_mode(mode & 0o7777))
                .map_err(io_errno)?;
        }

        if changes.uid.is_some() || changes.gid.is_some() {
            std::os::unix::fs::lchown(&backing, changes.uid, changes.gid).map_err(io_errno)?;
        }

        if let Some(size) = changes.size {
            let meta = fs::symlink_metadata(&backing).map_err(io_errno)?;
            if meta.is_dir() {
                return Err(libc::EISDIR);
            }
            if !meta.is_file() {
                return Err(libc::EINVAL);
            }
            transaction::resize(&self.ctx, &path, size).map_err(core_errno)?;
        }

        if changes.atime.is_some() || changes.mtime.is_some() {
            nix::sys::stat::utimensat(
                None,
                &backing,
                &timespec(changes.atime),
                &timespec(changes.mtime),
                UtimensatFlags::NoFollowSymlink,
            )
            .map_err(nix_errno)?;
        }

        self.do_getattr(ino)
    }

    pub fn do_readlink(&self, ino: u64) -> FsResult<Vec<u8>> {
        let (_, backing) = self.resolve_ino(ino)?;
        let target = fs::read_link(&backing).map_err(io_errno)?;
        Ok(target.as_os_str().as_bytes().to_vec())
    }

    pub fn do_mknod(
        &self,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        rdev: u32,
    ) -> FsResult<FileAttr> {
        let (path, backing) = self.resolve_child(parent, name)?;
        let perm = mode & !umask & 0o7777;
        let kind = mode & libc::S_IFMT as u32;

        if kind == libc::S_IFREG as u32 || kind == 0 {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(perm)
                .open(&backing)
                .map_err(io_errno)?;
        } else if kind == libc::S_IFIFO as u32 {
            nix::unistd::mkfifo(&backing, Mode::from_bits_truncate(perm as libc::mode_t))
                .map_err(nix_errno)?;
        } else {
            nix::sys::stat::mknod(
                &backing,
                SFlag::from_bits_truncate(kind as libc::mode_t),
                Mode::from_bits_truncate(perm as libc::mode_t),
                rdev as libc::dev_t,
            )
            .map_err(nix_errno)?;
        }

        self.entry(&path, &backing)
    }

    pub fn do_mkdir(&self, parent: u64, name: &OsStr, mode: u32, umask: u32) -> FsResult<FileAttr> {
        let (path, backing) = self.resolve_child(parent, name)?;
        DirBuilder::new()
            .mode(mode & !umask & 0o7777)
            .create(&backing)
            .map_err(io_errno)?;
        self.entry(&path, &backing)
    }

    pub fn do_unlink(&self, parent: u64, name: &OsStr) -> FsResult<()> {
        let (path, backing) = self.resolve_child(parent, name)?;
        fs::remove_file(&backing).map_err(io_errno)?;
        self.inodes.unlink(&path);
        Ok(())
    }

    pub fn do_rmdir(&self, parent: u64, name: &OsStr) -> FsResult<()> {
        let (path, backing) = self.resolve_child(parent, name)?;
        fs::remove_dir(&backing).map_err(io_errno)?;
        self.inodes.unlink(&path);
        Ok(())
    }

    /// The link target is stored verbatim, not rewritten into the backing tree
    pub fn do_symlink(&self, parent: u64, name: &OsStr, target: &Path) -> FsResult<FileAttr> {
        let (path, backing) = self.resolve_child(parent, name)?;
        std::os::unix::fs::symlink(target, &backing).map_err(io_errno)?;
        self.entry(&path, &backing)
    }

    pub fn do_rename(
        &self,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
    ) -> FsResult<()> {
        // RENAME_NOREPLACE / RENAME_EXCHANGE have no std equivalent
        if flags != 0 {
            return Err(libc::EINVAL);
        }
        let (from, from_backing) = self.resolve_child(parent, name)?;
        let (to, to_backing) = self.resolve_child(newparent, newname)?;

        fs::rename(&from_backing, &to_backing).map_err(io_errno)?;
        self.inodes.rename(&from, &to);
        Ok(())
    }

    pub fn do_link(&self, ino: u64, newparent: u64, newname: &OsStr) -> FsResult<FileAttr> {
        let (_, backing) = self.resolve_ino(ino)?;
        let (new_path, new_backing) = self.resolve_child(newparent, newname)?;
        fs::hard_link(&backing, &new_backing).map_err(io_errno)?;
        self.entry(&new_path, &new_backing)
    }

    /// Check the backing file can be opened with the requested access mode
    pub fn do_open(&self, ino: u64, flags: i32) -> FsResult<()> {
        let (path, backing) = self.resolve_ino(ino)?;

        let accmode = flags & libc::O_ACCMODE;
        let writable = accmode == libc::O_WRONLY || accmode == libc::O_RDWR;
        OpenOptions::new()
            .read(accmode == libc::O_RDONLY || accmode == libc::O_RDWR)
            .write(writable)
            .open(&backing)
            .map_err(io_errno)?;

        if writable && flags & libc::O_TRUNC != 0 {
            transaction::resize(&self.ctx, &path, 0).map_err(core_errno)?;
        }
        Ok(())
    }

    pub fn do_read(&self, ino: u64, offset: i64, size: u32) -> FsResult<Vec<u8>> {
        let offset = u64::try_from(offset).map_err(|_| libc::EINVAL)?;
        let (path, _) = self.resolve_ino(ino)?;
        transaction::read_range(&self.ctx, &path, offset, size as usize).map_err(|e| {
            error!(?path, "read failed: {}", e);
            core_errno(e)
        })
    }

    pub fn do_write(&self, ino: u64, offset: i64, data: &[u8]) -> FsResult<u32> {
        let offset = u64::try_from(offset).map_err(|_| libc::EINVAL)?;
        let (path, _) = self.resolve_ino(ino)?;
        let written = transaction::write_range(&self.ctx, &path, offset, data).map_err(|e| {
            error!(?path, "write failed: {}", e);
            core_errno(e)
        })?;
        u32::try_from(written).map_err(|_| libc::EIO)
    }

    /// Directory listing with `.` and `..`, hiding staged commit files
    pub fn do_readdir(&self, ino: u64) -> FsResult<Vec<DirEntry>> {
        let (path, backing) = self.resolve_ino(ino)?;
        let parent_ino = path
            .parent()
            .and_then(|p| self.inodes.ino_of(p))
            .unwrap_or(ROOT_INO);

        let mut entries = vec![
            DirEntry {
                ino,
                kind: fuser::FileType::Directory,
                name: OsString::from("."),
            },
            DirEntry {
                ino: parent_ino,
                kind: fuser::FileType::Directory,
                name: OsString::from(".."),
            },
        ];

        for entry in fs::read_dir(&backing).map_err(io_errno)? {
            let entry = entry.map_err(io_errno)?;
            let name = entry.file_name();
            if name.as_bytes().starts_with(transaction::TEMP_PREFIX.as_bytes()) {
                continue;
            }

            let kind = attr::file_kind(entry.file_type().map_err(io_errno)?);
            let child_ino = self.inodes.ino_of(&path.join(&name)).unwrap_or(entry.ino());
            entries.push(DirEntry {
                ino: child_ino,
                kind,
                name,
            });
        }

        Ok(entries)
    }

    pub fn do_statfs(&self, ino: u64) -> FsResult<nix::sys::statvfs::Statvfs> {
        let backing = match self.resolve_ino(ino) {
            Ok((_, backing)) => backing,
            Err(_) => self.ctx.resolve(Path::new("/")).map_err(core_errno)?,
        };
        nix::sys::statvfs::statvfs(&backing).map_err(nix_errno)
    }

    pub fn do_access(&self, ino: u64, mask: i32) -> FsResult<()> {
        let (_, backing) = self.resolve_ino(ino)?;
        nix::unistd::access(&backing, nix::unistd::AccessFlags::from_bits_truncate(mask))
            .map_err(nix_errno)
    }

    pub fn do_create(
        &self,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
    ) -> FsResult<FileAttr> {
        let (path, backing) = self.resolve_child(parent, name)?;

        let mut options = OpenOptions::new();
        options.write(true).mode(mode & !umask & 0o7777);
        if flags & libc::O_EXCL != 0 {
            options.create_new(true);
        } else {
            // An empty backing file is a valid encoding of an empty file
            options.create(true).truncate(true);
        }
        options.open(&backing).map_err(io_errno)?;

        self.entry(&path, &backing)
    }
}

impl Filesystem for CryptFs {
    fn init(
        &mut self,
        _req: &Request<'_>,
        _config: &mut fuser::KernelConfig,
    ) -> std::result::Result<(), c_int> {
        info!("Mounted backing directory {:?}", self.ctx.root());
        Ok(())
    }

    fn destroy(&mut self) {
        info!("Unmounting backing directory {:?}", self.ctx.root());
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup(parent={}, name={:?})", parent, name);
        match self.do_lookup(parent, name) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        debug!("forget(ino={}, nlookup={})", ino, nlookup);
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        debug!("getattr(ino={})", ino);
        match self.do_getattr(ino) {
            Ok(attr) => reply.attr(&self.ttl, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!(
            "setattr(ino={}, mode={:?}, uid={:?}, gid={:?}, size={:?})",
            ino, mode, uid, gid, size
        );
        let changes = SetAttr {
            mode,
            uid,
            gid,
            size,
            atime,
            mtime,
        };
        match self.do_setattr(ino, changes) {
            Ok(attr) => reply.attr(&self.ttl, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        debug!("readlink(ino={})", ino);
        match self.do_readlink(ino) {
            Ok(target) => reply.data(&target),
            Err(e) => reply.error(e),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        debug!("mknod(parent={}, name={:?}, mode={:o})", parent, name, mode);
        match self.do_mknod(parent, name, mode, umask, rdev) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        debug!("mkdir(parent={}, name={:?}, mode={:o})", parent, name, mode);
        match self.do_mkdir(parent, name, mode, umask) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("unlink(parent={}, name={:?})", parent, name);
        match self.do_unlink(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("rmdir(parent={}, name={:?})", parent, name);
        match self.do_rmdir(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        debug!("symlink(parent={}, name={:?}, target={:?})", parent, link_name, target);
        match self.do_symlink(parent, link_name, target) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        debug!(
            "rename(parent={}, name={:?}, newparent={}, newname={:?})",
            parent, name, newparent, newname
        );
        match self.do_rename(parent, name, newparent, newname, flags) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        debug!("link(ino={}, newparent={}, newname={:?})", ino, newparent, newname);
        match self.do_link(ino, newparent, newname) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open(ino={}, flags={:#x})", ino, flags);
        // No per-handle state: every read and write is self-contained
        match self.do_open(ino, flags) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e),
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
        debug!("read(ino={}, offset={}, size={})", ino, offset, size);
        match self.do_read(ino, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!("write(ino={}, offset={}, size={})", ino, offset, data.len());
        match self.do_write(ino, offset, data) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(e),
        }
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        // Commits are synced before they are renamed into place
        reply.ok();
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir(ino={}, offset={})", ino, offset);
        let entries = match self.do_readdir(ino) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        for (i, entry) in entries.iter().enumerate().skip(offset.max(0) as usize) {
            if reply.add(entry.ino, (i + 1) as i64, entry.kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        debug!("statfs(ino={})", ino);
        match self.do_statfs(ino) {
            Ok(st) => reply.statfs(
                st.blocks() as u64,
                st.blocks_free() as u64,
                st.blocks_available() as u64,
                st.files() as u64,
                st.files_free() as u64,
                st.block_size() as u32,
                st.name_max() as u32,
                st.fragment_size() as u32,
            ),
            Err(e) => reply.error(e),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        debug!("setxattr(ino={}, name={:?})", ino, name);
        let result = self
            .resolve_ino(ino)
            .and_then(|(_, backing)| xattr::set(&backing, name, value, flags).map_err(io_errno));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        debug!("getxattr(ino={}, name={:?}, size={})", ino, name, size);
        let result = self.resolve_ino(ino).and_then(|(_, backing)| {
            xattr::get(&backing, name, size as usize).map_err(io_errno)
        });
        match result {
            Ok(value) if size == 0 => reply.size(value.len() as u32),
            Ok(value) => reply.data(&value),
            Err(e) => reply.error(e),
        }
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        debug!("listxattr(ino={}, size={})", ino, size);
        let result = self
            .resolve_ino(ino)
            .and_then(|(_, backing)| xattr::list(&backing, size as usize).map_err(io_errno));
        match result {
            Ok(names) if size == 0 => reply.size(names.len() as u32),
            Ok(names) => reply.data(&names),
            Err(e) => reply.error(e),
        }
    }

    fn removexattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("removexattr(ino={}, name={:?})", ino, name);
        let result = self
            .resolve_ino(ino)
            .and_then(|(_, backing)| xattr::remove(&backing, name).map_err(io_errno));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        debug!("access(ino={}, mask={})", ino, mask);
        match self.do_access(ino, mask) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        debug!("create(parent={}, name={:?}, mode={:o})", parent, name, mode);
        match self.do_create(parent, name, mode, umask, flags) {
            Ok(attr) => reply.created(&self.ttl, &attr, 0, 0, 0),
            Err(e) => reply.error(e),
        }
    }
}
