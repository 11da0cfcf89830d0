//! Backing metadata to FUSE attributes

use std::fs::{FileType, Metadata};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::crypto;

/// Map a backing file type onto the FUSE file type
pub fn file_kind(ft: FileType) -> fuser::FileType {
    if ft.is_dir() {
        fuser::FileType::Directory
    } else if ft.is_symlink() {
        fuser::FileType::Symlink
    } else if ft.is_block_device() {
        fuser::FileType::BlockDevice
    } else if ft.is_char_device() {
        fuser::FileType::CharDevice
    } else if ft.is_fifo() {
        fuser::FileType::NamedPipe
    } else if ft.is_socket() {
        fuser::FileType::Socket
    } else {
        fuser::FileType::RegularFile
    }
}

/// Size as seen through the mount: plaintext length for regular files
pub fn logical_size(meta: &Metadata) -> u64 {
    if meta.is_file() {
        crypto::plaintext_len(meta.len())
    } else {
        meta.len()
    }
}

fn timestamp(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = nsecs.clamp(0, 999_999_999) as u32;
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + Duration::from_nanos(nanos as u64)
    }
}

/// Build the attribute reply for inode `ino` from its backing metadata
pub fn to_file_attr(ino: u64, meta: &Metadata) -> fuser::FileAttr {
    let size = logical_size(meta);
    fuser::FileAttr {
        ino,
        size,
        blocks: size.div_ceil(512),
        atime: timestamp(meta.atime(), meta.atime_nsec()),
        mtime: timestamp(meta.mtime(), meta.mtime_nsec()),
        ctime: timestamp(meta.ctime(), meta.ctime_nsec()),
        crtime: meta.created().unwrap_or(UNIX_EPOCH),
        kind: file_kind(meta.file_type()),
        perm: (meta.mode() & 0o7777) as u16,
        nlink: meta.nlink() as u32,
        uid: meta.uid(),
        gid: meta.gid(),
        rdev: meta.rdev() as u32,
        blksize: meta.blksize() as u32,
        flags: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::HEADER_SIZE;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_regular_file_reports_plaintext_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, vec![0u8; HEADER_SIZE + 42]).unwrap();

        let attr = to_file_attr(7, &fs::metadata(&path).unwrap());
        assert_eq!(attr.ino, 7);
        assert_eq!(attr.size, 42);
        assert_eq!(attr.kind, fuser::FileType::RegularFile);
    }

    #[test]
    fn test_empty_file_is_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();

        assert_eq!(logical_size(&fs::metadata(&path).unwrap()), 0);
    }

    #[test]
    fn test_directory_passthrough() {
        let dir = tempdir().unwrap();
        let meta = fs::metadata(dir.path()).unwrap();
        let attr = to_file_attr(1, &meta);

        assert_eq!(attr.kind, fuser::FileType::Directory);
        assert_eq!(attr.size, meta.len());
        assert_eq!(attr.uid, meta.uid());
    }

    #[test]
    fn test_timestamp_conversion() {
        assert_eq!(timestamp(0, 0), UNIX_EPOCH);
        assert_eq!(timestamp(10, 5), UNIX_EPOCH + Duration::new(10, 5));
        assert_eq!(
            timestamp(-1, 500),
            UNIX_EPOCH - Duration::from_secs(1) + Duration::from_nanos(500)
        );
    }
}
