//! Content transactions
//!
//! Every read or write decodes the whole backing file into a scratch buffer,
//! works on plaintext, and (for writes) re-encodes the whole buffer. Cost is
//! proportional to file size on every call; nothing is cached between calls.
//!
//! Writes never touch the target in place. The new blob is staged in a
//! temporary file next to the target and renamed over it, so a reader sees
//! either the old blob or the new one.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

use crate::crypto;
use crate::error::{Error, Result};
use crate::fs::MountContext;

/// Name prefix of staged commit files in the backing store
pub const TEMP_PREFIX: &str = ".cryptmirror-";

/// Decrypted file content, wiped when dropped
type ScratchBuffer = Zeroizing<Vec<u8>>;

/// Read up to `size` bytes of plaintext starting at `offset`.
///
/// Returns an empty buffer when `offset` is at or past end of file, and a
/// short buffer when the range runs past it.
pub fn read_range(ctx: &MountContext, path: &Path, offset: u64, size: usize) -> Result<Vec<u8>> {
    let backing = ctx.resolve(path)?;
    let plaintext = load(ctx, &backing)?;

    let len = plaintext.len() as u64;
    if offset >= len {
        trace!(?path, offset, len, "read at or past EOF");
        return Ok(Vec::new());
    }

    // offset < len, so it fits in usize
    let start = offset as usize;
    let end = start + size.min(plaintext.len() - start);
    Ok(plaintext[start..end].to_vec())
}

/// Write `payload` at `offset`, creating the backing file if absent.
///
/// A gap between the old end of file and `offset` is filled with zeros.
/// Returns the number of payload bytes accepted.
pub fn write_range(ctx: &MountContext, path: &Path, offset: u64, payload: &[u8]) -> Result<usize> {
    let backing = ctx.resolve(path)?;
    let end = offset
        .checked_add(payload.len() as u64)
        .and_then(|end| usize::try_from(end).ok())
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "write of {} bytes at offset {} overflows",
                payload.len(),
                offset
            ))
        })?;

    let buffer = match load(ctx, &backing) {
        Ok(buffer) => buffer,
        Err(Error::NotFound(_)) => Zeroizing::new(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut buffer = grow(buffer, end)?;
    buffer[end - payload.len()..end].copy_from_slice(payload);

    StagedCommit::stage(ctx, &backing, &buffer)?.commit()?;
    debug!(?path, offset, size = payload.len(), "write committed");
    Ok(payload.len())
}

/// Truncate or zero-extend an existing file to `size` plaintext bytes
pub fn resize(ctx: &MountContext, path: &Path, size: u64) -> Result<()> {
    let backing = ctx.resolve(path)?;
    let size = usize::try_from(size)
        .map_err(|_| Error::InvalidArgument(format!("size {} out of range", size)))?;

    let mut buffer = grow(load(ctx, &backing)?, size)?;
    buffer.truncate(size);

    StagedCommit::stage(ctx, &backing, &buffer)?.commit()?;
    debug!(?path, size, "resize committed");
    Ok(())
}

/// Zero-extend `buffer` to at least `len` bytes.
///
/// Growth goes into one fresh allocation of exactly `len` bytes and the old
/// buffer is wiped on drop, so no stale plaintext is left behind by a
/// reallocation. A length the allocator cannot satisfy fails with EFBIG.
fn grow(buffer: ScratchBuffer, len: usize) -> Result<ScratchBuffer> {
    if len <= buffer.len() {
        return Ok(buffer);
    }

    let mut grown: ScratchBuffer = Zeroizing::new(Vec::new());
    grown.try_reserve_exact(len).map_err(|_| {
        warn!(len, "Refusing to grow scratch buffer");
        Error::Io(io::Error::from_raw_os_error(libc::EFBIG))
    })?;
    grown.extend_from_slice(&buffer);
    grown.resize(len, 0);
    Ok(grown)
}

/// Read and decode the whole backing file
fn load(ctx: &MountContext, backing: &Path) -> Result<ScratchBuffer> {
    let blob = fs::read(backing).map_err(|e| Error::from_io(e, backing))?;
    let plaintext = crypto::decode(&blob, ctx.key()).map_err(|e| {
        warn!(path = ?backing, "Failed to decode backing file: {}", e);
        e
    })?;
    Ok(Zeroizing::new(plaintext))
}

/// A fully written, synced replacement blob waiting to be renamed into place.
///
/// Dropping it without calling [`StagedCommit::commit`] deletes the
/// temporary file and leaves the target untouched.
pub struct StagedCommit {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedCommit {
    /// Encode `plaintext` into a temporary file beside `target`
    pub fn stage(ctx: &MountContext, target: &Path, plaintext: &[u8]) -> Result<Self> {
        let parent = target
            .parent()
            .ok_or_else(|| Error::InvalidArgument(format!("no parent for {}", target.display())))?;

        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(parent)
            .map_err(|e| Error::from_io(e, parent))?;

        match fs::metadata(target) {
            Ok(meta) => inherit_metadata(temp.as_file(), &meta)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::from_io(e, target)),
        }

        crypto::encode_to(plaintext, ctx.key(), &mut temp)?;
        temp.flush()?;
        temp.as_file().sync_all()?;

        Ok(Self {
            temp,
            target: target.to_path_buf(),
        })
    }

    /// Path the blob will replace
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Atomically replace the target with the staged blob
    pub fn commit(self) -> Result<()> {
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|e| Error::from_io(e.error, &target))?;

        if let Some(parent) = target.parent() {
            if let Err(e) = fs::File::open(parent).and_then(|dir| dir.sync_all()) {
                debug!(?parent, "Failed to sync parent directory: {}", e);
            }
        }
        Ok(())
    }
}

/// Carry permission bits, and ownership where allowed, over to the new blob
fn inherit_metadata(file: &fs::File, meta: &fs::Metadata) -> Result<()> {
    file.set_permissions(meta.permissions())?;

    let euid = nix::unistd::geteuid().as_raw();
    let egid = nix::unistd::getegid().as_raw();
    if meta.uid() != euid || meta.gid() != egid {
        if let Err(e) = std::os::unix::fs::fchown(file, Some(meta.uid()), Some(meta.gid())) {
            debug!("Could not preserve ownership on rewrite: {}", e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{MountKey, HEADER_SIZE, KEY_SIZE};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TempDir, MountContext) {
        let dir = tempdir().unwrap();
        let key = MountKey::from_bytes(&[9u8; KEY_SIZE]).unwrap();
        let ctx = MountContext::new(dir.path().to_path_buf(), key).unwrap();
        (dir, ctx)
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_read_after_write() {
        let (_dir, ctx) = setup();
        let path = Path::new("/hello.txt");

        assert_eq!(write_range(&ctx, path, 0, b"hello").unwrap(), 5);
        assert_eq!(read_range(&ctx, path, 0, 5).unwrap(), b"hello");
    }

    #[test]
    fn test_backing_file_is_encoded() {
        let (dir, ctx) = setup();
        write_range(&ctx, Path::new("/a"), 0, b"plaintext!").unwrap();

        let blob = fs::read(dir.path().join("a")).unwrap();
        assert_eq!(blob.len(), HEADER_SIZE + 10);
        assert!(!blob.windows(10).any(|w| w == b"plaintext!"));
    }

    #[test]
    fn test_partial_read() {
        let (_dir, ctx) = setup();
        let path = Path::new("/digits");
        write_range(&ctx, path, 0, b"0123456789").unwrap();

        assert_eq!(read_range(&ctx, path, 3, 4).unwrap(), b"3456");
    }

    #[test]
    fn test_read_clipped_at_eof() {
        let (_dir, ctx) = setup();
        let path = Path::new("/short");
        write_range(&ctx, path, 0, b"abc").unwrap();

        assert_eq!(read_range(&ctx, path, 1, 100).unwrap(), b"bc");
        assert!(read_range(&ctx, path, 3, 10).unwrap().is_empty());
        assert!(read_range(&ctx, path, 1000, 10).unwrap().is_empty());
    }

    #[test]
    fn test_sparse_write() {
        let (_dir, ctx) = setup();
        let path = Path::new("/sparse");
        fs::write(ctx.resolve(path).unwrap(), b"").unwrap();

        write_range(&ctx, path, 100, b"X").unwrap();

        let data = read_range(&ctx, path, 0, 101).unwrap();
        assert_eq!(data.len(), 101);
        assert!(data[..100].iter().all(|&b| b == 0));
        assert_eq!(data[100], b'X');
    }

    #[test]
    fn test_overwrite_middle() {
        let (_dir, ctx) = setup();
        let path = Path::new("/f");
        write_range(&ctx, path, 0, b"hello world").unwrap();
        write_range(&ctx, path, 6, b"WORLD").unwrap();
        write_range(&ctx, path, 11, b"!").unwrap();

        assert_eq!(read_range(&ctx, path, 0, 64).unwrap(), b"hello WORLD!");
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let (_dir, ctx) = setup();
        let result = read_range(&ctx, Path::new("/nope"), 0, 10);
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_write_into_missing_directory_is_not_found() {
        let (_dir, ctx) = setup();
        let result = write_range(&ctx, Path::new("/no/such/dir/file"), 0, b"x");
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_undecodable_file_fails_and_is_preserved() {
        let (dir, ctx) = setup();
        let backing = dir.path().join("garbage");
        fs::write(&backing, b"not an encoded blob at all, but long enough").unwrap();

        let read = read_range(&ctx, Path::new("/garbage"), 0, 10);
        assert!(matches!(read, Err(Error::Decode(_))));

        let write = write_range(&ctx, Path::new("/garbage"), 0, b"x");
        assert!(matches!(write, Err(Error::Decode(_))));
        assert_eq!(
            fs::read(&backing).unwrap(),
            b"not an encoded blob at all, but long enough"
        );
    }

    #[test]
    fn test_wrong_key_fails() {
        let (dir, ctx) = setup();
        write_range(&ctx, Path::new("/s"), 0, b"secret").unwrap();

        let other = MountContext::new(
            dir.path().to_path_buf(),
            MountKey::from_bytes(&[1u8; KEY_SIZE]).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            read_range(&other, Path::new("/s"), 0, 6),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_path_too_long_mutates_nothing() {
        let (dir, ctx) = setup();
        let long = format!("/{}", "n".repeat(crate::fs::resolver::MAX_PATH_LEN));

        let result = write_range(&ctx, Path::new(&long), 0, b"x");
        assert!(matches!(result, Err(Error::PathTooLong { .. })));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_overflowing_offset_rejected() {
        let (_dir, ctx) = setup();
        let result = write_range(&ctx, Path::new("/f"), u64::MAX, b"xy");
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_resize() {
        let (_dir, ctx) = setup();
        let path = Path::new("/r");
        write_range(&ctx, path, 0, b"abcdef").unwrap();

        resize(&ctx, path, 3).unwrap();
        assert_eq!(read_range(&ctx, path, 0, 10).unwrap(), b"abc");

        resize(&ctx, path, 5).unwrap();
        assert_eq!(read_range(&ctx, path, 0, 10).unwrap(), b"abc\0\0");

        resize(&ctx, path, 0).unwrap();
        assert!(read_range(&ctx, path, 0, 10).unwrap().is_empty());
    }

    #[test]
    fn test_huge_write_offset_fails_cleanly() {
        let (dir, ctx) = setup();
        let path = Path::new("/big");
        write_range(&ctx, path, 0, b"keep").unwrap();
        let before = fs::read(dir.path().join("big")).unwrap();

        let err = write_range(&ctx, path, 1u64 << 50, b"x").unwrap_err();
        assert_eq!(err.errno(), libc::EFBIG);

        assert_eq!(fs::read(dir.path().join("big")).unwrap(), before);
        assert_eq!(read_range(&ctx, path, 0, 10).unwrap(), b"keep");
        assert_eq!(dir_entries(dir.path()), vec!["big".to_string()]);
    }

    #[test]
    fn test_huge_resize_fails_cleanly() {
        let (dir, ctx) = setup();
        let path = Path::new("/big");
        write_range(&ctx, path, 0, b"keep").unwrap();

        let err = resize(&ctx, path, 1u64 << 50).unwrap_err();
        assert_eq!(err.errno(), libc::EFBIG);

        assert_eq!(read_range(&ctx, path, 0, 10).unwrap(), b"keep");
        assert_eq!(dir_entries(dir.path()), vec!["big".to_string()]);
    }

    #[test]
    fn test_grow_zero_fills() {
        let grown = grow(Zeroizing::new(b"ab".to_vec()), 5).unwrap();
        assert_eq!(&grown[..], b"ab\0\0\0");
        assert!(grown.capacity() >= 5);

        let same = grow(Zeroizing::new(b"abc".to_vec()), 2).unwrap();
        assert_eq!(&same[..], b"abc");
    }

    #[test]
    fn test_resize_missing_is_not_found() {
        let (_dir, ctx) = setup();
        assert!(matches!(
            resize(&ctx, Path::new("/none"), 4),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_interrupted_commit_keeps_old_content() {
        let (dir, ctx) = setup();
        let path = Path::new("/doc");
        write_range(&ctx, path, 0, b"old content").unwrap();
        let before = fs::read(dir.path().join("doc")).unwrap();

        let target = ctx.resolve(path).unwrap();
        let staged = StagedCommit::stage(&ctx, &target, b"new content").unwrap();

        // Staged but not renamed: readers still see the old blob
        assert_eq!(read_range(&ctx, path, 0, 64).unwrap(), b"old content");
        drop(staged);

        assert_eq!(fs::read(dir.path().join("doc")).unwrap(), before);
        assert_eq!(dir_entries(dir.path()), vec!["doc".to_string()]);
    }

    #[test]
    fn test_completed_commit_holds_new_content() {
        let (dir, ctx) = setup();
        let path = Path::new("/doc");
        write_range(&ctx, path, 0, b"old content").unwrap();

        let target = ctx.resolve(path).unwrap();
        let staged = StagedCommit::stage(&ctx, &target, b"new content").unwrap();
        assert_eq!(staged.target(), target.as_path());
        staged.commit().unwrap();

        assert_eq!(read_range(&ctx, path, 0, 64).unwrap(), b"new content");
        assert_eq!(dir_entries(dir.path()), vec!["doc".to_string()]);
    }

    #[test]
    fn test_rewrite_preserves_permissions() {
        let (dir, ctx) = setup();
        let backing = dir.path().join("mode");
        fs::write(&backing, b"").unwrap();
        fs::set_permissions(&backing, fs::Permissions::from_mode(0o640)).unwrap();

        write_range(&ctx, Path::new("/mode"), 0, b"data").unwrap();

        let mode = fs::metadata(&backing).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }
}
