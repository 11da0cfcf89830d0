//! Virtual path to backing path resolution

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Longest backing path accepted, in bytes (PATH_MAX includes the NUL)
pub const MAX_PATH_LEN: usize = libc::PATH_MAX as usize - 1;

/// Maps virtual paths under the mount point onto the backing directory
#[derive(Debug, Clone)]
pub struct PathResolver {
    /// Absolute backing root without trailing slash; empty when the root is `/`
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver for an absolute backing root
    pub fn new(root: PathBuf) -> Result<Self> {
        if !root.is_absolute() {
            return Err(Error::InvalidArgument(format!(
                "backing root must be absolute: {}",
                root.display()
            )));
        }

        let bytes = root.as_os_str().as_bytes();
        let trimmed = match bytes.iter().rposition(|&b| b != b'/') {
            Some(last) => &bytes[..=last],
            None => &bytes[..0],
        };
        let root = PathBuf::from(std::ffi::OsStr::from_bytes(trimmed));

        Ok(Self { root })
    }

    /// Get the root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an absolute virtual path to its backing path.
    ///
    /// The result is the byte concatenation of root and virtual path, so
    /// distinct virtual paths always land on distinct backing paths.
    pub fn resolve(&self, virtual_path: &Path) -> Result<PathBuf> {
        let tail = virtual_path.as_os_str().as_bytes();
        if tail.first() != Some(&b'/') {
            return Err(Error::InvalidArgument(format!(
                "virtual path must be absolute: {}",
                virtual_path.display()
            )));
        }

        let len = self.root.as_os_str().len() + tail.len();
        if len > MAX_PATH_LEN {
            return Err(Error::PathTooLong {
                len,
                max: MAX_PATH_LEN,
            });
        }

        let mut full = OsString::with_capacity(len);
        full.push(self.root.as_os_str());
        full.push(virtual_path.as_os_str());
        Ok(PathBuf::from(full))
    }
}
