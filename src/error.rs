//! Error types for cryptmirror

use std::io;
use std::path::Path;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the content path, configuration and key handling
#[derive(Error, Debug)]
pub enum Error {
    /// Backing file or directory does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backing store refused access
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Resolved backing path exceeds the platform limit
    #[error("Path too long: {len} bytes exceeds limit of {max}")]
    PathTooLong { len: usize, max: usize },

    /// Ciphertext could not be decoded under the mount key
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Underlying storage operation failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Offset or size out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration file could not be read or written
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration values are unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Passphrase could not be turned into a key
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify an I/O error raised while touching `path`.
    ///
    /// Missing files and permission failures get their own variants so the
    /// transaction layer can report them without inspecting `io::ErrorKind`.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            io::ErrorKind::PermissionDenied => {
                Error::PermissionDenied(path.display().to_string())
            }
            _ => Error::Io(err),
        }
    }

    /// Convert to the errno reported to the kernel
    pub fn errno(&self) -> libc::c_int {
        match self {
            Error::NotFound(_) => libc::ENOENT,
            Error::PermissionDenied(_) => libc::EACCES,
            Error::PathTooLong { .. } => libc::ENAMETOOLONG,
            Error::Decode(_) => libc::EIO,
            Error::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            Error::InvalidArgument(_) => libc::EINVAL,
            Error::Config(_)
            | Error::InvalidConfig(_)
            | Error::KeyDerivation(_)
            | Error::Internal(_) => libc::EIO,
        }
    }
}
