//! cryptmirror - mirror a directory through FUSE with encrypted contents
//!
//! The backing directory keeps its layout and names. Only regular file
//! contents are transformed: each file is stored as one encrypted blob and
//! rewritten atomically on every change.

pub mod config;
pub mod crypto;
pub mod error;
pub mod fs;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crypto::MountKey;
    pub use crate::error::{Error, Result};
    pub use crate::fs::{CryptFs, MountContext};
}
