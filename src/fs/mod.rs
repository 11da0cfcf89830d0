//! Encrypted passthrough filesystem
//!
//! Path resolution, content transactions and the FUSE adaptor that maps
//! kernel requests onto them.

pub mod attr;
mod context;
mod filesystem;
mod inode;
mod resolver;
pub mod transaction;
pub mod xattr;

pub use context::MountContext;
pub use filesystem::{CryptFs, DirEntry, SetAttr};
pub use inode::{InodeTable, ROOT_INO};
pub use resolver::{PathResolver, MAX_PATH_LEN};
pub use transaction::{read_range, resize, write_range, StagedCommit, TEMP_PREFIX};
