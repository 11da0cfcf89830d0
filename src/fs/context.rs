//! Mount context shared by every content transaction

use crate::crypto::MountKey;
use crate::error::Result;
use crate::fs::PathResolver;
use std::path::{Path, PathBuf};

/// Backing root and key material, fixed for the life of a mount.
///
/// Nothing mutates a context after construction; transactions take it by
/// shared reference.
#[derive(Debug, Clone)]
pub struct MountContext {
    resolver: PathResolver,
    key: MountKey,
}

impl MountContext {
    /// Create a context for an absolute backing root
    pub fn new(root: PathBuf, key: MountKey) -> Result<Self> {
        Ok(Self {
            resolver: PathResolver::new(root)?,
            key,
        })
    }

    /// Backing directory root
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    /// Resolve a virtual path to its backing path
    pub fn resolve(&self, virtual_path: &Path) -> Result<PathBuf> {
        self.resolver.resolve(virtual_path)
    }

    /// Content key material
    pub fn key(&self) -> &MountKey {
        &self.key
    }
}
