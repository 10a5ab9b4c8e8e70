//! Resolved artifact references
//!
//! A `TargetInfo` is what a port resolution produces: the owning task plus a
//! concrete location. The external engine uses `exists()` to decide whether
//! the owning task needs to run at all.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::task::TaskRef;

/// Immutable reference to a concrete artifact: owning task + location.
///
/// Equality and ordering are by (owner, location).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetInfo {
    /// Task that produces this artifact
    pub owner: TaskRef,
    /// Location identifier (a filesystem path for local targets)
    pub location: Arc<str>,
}

impl TargetInfo {
    pub fn new(owner: TaskRef, location: impl Into<Arc<str>>) -> Self {
        Self {
            owner,
            location: location.into(),
        }
    }

    /// Location as a filesystem path
    pub fn path(&self) -> &Path {
        Path::new(&*self.location)
    }

    /// Whether the artifact already exists (engine skip check)
    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Open the artifact for reading
    pub fn open(&self) -> io::Result<File> {
        File::open(self.path())
    }

    /// Create (or truncate) the artifact for writing
    pub fn create(&self) -> io::Result<File> {
        File::create(self.path())
    }
}

impl std::fmt::Display for TargetInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.owner, self.location)
    }
}
