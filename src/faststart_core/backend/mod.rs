use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::faststart_core::drive::DriveError;
use crate::faststart_core::item::FileItem;
use crate::faststart_core::probe::MediaInfo;

mod sink;
mod source;


pub use sink::{DriveSink, LocalSink};
pub use source::{DriveSource, LocalSource};

#[derive(Debug, Error)]
pub enum WalkError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Drive(#[from] DriveError),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unknown item: {0}")]
    UnknownItem(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Drive(#[from] DriveError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("uploaded hash {uploaded} does not match local hash {local}")]
    HashMismatch { local: String, uploaded: String },
    #[error("node {0} has no parent to upload into")]
    MissingParent(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Drive(#[from] DriveError),
}

pub type WalkStream<'a> = Box<dyn Iterator<Item = Result<FileItem, WalkError>> + Send + 'a>;

/// Where candidate files come from.
pub trait SourceBackend: Send + Sync {
    /// Lazily yield every regular file under the given roots, each exactly
    /// once. Trashed remote items are skipped.
    fn walk<'a>(&'a self, roots: &'a [PathBuf]) -> WalkStream<'a>;

    /// Materialize the item's bytes inside `dest_dir` and return the written
    /// path.
    fn fetch(&self, item: &FileItem, dest_dir: &Path) -> Result<PathBuf, FetchError>;
}

/// Where finished artifacts go.
pub trait SinkBackend: Send + Sync {
    /// Store `local_path` as the new artifact for `origin`. The returned
    /// descriptor keeps `origin`'s id when the artifact replaces it in
    /// place.
    fn store(
        &self,
        local_path: &Path,
        origin: &FileItem,
        media_info: &MediaInfo,
    ) -> Result<FileItem, StoreError>;

    /// Bytes counted against the rolling daily upload quota.
    fn quota_used(&self) -> u64;
}
