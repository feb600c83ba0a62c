use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::faststart_core::item::FileItem;
use crate::faststart_core::probe::MediaInfo;

mod fs;


pub use fs::FsDrive;

pub const DRIVE_ROOT_ENV: &str = "FASTSTART_DRIVE_ROOT";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("no drive configured; set {DRIVE_ROOT_ENV} to the drive root directory")]
    NotConfigured,
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("destination already exists: {0}")]
    Conflict(String),
    #[error("not a folder: {0}")]
    NotAFolder(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One entry of the drive's namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    /// Content hash in the drive-dictated algorithm; populated for uploads.
    pub hash: Option<String>,
    pub is_folder: bool,
    pub trashed: bool,
}

#[derive(Debug, Clone)]
pub enum Change {
    Upsert(Node),
    Removed(String),
}

/// A single mutation of a node's location, name, or trash state.
#[derive(Debug, Clone, Default)]
pub struct MoveRequest {
    pub new_parent_id: Option<String>,
    pub new_name: Option<String>,
    pub trashed: Option<bool>,
}

impl MoveRequest {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            new_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn trash() -> Self {
        Self {
            trashed: Some(true),
            ..Self::default()
        }
    }
}

/// Blocking client for a remote drive. All engine traffic to the remote goes
/// through this seam; implementations must be shareable across worker
/// threads.
pub trait Drive: Send + Sync {
    /// All descendants of `root`, excluding trashed nodes, in the order the
    /// drive emits them.
    fn walk(&self, root: &Node) -> Result<Vec<Node>, DriveError>;

    fn get_node_by_path(&self, path: &Path) -> Result<Option<Node>, DriveError>;

    fn get_node_by_id(&self, id: &str) -> Result<Node, DriveError>;

    fn move_node(&self, id: &str, request: &MoveRequest) -> Result<Node, DriveError>;

    /// Changes since the previous `sync` call.
    fn sync(&self) -> Result<Vec<Change>, DriveError>;

    fn upload(
        &self,
        local_path: &Path,
        parent_id: &str,
        mime_type: Option<&str>,
        media_info: Option<&MediaInfo>,
    ) -> Result<Node, DriveError>;

    fn download(&self, node: &Node, dest_dir: &Path) -> Result<PathBuf, DriveError>;

    /// Hash of a local file using the same algorithm the drive reports for
    /// its nodes.
    fn file_hash(&self, local_path: &Path) -> Result<String, DriveError>;

    /// Bytes uploaded in the trailing 24 hours.
    fn daily_usage(&self) -> Result<u64, DriveError>;
}

impl From<&Node> for FileItem {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            mime_type: node.mime_type.clone(),
            size: node.size,
        }
    }
}

/// Open the drive named by the environment. The production connector is
/// deployed separately; a directory-rooted drive covers staging and tests.
pub fn open_default_drive() -> Result<Arc<dyn Drive>, DriveError> {
    match std::env::var_os(DRIVE_ROOT_ENV) {
        Some(root) => Ok(Arc::new(FsDrive::open(Path::new(&root))?)),
        None => Err(DriveError::NotConfigured),
    }
}
