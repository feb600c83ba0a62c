use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use filetime::FileTime;
use tracing::{debug, error, info, warn};

use super::{SinkBackend, StoreError};
use crate::faststart_core::drive::{Drive, MoveRequest, Node};
use crate::faststart_core::item::FileItem;
use crate::faststart_core::probe::MediaInfo;

const SYNC_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Sink that copies artifacts into a local output directory. The origin
/// descriptor is returned unchanged, so the cache keeps tracking the source
/// item.
pub struct LocalSink {
    output_dir: PathBuf,
}

impl LocalSink {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }
}

impl SinkBackend for LocalSink {
    fn store(
        &self,
        local_path: &Path,
        origin: &FileItem,
        _media_info: &MediaInfo,
    ) -> Result<FileItem, StoreError> {
        fs::create_dir_all(&self.output_dir)?;
        let name = local_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(&origin.name));
        let dest = self.output_dir.join(name);
        info!("copying {} -> {}", local_path.display(), dest.display());
        fs::copy(local_path, &dest)?;
        let mtime = FileTime::from_last_modification_time(&local_path.metadata()?);
        filetime::set_file_mtime(&dest, mtime)?;
        info!("copied to {}", dest.display());
        Ok(origin.clone())
    }

    fn quota_used(&self) -> u64 {
        0
    }
}

/// Sink that uploads artifacts to the remote drive. In same-location mode the
/// artifact replaces its origin through a rename, upload, verify, delete
/// sequence, with the rename rolled back when anything after it fails.
pub struct DriveSink {
    drive: Arc<dyn Drive>,
    same_location: bool,
}

impl DriveSink {
    pub fn new(drive: Arc<dyn Drive>, same_location: bool) -> Self {
        Self {
            drive,
            same_location,
        }
    }

    fn store_same_location(
        &self,
        local_path: &Path,
        origin: &Node,
        media_info: &MediaInfo,
    ) -> Result<FileItem, StoreError> {
        self.rename_remote(origin)?;
        match self.upload_verify_swap(local_path, origin, media_info) {
            Ok(node) => Ok(FileItem::from(&node)),
            Err(err) => {
                error!("upload error for {}: {err}", origin.name);
                if let Err(restore_err) = self.restore_remote(origin) {
                    error!("failed to restore name of {}: {restore_err}", origin.name);
                }
                Err(err)
            }
        }
    }

    fn store_different_location(
        &self,
        local_path: &Path,
        origin: &Node,
        media_info: &MediaInfo,
    ) -> Result<FileItem, StoreError> {
        let uploaded = self.upload(local_path, origin, media_info)?;
        self.verify(local_path, &uploaded)?;
        Ok(FileItem::from(origin))
    }

    fn upload_verify_swap(
        &self,
        local_path: &Path,
        origin: &Node,
        media_info: &MediaInfo,
    ) -> Result<Node, StoreError> {
        let uploaded = self.upload(local_path, origin, media_info)?;
        self.verify(local_path, &uploaded)?;
        self.delete_remote(origin)?;
        Ok(uploaded)
    }

    fn upload(
        &self,
        local_path: &Path,
        origin: &Node,
        media_info: &MediaInfo,
    ) -> Result<Node, StoreError> {
        let parent_id = origin
            .parent_id
            .as_deref()
            .ok_or_else(|| StoreError::MissingParent(origin.id.clone()))?;
        info!("uploading {}", local_path.display());
        let mime_type = mime_guess::from_path(local_path).first_raw();
        let node = self
            .drive
            .upload(local_path, parent_id, mime_type, Some(media_info))?;
        info!("uploaded {}", node.id);
        Ok(node)
    }

    fn verify(&self, local_path: &Path, uploaded: &Node) -> Result<(), StoreError> {
        info!("verifying {}", local_path.display());
        let local_hash = self.drive.file_hash(local_path)?;
        if uploaded.hash.as_deref() != Some(local_hash.as_str()) {
            info!("removing {}", uploaded.name);
            self.drive.move_node(&uploaded.id, &MoveRequest::trash())?;
            info!("removed {}", uploaded.name);
            return Err(StoreError::HashMismatch {
                local: local_hash,
                uploaded: uploaded.hash.clone().unwrap_or_default(),
            });
        }
        debug!("verified {local_hash}");
        Ok(())
    }

    fn rename_remote(&self, origin: &Node) -> Result<(), StoreError> {
        self.drive
            .move_node(&origin.id, &MoveRequest::rename(format!("__{}", origin.name)))?;
        debug!("confirming rename");
        loop {
            self.drain_sync()?;
            let node = self.drive.get_node_by_id(&origin.id)?;
            if node.name != origin.name {
                break;
            }
            thread::sleep(SYNC_POLL_INTERVAL);
        }
        debug!("rename confirmed");
        Ok(())
    }

    fn restore_remote(&self, origin: &Node) -> Result<(), StoreError> {
        self.drive
            .move_node(&origin.id, &MoveRequest::rename(origin.name.clone()))?;
        debug!("confirming restore");
        loop {
            self.drain_sync()?;
            let node = self.drive.get_node_by_id(&origin.id)?;
            if node.name == origin.name {
                break;
            }
            thread::sleep(SYNC_POLL_INTERVAL);
        }
        debug!("restore confirmed");
        Ok(())
    }

    fn delete_remote(&self, origin: &Node) -> Result<(), StoreError> {
        info!("removing {}", origin.name);
        self.drive.move_node(&origin.id, &MoveRequest::trash())?;
        self.drain_sync()?;
        info!("removed {}", origin.name);
        Ok(())
    }

    fn drain_sync(&self) -> Result<(), StoreError> {
        for change in self.drive.sync()? {
            debug!("sync change: {change:?}");
        }
        Ok(())
    }
}

impl SinkBackend for DriveSink {
    fn store(
        &self,
        local_path: &Path,
        origin: &FileItem,
        media_info: &MediaInfo,
    ) -> Result<FileItem, StoreError> {
        let origin_node = self.drive.get_node_by_id(&origin.id)?;
        if self.same_location {
            self.store_same_location(local_path, &origin_node, media_info)
        } else {
            self.store_different_location(local_path, &origin_node, media_info)
        }
    }

    fn quota_used(&self) -> u64 {
        match self.drive.daily_usage() {
            Ok(used) => used,
            Err(err) => {
                // An unreadable quota counts as exhausted.
                warn!("could not read daily usage: {err}");
                u64::MAX
            }
        }
    }
}
