use std::collections::HashMap;
use std::fs;
use std::iter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use filetime::FileTime;
use tracing::info;
use walkdir::WalkDir;

use super::{FetchError, SourceBackend, WalkError, WalkStream};
use crate::faststart_core::drive::Drive;
use crate::faststart_core::item::FileItem;
use crate::sync_ext::MutexExt;

/// Source over the local filesystem. Walking records each item's path so a
/// later fetch can resolve the opaque id back to a file.
#[derive(Default)]
pub struct LocalSource {
    paths: Mutex<HashMap<String, PathBuf>>,
}

impl LocalSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn describe(&self, path: &Path) -> Result<FileItem, WalkError> {
        let item = FileItem::from_local_path(path)?;
        self.paths
            .lock_unpoisoned()
            .insert(item.id.clone(), path.to_path_buf());
        Ok(item)
    }

    fn walk_root<'a>(&'a self, root: &'a Path) -> WalkStream<'a> {
        if !root.exists() {
            return Box::new(iter::empty());
        }
        if root.is_file() {
            return Box::new(iter::once(self.describe(root)));
        }
        Box::new(
            WalkDir::new(root)
                .sort_by_file_name()
                .into_iter()
                .filter_map(move |entry| match entry {
                    Ok(entry) if entry.file_type().is_file() => Some(self.describe(entry.path())),
                    Ok(_) => None,
                    Err(err) => Some(Err(WalkError::from(err))),
                }),
        )
    }
}

impl SourceBackend for LocalSource {
    fn walk<'a>(&'a self, roots: &'a [PathBuf]) -> WalkStream<'a> {
        Box::new(roots.iter().flat_map(move |root| self.walk_root(root)))
    }

    fn fetch(&self, item: &FileItem, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        let src = self
            .paths
            .lock_unpoisoned()
            .get(&item.id)
            .cloned()
            .ok_or_else(|| FetchError::UnknownItem(item.id.clone()))?;
        let dest = dest_dir.join(&item.name);
        fs::copy(&src, &dest)?;
        let mtime = FileTime::from_last_modification_time(&src.metadata()?);
        filetime::set_file_mtime(&dest, mtime)?;
        Ok(dest)
    }
}

/// Source over the remote drive.
pub struct DriveSource {
    drive: Arc<dyn Drive>,
}

impl DriveSource {
    pub fn new(drive: Arc<dyn Drive>) -> Self {
        Self { drive }
    }

    fn walk_root<'a>(&'a self, root: &'a Path) -> WalkStream<'a> {
        let root_node = match self.drive.get_node_by_path(root) {
            Ok(Some(node)) => node,
            Ok(None) => return Box::new(iter::empty()),
            Err(err) => return Box::new(iter::once(Err(WalkError::from(err)))),
        };
        match self.drive.walk(&root_node) {
            Ok(nodes) => Box::new(
                nodes
                    .into_iter()
                    .filter(|node| !node.is_folder)
                    .map(|node| Ok(FileItem::from(&node))),
            ),
            Err(err) => Box::new(iter::once(Err(WalkError::from(err)))),
        }
    }
}

impl SourceBackend for DriveSource {
    fn walk<'a>(&'a self, roots: &'a [PathBuf]) -> WalkStream<'a> {
        Box::new(roots.iter().flat_map(move |root| self.walk_root(root)))
    }

    fn fetch(&self, item: &FileItem, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        let node = self.drive.get_node_by_id(&item.id)?;
        info!("downloading {}", item.name);
        let path = self.drive.download(&node, dest_dir)?;
        info!("downloaded {}", item.name);
        Ok(path)
    }
}
