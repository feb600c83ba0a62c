use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::{Change, Drive, DriveError, MoveRequest, Node};
use crate::faststart_core::item::guess_mime_type;
use crate::faststart_core::probe::MediaInfo;
use crate::sync_ext::MutexExt;

const ROOT_ID: &str = "fs-root";
const TRASH_DIRNAME: &str = ".trash";
const FOLDER_MIME: &str = "inode/directory";

/// Drive client rooted at a local directory. Node ids stay stable across
/// renames within a session, trashing moves files under `.trash/`, and the
/// change feed reports every mutation made through the client.
pub struct FsDrive {
    root: PathBuf,
    state: Mutex<DriveState>,
}

struct DriveState {
    nodes: HashMap<String, FsNode>,
    changes: Vec<Change>,
    uploads: Vec<(DateTime<Utc>, u64)>,
}

#[derive(Debug, Clone, Default)]
struct FsNode {
    rel_path: PathBuf,
    is_folder: bool,
    trashed: bool,
    /// Location before the node was trashed, for restores.
    pre_trash_rel: Option<PathBuf>,
    hash: Option<String>,
    #[allow(dead_code)]
    media_info: Option<MediaInfo>,
}

impl FsDrive {
    pub fn open(root: &Path) -> Result<Self, DriveError> {
        let root = root.canonicalize()?;
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_ID.to_string(),
            FsNode {
                is_folder: true,
                ..FsNode::default()
            },
        );
        for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| DriveError::Io(io::Error::other(e)))?;
            let rel = entry
                .path()
                .strip_prefix(&root)
                .expect("walked path is under the root")
                .to_path_buf();
            if rel.starts_with(TRASH_DIRNAME) {
                continue;
            }
            let id = node_id_for(&rel, &nodes);
            nodes.insert(
                id,
                FsNode {
                    rel_path: rel,
                    is_folder: entry.file_type().is_dir(),
                    ..FsNode::default()
                },
            );
        }
        Ok(Self {
            root,
            state: Mutex::new(DriveState {
                nodes,
                changes: Vec::new(),
                uploads: Vec::new(),
            }),
        })
    }

    fn abs_path(&self, node: &FsNode) -> PathBuf {
        self.root.join(&node.rel_path)
    }

    fn build_node(&self, id: &str, fs_node: &FsNode, nodes: &HashMap<String, FsNode>) -> Node {
        let abs = self.abs_path(fs_node);
        let size = if fs_node.is_folder {
            0
        } else {
            abs.metadata().map(|m| m.len()).unwrap_or(0)
        };
        let name = fs_node
            .rel_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = if fs_node.is_folder {
            FOLDER_MIME.to_string()
        } else {
            guess_mime_type(&fs_node.rel_path)
        };
        Node {
            id: id.to_string(),
            parent_id: parent_id_of(fs_node, nodes),
            name,
            mime_type,
            size,
            hash: fs_node.hash.clone(),
            is_folder: fs_node.is_folder,
            trashed: fs_node.trashed,
        }
    }
}

impl Drive for FsDrive {
    fn walk(&self, root: &Node) -> Result<Vec<Node>, DriveError> {
        let state = self.state.lock_unpoisoned();
        let root_node = state
            .nodes
            .get(&root.id)
            .ok_or_else(|| DriveError::NodeNotFound(root.id.clone()))?;
        if !root_node.is_folder {
            return Err(DriveError::NotAFolder(root.id.clone()));
        }
        let root_rel = root_node.rel_path.clone();
        let mut found: Vec<(&String, &FsNode)> = state
            .nodes
            .iter()
            .filter(|(id, n)| {
                !n.trashed && id.as_str() != root.id && n.rel_path.starts_with(&root_rel)
            })
            .collect();
        found.sort_by(|a, b| a.1.rel_path.cmp(&b.1.rel_path));
        Ok(found
            .into_iter()
            .map(|(id, n)| self.build_node(id, n, &state.nodes))
            .collect())
    }

    fn get_node_by_path(&self, path: &Path) -> Result<Option<Node>, DriveError> {
        let rel = normalize_drive_path(path);
        let state = self.state.lock_unpoisoned();
        Ok(state
            .nodes
            .iter()
            .find(|(_, n)| !n.trashed && n.rel_path == rel)
            .map(|(id, n)| self.build_node(id, n, &state.nodes)))
    }

    fn get_node_by_id(&self, id: &str) -> Result<Node, DriveError> {
        let state = self.state.lock_unpoisoned();
        let fs_node = state
            .nodes
            .get(id)
            .ok_or_else(|| DriveError::NodeNotFound(id.to_string()))?;
        Ok(self.build_node(id, fs_node, &state.nodes))
    }

    fn move_node(&self, id: &str, request: &MoveRequest) -> Result<Node, DriveError> {
        let mut state = self.state.lock_unpoisoned();
        let fs_node = state
            .nodes
            .get(id)
            .ok_or_else(|| DriveError::NodeNotFound(id.to_string()))?
            .clone();

        let mut dest_rel = fs_node.rel_path.clone();
        let mut trashed = fs_node.trashed;
        let mut pre_trash_rel = fs_node.pre_trash_rel.clone();

        if let Some(parent_id) = &request.new_parent_id {
            let parent = state
                .nodes
                .get(parent_id)
                .ok_or_else(|| DriveError::NodeNotFound(parent_id.clone()))?;
            if !parent.is_folder {
                return Err(DriveError::NotAFolder(parent_id.clone()));
            }
            let name = dest_rel.file_name().map(PathBuf::from).unwrap_or_default();
            dest_rel = parent.rel_path.join(name);
        }
        if let Some(name) = &request.new_name {
            dest_rel = dest_rel
                .parent()
                .map(|p| p.join(name))
                .unwrap_or_else(|| PathBuf::from(name));
        }
        match request.trashed {
            Some(true) if !trashed => {
                let name = dest_rel
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                pre_trash_rel = Some(dest_rel.clone());
                dest_rel = PathBuf::from(TRASH_DIRNAME).join(format!("{id}__{name}"));
                trashed = true;
            }
            Some(false) if trashed => {
                dest_rel = pre_trash_rel
                    .take()
                    .ok_or_else(|| DriveError::NodeNotFound(id.to_string()))?;
                trashed = false;
            }
            _ => {}
        }

        if dest_rel != fs_node.rel_path {
            let src = self.root.join(&fs_node.rel_path);
            let dst = self.root.join(&dest_rel);
            if dst.exists() {
                return Err(DriveError::Conflict(dest_rel.to_string_lossy().into_owned()));
            }
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&src, &dst)?;
        }

        let entry = state.nodes.get_mut(id).expect("node id checked above");
        entry.rel_path = dest_rel;
        entry.trashed = trashed;
        entry.pre_trash_rel = pre_trash_rel;

        let node = self.build_node(id, &state.nodes[id].clone(), &state.nodes);
        if trashed {
            state.changes.push(Change::Removed(id.to_string()));
        } else {
            state.changes.push(Change::Upsert(node.clone()));
        }
        Ok(node)
    }

    fn sync(&self) -> Result<Vec<Change>, DriveError> {
        let mut state = self.state.lock_unpoisoned();
        Ok(std::mem::take(&mut state.changes))
    }

    fn upload(
        &self,
        local_path: &Path,
        parent_id: &str,
        _mime_type: Option<&str>,
        media_info: Option<&MediaInfo>,
    ) -> Result<Node, DriveError> {
        let mut state = self.state.lock_unpoisoned();
        let parent = state
            .nodes
            .get(parent_id)
            .ok_or_else(|| DriveError::NodeNotFound(parent_id.to_string()))?;
        if !parent.is_folder {
            return Err(DriveError::NotAFolder(parent_id.to_string()));
        }
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let rel = parent.rel_path.join(&name);
        let dest = self.root.join(&rel);
        if dest.exists() {
            return Err(DriveError::Conflict(rel.to_string_lossy().into_owned()));
        }
        let size = fs::copy(local_path, &dest)?;
        let hash = hash_file(&dest)?;

        let id = node_id_for(&rel, &state.nodes);
        state.nodes.insert(
            id.clone(),
            FsNode {
                rel_path: rel,
                hash: Some(hash),
                media_info: media_info.cloned(),
                ..FsNode::default()
            },
        );
        state.uploads.push((Utc::now(), size));

        let node = self.build_node(&id, &state.nodes[&id].clone(), &state.nodes);
        state.changes.push(Change::Upsert(node.clone()));
        Ok(node)
    }

    fn download(&self, node: &Node, dest_dir: &Path) -> Result<PathBuf, DriveError> {
        let src = {
            let state = self.state.lock_unpoisoned();
            let fs_node = state
                .nodes
                .get(&node.id)
                .ok_or_else(|| DriveError::NodeNotFound(node.id.clone()))?;
            self.abs_path(fs_node)
        };
        let dest = dest_dir.join(&node.name);
        fs::copy(&src, &dest)?;
        Ok(dest)
    }

    fn file_hash(&self, local_path: &Path) -> Result<String, DriveError> {
        hash_file(local_path).map_err(DriveError::Io)
    }

    fn daily_usage(&self) -> Result<u64, DriveError> {
        let mut state = self.state.lock_unpoisoned();
        let horizon = Utc::now() - TimeDelta::hours(24);
        state.uploads.retain(|(at, _)| *at > horizon);
        Ok(state.uploads.iter().map(|(_, size)| size).sum())
    }
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Stable id from the node's path at creation time; suffixed when a later
/// node reuses the path of an earlier, since-renamed one.
fn node_id_for(rel: &Path, nodes: &HashMap<String, FsNode>) -> String {
    let digest = Sha256::digest(rel.to_string_lossy().as_bytes());
    let base = format!("fs-{}", &hex::encode(digest)[..16]);
    if !nodes.contains_key(&base) {
        return base;
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !nodes.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn parent_id_of(fs_node: &FsNode, nodes: &HashMap<String, FsNode>) -> Option<String> {
    let parent_rel = fs_node.rel_path.parent()?;
    nodes
        .iter()
        .find(|(_, n)| n.is_folder && !n.trashed && n.rel_path == parent_rel)
        .map(|(id, _)| id.clone())
}

fn normalize_drive_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}
