use std::hash::{Hash, Hasher};
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Uniform descriptor of a source file. Two items are the same file iff their
/// ids are equal; the id doubles as the migration-cache key.
#[derive(Debug, Clone)]
pub struct FileItem {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

impl FileItem {
    /// Describe a local file. The id is the hex-encoded SHA-256 of the
    /// absolute path, so moving a file changes its identity.
    pub fn from_local_path(path: &Path) -> io::Result<Self> {
        let metadata = path.metadata()?;
        let id = hex::encode(Sha256::digest(path.to_string_lossy().as_bytes()));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = guess_mime_type(path);
        Ok(Self {
            id,
            name,
            mime_type,
            size: metadata.len(),
        })
    }
}

impl PartialEq for FileItem {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FileItem {}

impl Hash for FileItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

pub(crate) fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(OCTET_STREAM)
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn local_item_id_is_stable_per_path() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("clip.mp4");
        fs::write(&path, b"0123").expect("write clip");

        let a = FileItem::from_local_path(&path).expect("describe clip");
        let b = FileItem::from_local_path(&path).expect("describe clip again");
        assert_eq!(a, b);
        assert_eq!(a.id.len(), 64);
        assert_eq!(a.name, "clip.mp4");
        assert_eq!(a.mime_type, "video/mp4");
        assert_eq!(a.size, 4);
    }

    #[test]
    fn unknown_extension_falls_back_to_octet_stream() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("blob.qqq");
        fs::write(&path, b"x").expect("write blob");

        let item = FileItem::from_local_path(&path).expect("describe blob");
        assert_eq!(item.mime_type, OCTET_STREAM);
    }

    #[test]
    fn equality_ignores_everything_but_id() {
        let a = FileItem {
            id: "same".to_string(),
            name: "a.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            size: 1,
        };
        let b = FileItem {
            id: "same".to_string(),
            name: "b.mkv".to_string(),
            mime_type: "video/x-matroska".to_string(),
            size: 2,
        };
        assert_eq!(a, b);
    }
}
