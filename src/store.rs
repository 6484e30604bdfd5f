// Result store: owns the local `results/` tree. Workflows only ever append
// to it; nothing is read back. Path construction for every persisted
// artifact lives here so the on-disk layout is defined in one place.

use crate::error::ClientError;
use chrono::Local;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Filename timestamp, seconds resolution, local time.
pub fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// RFC 3339 wall-clock time for audit record fields.
pub fn now_iso() -> String {
    Local::now().to_rfc3339()
}

pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ResultStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.root.join("videos")
    }

    /// Wipe any previous results and recreate the base layout. Safe to
    /// call when the tree does not exist, and safe to call twice.
    pub fn reset(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        fs::create_dir_all(self.images_dir())
    }

    pub fn ensure_images(&self) -> io::Result<PathBuf> {
        let dir = self.images_dir();
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// The videos subtree is only created when a video workflow runs.
    pub fn ensure_videos(&self) -> io::Result<PathBuf> {
        let dir = self.videos_dir();
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn original_copy_path(&self, name: &str, stamp: &str) -> PathBuf {
        unique(self.images_dir().join(format!("original_{}_{}.png", name, stamp)))
    }

    pub fn processed_image_path(&self, name: &str, stamp: &str) -> PathBuf {
        unique(self.images_dir().join(format!("processed_{}_{}.png", name, stamp)))
    }

    pub fn single_result_path(&self, name: &str, stamp: &str) -> PathBuf {
        unique(self.root.join(format!("result_{}_{}.json", name, stamp)))
    }

    pub fn batch_result_path(&self, folder: &str, stamp: &str) -> PathBuf {
        unique(self.root.join(format!("batch_result_{}_{}.json", folder, stamp)))
    }

    pub fn denoised_video_path(&self, name: &str, stamp: &str) -> PathBuf {
        unique(self.videos_dir().join(format!("denoised_{}_{}.mp4", name, stamp)))
    }

    pub fn video_result_path(&self, name: &str, stamp: &str) -> PathBuf {
        unique(self.root.join(format!("video_result_{}_{}.json", name, stamp)))
    }

    /// Persist an audit record as pretty-printed JSON.
    pub fn write_json<T: Serialize>(&self, path: &Path, record: &T) -> Result<(), ClientError> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, record)?;
        Ok(())
    }
}

/// Collision guard: filename stamps have seconds resolution, so two calls
/// within the same second would otherwise silently overwrite each other.
/// If the target exists, pick `name_2`, `name_3`, ... instead.
fn unique(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("result")
        .to_string();
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_string();
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
    for n in 2.. {
        let candidate = if ext.is_empty() {
            parent.join(format!("{}_{}", stem, n))
        } else {
            parent.join(format!("{}_{}.{}", stem, n, ext))
        };
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(tmp.path().join("results"));
        store.reset().unwrap();
        assert!(store.images_dir().is_dir());
        // leftover file from a previous run must be wiped
        fs::write(store.root().join("stale.json"), b"{}").unwrap();
        store.reset().unwrap();
        assert!(store.images_dir().is_dir());
        assert!(!store.root().join("stale.json").exists());
    }

    #[test]
    fn videos_dir_created_on_demand() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(tmp.path().join("results"));
        store.reset().unwrap();
        assert!(!store.videos_dir().exists());
        store.ensure_videos().unwrap();
        assert!(store.videos_dir().is_dir());
    }

    #[test]
    fn timestamp_is_compact_datetime() {
        let stamp = timestamp();
        assert_eq!(stamp.len(), 15);
        assert_eq!(&stamp[8..9], "_");
        assert!(stamp.chars().filter(|c| *c != '_').all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn collision_guard_suffixes_existing_names() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(tmp.path().join("results"));
        store.reset().unwrap();
        let first = store.single_result_path("img", "20260101_120000");
        fs::write(&first, b"{}").unwrap();
        let second = store.single_result_path("img", "20260101_120000");
        assert_ne!(first, second);
        assert!(second
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("result_img_20260101_120000_2"));
        fs::write(&second, b"{}").unwrap();
        assert!(first.exists() && second.exists());
    }
}
