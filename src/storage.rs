//! Backing storage for cached files.
//!
//! The cache never reads file contents. It only asks whether a file exists,
//! how large it is, deletes it on eviction and enumerates the result tree at
//! warm start. [`FsStorage`] does this on a real directory, [`MemoryStorage`]
//! keeps an in-memory table for tests and trace replay.

use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// A file found while enumerating storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Path relative to the storage root, used as the cache key.
    pub name: String,
    pub path: PathBuf,
}

pub trait Storage: Send + Sync {
    fn file_exists(&self, path: &Path) -> bool;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn file_size(&self, path: &Path) -> io::Result<u64>;

    /// Lists every regular file below the storage root.
    fn list_files(&self) -> io::Result<Vec<StoredFile>>;
}

/// Storage rooted at a directory on the local file system.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the file stored under `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn walk(&self, dir: &Path, out: &mut Vec<StoredFile>) -> io::Result<()> {
        for item in std::fs::read_dir(dir)? {
            let item = item?;
            let path = item.path();
            let file_type = item.file_type()?;
            if file_type.is_dir() {
                self.walk(&path, out)?;
            } else if file_type.is_file() {
                let name = path
                    .strip_prefix(&self.root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();
                out.push(StoredFile { name, path });
            }
        }
        Ok(())
    }
}

impl Storage for FsStorage {
    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        std::fs::metadata(path).map(|meta| meta.len())
    }

    fn list_files(&self) -> io::Result<Vec<StoredFile>> {
        let mut files = Vec::new();
        if self.root.is_dir() {
            self.walk(&self.root, &mut files)?;
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

/// In-memory file table mapping paths to sizes.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<FxHashMap<PathBuf, u64>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or overwrites a file of `size` bytes.
    pub fn insert_file(&self, path: impl Into<PathBuf>, size: u64) {
        self.files.lock().insert(path.into(), size);
    }

    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn file_exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        match self.files.lock().remove(path) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not stored", path.display()),
            )),
        }
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        self.files.lock().get(path).copied().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} not stored", path.display()))
        })
    }

    fn list_files(&self) -> io::Result<Vec<StoredFile>> {
        let mut files: Vec<StoredFile> = self
            .files
            .lock()
            .keys()
            .map(|path| StoredFile {
                name: path.to_string_lossy().into_owned(),
                path: path.clone(),
            })
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_tracks_files() {
        let storage = MemoryStorage::new();
        storage.insert_file("run/a.nc", 12);
        assert!(storage.file_exists(Path::new("run/a.nc")));
        assert_eq!(storage.file_size(Path::new("run/a.nc")).unwrap(), 12);

        storage.remove_file(Path::new("run/a.nc")).unwrap();
        assert!(!storage.file_exists(Path::new("run/a.nc")));
        let err = storage.remove_file(Path::new("run/a.nc")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn fs_storage_walks_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("run1")).unwrap();
        std::fs::write(dir.path().join("run1/out_0.nc"), b"abcd").unwrap();
        std::fs::write(dir.path().join("top.nc"), b"x").unwrap();

        let storage = FsStorage::new(dir.path());
        let files = storage.list_files().unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.replace('\\', "/")).collect();
        assert_eq!(names, vec!["run1/out_0.nc", "top.nc"]);

        let path = storage.path_for("run1/out_0.nc");
        assert!(storage.file_exists(&path));
        assert_eq!(storage.file_size(&path).unwrap(), 4);
        storage.remove_file(&path).unwrap();
        assert!(!storage.file_exists(&path));
    }

    #[test]
    fn fs_storage_missing_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path().join("absent"));
        assert!(storage.list_files().unwrap().is_empty());
    }
}
