//! Filesystem capability surface.
//!
//! Handlers that touch disk go through [`FileSystem`] so tests can swap in
//! the in-memory [`MemoryFileSystem`] and force individual operations to
//! fail.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Uniform read/write/list/delete surface over a file tree.
pub trait FileSystem: Send + Sync {
    /// True iff a file or directory is present at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Read the file contents at `path`.
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Replace the file at `path` with `contents`.
    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()>;

    /// Remove the file at `path`; fails if it is absent.
    fn remove(&self, path: &str) -> io::Result<()>;

    /// Create the directory at `path` (idempotent).
    fn create_dir(&self, path: &str) -> io::Result<()>;

    /// Names of the regular files directly under `path`, in no particular
    /// order. Empty if `path` is not a directory.
    fn list_dir(&self, path: &str) -> Vec<String>;
}

/// [`FileSystem`] backed by the host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn create_dir(&self, path: &str) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn list_dir(&self, path: &str) -> Vec<String> {
        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect()
    }
}

/// In-memory [`FileSystem`] for tests: file contents in a path map,
/// directory membership in a path → names map, and a failure switch per
/// operation.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<HashMap<String, Vec<u8>>>,
    directories: Mutex<HashMap<String, Vec<String>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_removes: AtomicBool,
    fail_create_dir: AtomicBool,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_create_dir(&self, fail: bool) {
        self.fail_create_dir.store(fail, Ordering::SeqCst);
    }
}

fn forced_failure(op: &str) -> io::Error {
    io::Error::other(format!("{op} failure injected"))
}

fn split_parent(path: &str) -> Option<(&str, &str)> {
    let idx = path.rfind('/')?;
    Some((&path[..idx], &path[idx + 1..]))
}

impl FileSystem for MemoryFileSystem {
    fn exists(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
            || self.directories.lock().unwrap().contains_key(path)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(forced_failure("read"));
        }
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(forced_failure("write"));
        }
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), contents.to_vec());
        if let Some((dir, name)) = split_parent(path) {
            let mut directories = self.directories.lock().unwrap();
            let listing = directories.entry(dir.to_string()).or_default();
            if !listing.iter().any(|existing| existing == name) {
                listing.push(name.to_string());
            }
        }
        Ok(())
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(forced_failure("remove"));
        }
        if self.files.lock().unwrap().remove(path).is_none() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        }
        if let Some((dir, name)) = split_parent(path) {
            if let Some(listing) = self.directories.lock().unwrap().get_mut(dir) {
                listing.retain(|existing| existing != name);
            }
        }
        Ok(())
    }

    fn create_dir(&self, path: &str) -> io::Result<()> {
        if self.fail_create_dir.load(Ordering::SeqCst) {
            return Err(forced_failure("create_dir"));
        }
        self.directories
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default();
        Ok(())
    }

    fn list_dir(&self, path: &str) -> Vec<String> {
        self.directories
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_registers_file_in_parent_directory() {
        let fs = MemoryFileSystem::new();
        fs.write("/data/Shoes/1", b"{}").unwrap();
        assert!(fs.exists("/data/Shoes/1"));
        assert!(fs.exists("/data/Shoes"));
        assert_eq!(fs.list_dir("/data/Shoes"), vec!["1".to_string()]);
    }

    #[test]
    fn create_dir_is_idempotent_and_keeps_listing() {
        let fs = MemoryFileSystem::new();
        fs.create_dir("/data/Shoes").unwrap();
        fs.write("/data/Shoes/1", b"{}").unwrap();
        fs.create_dir("/data/Shoes").unwrap();
        assert_eq!(fs.list_dir("/data/Shoes"), vec!["1".to_string()]);
    }

    #[test]
    fn remove_missing_file_fails() {
        let fs = MemoryFileSystem::new();
        let err = fs.remove("/nope").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn remove_drops_directory_entry() {
        let fs = MemoryFileSystem::new();
        fs.write("/d/a", b"x").unwrap();
        fs.write("/d/b", b"y").unwrap();
        fs.remove("/d/a").unwrap();
        assert_eq!(fs.list_dir("/d"), vec!["b".to_string()]);
        assert!(!fs.exists("/d/a"));
    }

    #[test]
    fn injected_failures() {
        let fs = MemoryFileSystem::new();
        fs.write("/d/a", b"x").unwrap();

        fs.set_fail_reads(true);
        assert!(fs.read("/d/a").is_err());
        fs.set_fail_reads(false);
        assert_eq!(fs.read("/d/a").unwrap(), b"x");

        fs.set_fail_writes(true);
        assert!(fs.write("/d/b", b"y").is_err());

        fs.set_fail_removes(true);
        assert!(fs.remove("/d/a").is_err());

        fs.set_fail_create_dir(true);
        assert!(fs.create_dir("/e").is_err());
    }

    #[test]
    fn list_dir_on_file_or_missing_path_is_empty() {
        let fs = MemoryFileSystem::new();
        fs.write("/d/a", b"x").unwrap();
        assert!(fs.list_dir("/d/a").is_empty());
        assert!(fs.list_dir("/missing").is_empty());
    }
}
