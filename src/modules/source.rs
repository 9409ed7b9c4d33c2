//! Module source access
//!
//! Module paths are canonicalised lexically (`.` and `..` folded away, no
//! symlink resolution), so the same file reached through different relative
//! specifiers maps to a single module record whether or not it exists on disk.

use crate::error::{Error, Result};
use rustc_hash::FxHashMap as HashMap;
use std::path::{Component, Path, PathBuf};

/// Where module source text comes from
pub trait SourceLoader {
    /// Whether a module exists at the canonical path
    fn exists(&self, path: &Path) -> bool;

    /// Read the module source at the canonical path
    fn read(&self, path: &Path) -> Result<String>;
}

/// Fold `.` and `..` components without touching the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `..` at the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Reads module sources from the filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSource;

impl SourceLoader for FsSource {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| Error::io(path, e))
    }
}

/// In-memory module tree, used by probes and tests
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    files: HashMap<PathBuf, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file under `root`
    pub fn with_file(mut self, root: &Path, relative: &str, source: &str) -> Self {
        self.insert(root.join(relative), source);
        self
    }

    /// Add or replace a file at an absolute path
    pub fn insert(&mut self, path: impl AsRef<Path>, source: &str) {
        self.files
            .insert(normalize(path.as_ref()), source.to_string());
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl SourceLoader for MemorySource {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize(path))
    }

    fn read(&self, path: &Path) -> Result<String> {
        self.files.get(&normalize(path)).cloned().ok_or_else(|| Error::Io {
            path: path.display().to_string(),
            message: "no such module in memory".to_string(),
        })
    }
}
