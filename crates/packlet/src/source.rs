//! Access to module source text.
//!
//! Module ids are absolute within a virtual root. [`FsSourceLoader`] maps
//! that root onto a project directory, so bundles never contain machine
//! specific paths; [`MemorySourceLoader`] keeps sources in memory.

use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;
use log::trace;

use crate::error::{BundleError, BundleResult};
use crate::module_graph::CanonicalModuleId;

pub trait SourceLoader: Debug {
    /// Whether `id` names an existing module source.
    fn exists(&self, id: &CanonicalModuleId) -> bool;

    /// Read the source text of `id`.
    fn load(&self, id: &CanonicalModuleId) -> BundleResult<String>;
}

/// Serves modules from a project directory.
#[derive(Debug, Clone)]
pub struct FsSourceLoader {
    root: PathBuf,
}

impl FsSourceLoader {
    /// Create a loader rooted at `root`, which is canonicalized once.
    pub fn new(root: impl AsRef<Path>) -> BundleResult<Self> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|source| BundleError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of a module id.
    pub fn path_of(&self, id: &CanonicalModuleId) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(id.segments());
        path
    }

    /// Module id of a filesystem path below the root.
    ///
    /// Returns `None` for paths outside the project root.
    pub fn id_for_path(&self, path: &Path) -> Option<CanonicalModuleId> {
        if let Ok(relative) = path.strip_prefix(&self.root) {
            return relative_path_to_id(relative);
        }
        // Symlinked temp dirs and the like only match after canonicalization.
        let canonical = path.canonicalize().ok()?;
        relative_path_to_id(canonical.strip_prefix(&self.root).ok()?)
    }
}

fn relative_path_to_id(relative: &Path) -> Option<CanonicalModuleId> {
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(CanonicalModuleId::new(&segments.join("/")))
}

impl SourceLoader for FsSourceLoader {
    fn exists(&self, id: &CanonicalModuleId) -> bool {
        self.path_of(id).is_file()
    }

    fn load(&self, id: &CanonicalModuleId) -> BundleResult<String> {
        let path = self.path_of(id);
        trace!("Reading {id} from {}", path.display());
        fs::read_to_string(&path).map_err(|source| BundleError::Io { path, source })
    }
}

/// In-memory module sources keyed by id.
#[derive(Debug, Clone, Default)]
pub struct MemorySourceLoader {
    files: IndexMap<CanonicalModuleId, String>,
}

impl MemorySourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the source of the module at `path`.
    pub fn insert(&mut self, path: &str, source: impl Into<String>) {
        self.files
            .insert(CanonicalModuleId::new(path), source.into());
    }

    #[must_use]
    pub fn with_file(mut self, path: &str, source: impl Into<String>) -> Self {
        self.insert(path, source);
        self
    }
}

impl SourceLoader for MemorySourceLoader {
    fn exists(&self, id: &CanonicalModuleId) -> bool {
        self.files.contains_key(id)
    }

    fn load(&self, id: &CanonicalModuleId) -> BundleResult<String> {
        self.files
            .get(id)
            .cloned()
            .ok_or_else(|| BundleError::Io {
                path: PathBuf::from(id.as_str()),
                source: io::Error::new(io::ErrorKind::NotFound, "no such module source"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_loader_maps_ids_below_root() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::create_dir_all(temp_dir.path().join("src"))?;
        fs::write(temp_dir.path().join("src/main.js"), "export default 1;\n")?;

        let loader = FsSourceLoader::new(temp_dir.path())?;
        let id = CanonicalModuleId::new("/src/main.js");

        assert!(loader.exists(&id));
        assert!(!loader.exists(&CanonicalModuleId::new("/src")));
        assert_eq!(loader.load(&id)?, "export default 1;\n");
        assert_eq!(
            loader.id_for_path(&temp_dir.path().join("src").join("main.js")),
            Some(id)
        );
        Ok(())
    }

    #[test]
    fn test_fs_loader_missing_file_is_io_error() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let loader = FsSourceLoader::new(temp_dir.path())?;
        let err = loader
            .load(&CanonicalModuleId::new("/nope.js"))
            .unwrap_err();
        assert!(matches!(err, BundleError::Io { .. }));
        Ok(())
    }

    #[test]
    fn test_fs_loader_rejects_paths_outside_root() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::create_dir_all(temp_dir.path().join("project"))?;
        let loader = FsSourceLoader::new(temp_dir.path().join("project"))?;
        assert_eq!(loader.id_for_path(&temp_dir.path().join("other.js")), None);
        Ok(())
    }

    #[test]
    fn test_memory_loader() {
        let loader = MemorySourceLoader::new().with_file("src/./a.js", "a");
        assert!(loader.exists(&CanonicalModuleId::new("/src/a.js")));
        assert_eq!(loader.load(&CanonicalModuleId::new("/src/a.js")).unwrap(), "a");
        assert!(loader.load(&CanonicalModuleId::new("/src/b.js")).is_err());
    }
}
