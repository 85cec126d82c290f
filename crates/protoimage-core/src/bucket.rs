//! Read-only sources of `.proto` files.
//!
//! The build pipeline never touches the filesystem directly. It reads from a
//! [`ModuleReadBucket`], which knows every file it can serve, which of them
//! are build targets, and where each one came from.

use crate::error::{Error, Result};
use crate::module::ModuleFullName;
use crate::normalpath;
use bytes::Bytes;
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

/// A source file together with its provenance.
#[derive(Debug, Clone)]
pub struct ModuleFile {
    path: String,
    content: Bytes,
    external_path: String,
    local_path: Option<PathBuf>,
    module_full_name: Option<ModuleFullName>,
    commit_id: Option<Uuid>,
    is_target: bool,
}

impl ModuleFile {
    /// Creates a target file with no module.
    ///
    /// `path` is normalized; the external path defaults to it.
    pub fn new(path: &str, content: impl Into<Bytes>) -> Result<Self> {
        let path = normalpath::normalize(path)?;
        if path == "." {
            return Err(Error::invalid_path(path, "path names no file"));
        }
        Ok(Self {
            external_path: path.clone(),
            path,
            content: content.into(),
            local_path: None,
            module_full_name: None,
            commit_id: None,
            is_target: true,
        })
    }

    /// Sets the human-facing path
    pub fn with_external_path(mut self, external_path: impl Into<String>) -> Self {
        self.external_path = external_path.into();
        self
    }

    /// Sets the on-disk path
    pub fn with_local_path(mut self, local_path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(local_path.into());
        self
    }

    /// Sets the module the file belongs to, and optionally its commit
    pub fn with_module(mut self, module_full_name: ModuleFullName, commit_id: Option<Uuid>) -> Self {
        self.module_full_name = Some(module_full_name);
        self.commit_id = commit_id;
        self
    }

    /// Marks the file as available for imports but not a build target
    pub fn as_dependency(mut self) -> Self {
        self.is_target = false;
        self
    }

    /// Normalized path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw file content
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Human-facing path
    pub fn external_path(&self) -> &str {
        &self.external_path
    }

    /// On-disk path, if the file lives on disk
    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    /// Owning module
    pub fn module_full_name(&self) -> Option<&ModuleFullName> {
        self.module_full_name.as_ref()
    }

    /// Commit of the owning module
    pub fn commit_id(&self) -> Option<Uuid> {
        self.commit_id
    }

    /// Returns true if the file is a build target
    pub fn is_target(&self) -> bool {
        self.is_target
    }
}

/// A source of module files.
///
/// Implementations must be shareable across the worker threads of a build.
pub trait ModuleReadBucket: Send + Sync {
    /// Looks up a file by normalized path. `Ok(None)` means not present.
    fn get_file(&self, path: &str) -> Result<Option<ModuleFile>>;

    /// Every path the bucket can serve
    fn file_paths(&self) -> Vec<String>;

    /// The paths to build
    fn target_paths(&self) -> Vec<String>;
}

/// An in-memory bucket, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryModuleBucket {
    files: IndexMap<String, ModuleFile>,
}

impl MemoryModuleBucket {
    /// Creates an empty bucket
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, replacing any previous file at the same path
    pub fn insert(&mut self, file: ModuleFile) -> &mut Self {
        self.files.insert(file.path.clone(), file);
        self
    }

    /// Adds a target file with no module
    pub fn add_file(&mut self, path: &str, content: impl Into<Bytes>) -> Result<&mut Self> {
        Ok(self.insert(ModuleFile::new(path, content)?))
    }

    /// Adds a dependency file belonging to `module`
    pub fn add_dependency(
        &mut self,
        path: &str,
        content: impl Into<Bytes>,
        module: ModuleFullName,
        commit_id: Option<Uuid>,
    ) -> Result<&mut Self> {
        let file = ModuleFile::new(path, content)?
            .with_module(module, commit_id)
            .as_dependency();
        Ok(self.insert(file))
    }

    /// Loads every `.proto` file under `root` as a target.
    ///
    /// Paths are relative to `root`; external and local paths point at the
    /// file on disk.
    pub fn from_dir(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let mut bucket = Self::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(root).to_path_buf();
                Error::file_read(path, err.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let local = entry.path();
            if local.extension().and_then(|ext| ext.to_str()) != Some("proto") {
                continue;
            }
            let relative = local
                .strip_prefix(root)
                .map_err(|_| Error::internal("walkdir yielded a path outside its root"))?;
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let content = fs::read(local).map_err(|err| Error::file_read(local, err))?;
            let file = ModuleFile::new(&relative, content)?
                .with_external_path(local.display().to_string())
                .with_local_path(local);
            bucket.insert(file);
        }

        debug!("Loaded {} files from {}", bucket.files.len(), root.display());
        Ok(bucket)
    }

    /// Number of files in the bucket
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if the bucket holds no files
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ModuleReadBucket for MemoryModuleBucket {
    fn get_file(&self, path: &str) -> Result<Option<ModuleFile>> {
        Ok(self.files.get(path).cloned())
    }

    fn file_paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn target_paths(&self) -> Vec<String> {
        self.files
            .values()
            .filter(|file| file.is_target)
            .map(|file| file.path.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_memory_bucket_targets() {
        let module: ModuleFullName = "buf.build/acme/deps".parse().unwrap();
        let mut bucket = MemoryModuleBucket::new();
        bucket.add_file("./a.proto", "syntax = \"proto3\";").unwrap();
        bucket
            .add_dependency("dep/b.proto", "syntax = \"proto3\";", module.clone(), None)
            .unwrap();

        assert_eq!(bucket.file_paths(), vec!["a.proto".to_string(), "dep/b.proto".to_string()]);
        assert_eq!(bucket.target_paths(), vec!["a.proto".to_string()]);

        let dep = bucket.get_file("dep/b.proto").unwrap().unwrap();
        assert_eq!(dep.module_full_name(), Some(&module));
        assert!(!dep.is_target());
        assert!(bucket.get_file("missing.proto").unwrap().is_none());
    }

    #[test]
    fn test_module_file_rejects_bad_paths() {
        assert!(ModuleFile::new("/abs.proto", "").is_err());
        assert!(ModuleFile::new(".", "").is_err());
    }

    #[test]
    fn test_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("acme/v1")).unwrap();
        fs::write(dir.path().join("acme/v1/a.proto"), "syntax = \"proto3\";").unwrap();
        fs::write(dir.path().join("README.md"), "not proto").unwrap();

        let bucket = MemoryModuleBucket::from_dir(dir.path()).unwrap();
        assert_eq!(bucket.target_paths(), vec!["acme/v1/a.proto".to_string()]);

        let file = bucket.get_file("acme/v1/a.proto").unwrap().unwrap();
        assert_eq!(file.local_path(), Some(dir.path().join("acme/v1/a.proto").as_path()));
    }
}
