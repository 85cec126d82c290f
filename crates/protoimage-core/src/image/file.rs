//! A single compiled file inside an image.

use crate::descriptor::FileDescriptorMessage;
use crate::error::{Error, Result};
use crate::module::ModuleFullName;
use crate::normalpath;
use crate::wkt;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A compiled file descriptor plus its image metadata.
///
/// The path is always the descriptor's declared name. Instances are
/// immutable from the outside; flag changes produce a new copy.
#[derive(Debug, Clone)]
pub struct ImageFile {
    descriptor: FileDescriptorMessage,
    external_path: String,
    local_path: Option<PathBuf>,
    module_full_name: Option<ModuleFullName>,
    commit_id: Option<Uuid>,
    is_import: bool,
    is_syntax_unspecified: bool,
    unused_dependency_indexes: BTreeSet<u32>,
}

impl ImageFile {
    /// Starts building a file around `descriptor`
    pub fn builder(descriptor: FileDescriptorMessage) -> ImageFileBuilder {
        ImageFileBuilder {
            descriptor,
            external_path: None,
            local_path: None,
            module_full_name: None,
            commit_id: None,
            is_import: false,
            is_syntax_unspecified: false,
            unused_dependency_indexes: BTreeSet::new(),
        }
    }

    /// Normalized path, equal to the descriptor name
    pub fn path(&self) -> &str {
        self.descriptor.name()
    }

    /// Human-facing path; defaults to [`Self::path`]
    pub fn external_path(&self) -> &str {
        &self.external_path
    }

    /// On-disk path, if any
    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    /// Module the file came from
    pub fn module_full_name(&self) -> Option<&ModuleFullName> {
        self.module_full_name.as_ref()
    }

    /// Commit of the module the file came from
    pub fn commit_id(&self) -> Option<Uuid> {
        self.commit_id
    }

    /// Returns true if the file is only present to satisfy imports
    pub fn is_import(&self) -> bool {
        self.is_import
    }

    /// Returns true if the source had no syntax declaration
    pub fn is_syntax_unspecified(&self) -> bool {
        self.is_syntax_unspecified
    }

    /// Indexes into the dependency list that are not needed
    pub fn unused_dependency_indexes(&self) -> &BTreeSet<u32> {
        &self.unused_dependency_indexes
    }

    /// The compiled descriptor
    pub fn descriptor(&self) -> &FileDescriptorMessage {
        &self.descriptor
    }

    /// Returns true if the file is one of the well-known types
    pub fn is_well_known_type(&self) -> bool {
        wkt::is_well_known_type(self.path())
    }

    /// Returns a copy with the import flag set to `is_import`
    pub fn with_is_import(&self, is_import: bool) -> Self {
        let mut file = self.clone();
        file.is_import = is_import;
        file
    }

    pub(crate) fn descriptor_mut(&mut self) -> &mut FileDescriptorMessage {
        &mut self.descriptor
    }
}

/// Builder for [`ImageFile`]; `build` validates the combination.
#[derive(Debug, Clone)]
pub struct ImageFileBuilder {
    descriptor: FileDescriptorMessage,
    external_path: Option<String>,
    local_path: Option<PathBuf>,
    module_full_name: Option<ModuleFullName>,
    commit_id: Option<Uuid>,
    is_import: bool,
    is_syntax_unspecified: bool,
    unused_dependency_indexes: BTreeSet<u32>,
}

impl ImageFileBuilder {
    /// Sets the human-facing path
    pub fn external_path(mut self, external_path: impl Into<String>) -> Self {
        self.external_path = Some(external_path.into());
        self
    }

    /// Sets the on-disk path
    pub fn local_path(mut self, local_path: Option<PathBuf>) -> Self {
        self.local_path = local_path;
        self
    }

    /// Sets the owning module
    pub fn module_full_name(mut self, module_full_name: Option<ModuleFullName>) -> Self {
        self.module_full_name = module_full_name;
        self
    }

    /// Sets the module commit; requires a module
    pub fn commit_id(mut self, commit_id: Option<Uuid>) -> Self {
        self.commit_id = commit_id;
        self
    }

    /// Sets the import flag
    pub fn is_import(mut self, is_import: bool) -> Self {
        self.is_import = is_import;
        self
    }

    /// Sets the missing-syntax flag
    pub fn is_syntax_unspecified(mut self, is_syntax_unspecified: bool) -> Self {
        self.is_syntax_unspecified = is_syntax_unspecified;
        self
    }

    /// Sets the unused dependency indexes
    pub fn unused_dependency_indexes(mut self, indexes: impl IntoIterator<Item = u32>) -> Self {
        self.unused_dependency_indexes = indexes.into_iter().collect();
        self
    }

    /// Validates and builds the file
    pub fn build(self) -> Result<ImageFile> {
        let path = self.descriptor.name();
        if path.is_empty() {
            return Err(Error::invalid_image("file descriptor has no name"));
        }
        let normalized = normalpath::normalize(path)?;
        if normalized != path {
            return Err(Error::invalid_path(path, "descriptor name is not normalized"));
        }
        if self.commit_id.is_some() && self.module_full_name.is_none() {
            return Err(Error::invalid_image(format!(
                "{}: commit set without a module",
                path
            )));
        }

        let dependency_count = self.descriptor.dependencies().len();
        for &index in &self.unused_dependency_indexes {
            if index as usize >= dependency_count {
                return Err(Error::invalid_image(format!(
                    "{}: unused dependency index {} out of range for {} dependencies",
                    path, index, dependency_count
                )));
            }
            if self.descriptor.is_public_dependency(index as usize) {
                return Err(Error::invalid_image(format!(
                    "{}: public dependency {} cannot be unused",
                    path, index
                )));
            }
        }

        Ok(ImageFile {
            external_path: self.external_path.unwrap_or_else(|| path.to_string()),
            descriptor: self.descriptor,
            local_path: self.local_path,
            module_full_name: self.module_full_name,
            commit_id: self.commit_id,
            is_import: self.is_import,
            is_syntax_unspecified: self.is_syntax_unspecified,
            unused_dependency_indexes: self.unused_dependency_indexes,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use prost_types::FileDescriptorProto;

    /// A descriptor with the given name, package and imports
    pub(crate) fn descriptor(name: &str, package: &str, deps: &[&str]) -> FileDescriptorMessage {
        FileDescriptorMessage::from_proto(FileDescriptorProto {
            name: Some(name.to_string()),
            package: (!package.is_empty()).then(|| package.to_string()),
            dependency: deps.iter().map(|d| d.to_string()).collect(),
            syntax: Some("proto3".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    /// A non-import file with no provenance
    pub(crate) fn file(name: &str, deps: &[&str]) -> ImageFile {
        ImageFile::builder(descriptor(name, "", deps)).build().unwrap()
    }

    /// An import file with no provenance
    pub(crate) fn import(name: &str, deps: &[&str]) -> ImageFile {
        ImageFile::builder(descriptor(name, "", deps))
            .is_import(true)
            .build()
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::descriptor;
    use super::*;

    #[test]
    fn test_defaults() {
        let file = ImageFile::builder(descriptor("acme/a.proto", "acme", &[])).build().unwrap();
        assert_eq!(file.path(), "acme/a.proto");
        assert_eq!(file.external_path(), "acme/a.proto");
        assert!(!file.is_import());
        assert!(file.module_full_name().is_none());
        assert!(file.unused_dependency_indexes().is_empty());
    }

    #[test]
    fn test_rejects_commit_without_module() {
        let err = ImageFile::builder(descriptor("a.proto", "", &[]))
            .commit_id(Some(Uuid::from_u128(1)))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("without a module"));
    }

    #[test]
    fn test_rejects_unnormalized_name() {
        assert!(ImageFile::builder(descriptor("./a.proto", "", &[])).build().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_unused() {
        let err = ImageFile::builder(descriptor("a.proto", "", &["b.proto"]))
            .unused_dependency_indexes([1])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_with_is_import_copies() {
        let file = ImageFile::builder(descriptor("a.proto", "", &[])).build().unwrap();
        let import = file.with_is_import(true);
        assert!(import.is_import());
        assert!(!file.is_import());
        assert_eq!(import.path(), file.path());
    }
}
