//! Images: ordered, self-contained sets of compiled files.
//!
//! An [`Image`] holds every file needed to interpret its targets, imports
//! included, ordered so that each file comes after the files it imports.
//! Files are shared behind `Arc`, so derived images (filtered, merged,
//! import-stripped) are cheap and never copy descriptors.
//!
//! # Example
//!
//! ```no_run
//! use protoimage_core::image::read_image;
//! use protoimage_core::DecodeOptions;
//!
//! let image = read_image("image.binpb", &DecodeOptions::new())?;
//! for file in image.files() {
//!     println!("{} (import: {})", file.path(), file.is_import());
//! }
//! # Ok::<(), protoimage_core::Error>(())
//! ```

mod codegen;
mod file;
mod filter;
pub(crate) mod proto;

pub use codegen::{images_to_code_generator_requests, CodeGeneratorRequest, ProjectOptions};
pub use file::{ImageFile, ImageFileBuilder};
pub use proto::{read_image, write_image, DecodeOptions};

#[cfg(test)]
pub(crate) use file::testing;

use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// An ordered set of compiled files.
#[derive(Debug, Clone)]
pub struct Image {
    files: IndexMap<String, Arc<ImageFile>>,
}

impl Image {
    /// Creates an image from `files`.
    ///
    /// Files are reordered so each comes after the files it imports; files
    /// already in that order keep their positions. Fails on an empty list,
    /// duplicate paths, or two files of one module with different commits.
    /// Import closure is not checked.
    pub fn new(files: Vec<ImageFile>) -> Result<Self> {
        Self::from_shared(files.into_iter().map(Arc::new).collect())
    }

    pub(crate) fn from_shared(files: Vec<Arc<ImageFile>>) -> Result<Self> {
        if files.is_empty() {
            return Err(Error::NoFiles);
        }
        let mut by_path = IndexMap::with_capacity(files.len());
        for file in files {
            let path = file.path().to_string();
            if by_path.insert(path.clone(), file).is_some() {
                return Err(Error::DuplicatePath { path });
            }
        }
        let image = Self {
            files: sort_topologically(by_path),
        };
        image.validate_commits()?;
        Ok(image)
    }

    fn validate_commits(&self) -> Result<()> {
        let mut commits = HashMap::new();
        for file in self.files.values() {
            let Some(module) = file.module_full_name() else {
                continue;
            };
            match commits.get(module) {
                None => {
                    commits.insert(module.clone(), file.commit_id());
                }
                Some(&first) if first != file.commit_id() => {
                    let show = |commit: Option<uuid::Uuid>| {
                        commit.map_or_else(|| "none".to_string(), |c| c.simple().to_string())
                    };
                    return Err(Error::InconsistentCommit {
                        module: module.to_string(),
                        first: show(first),
                        second: show(file.commit_id()),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Files in dependency order
    pub fn files(&self) -> impl ExactSizeIterator<Item = &ImageFile> + '_ {
        self.files.values().map(|file| file.as_ref())
    }

    /// Paths in dependency order
    pub fn paths(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.files.keys().map(String::as_str)
    }

    /// Looks up a file by path
    pub fn get_file(&self, path: &str) -> Option<&ImageFile> {
        self.files.get(path).map(|file| file.as_ref())
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if the image has no files.
    ///
    /// Only [`Self::without_imports`] can produce such an image.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The same image with every import file dropped.
    ///
    /// The result may be empty and may no longer be closed under imports.
    pub fn without_imports(&self) -> Image {
        Self {
            files: self
                .files
                .iter()
                .filter(|(_, file)| !file.is_import())
                .map(|(path, file)| (path.clone(), Arc::clone(file)))
                .collect(),
        }
    }

    /// A copy that shares no file with `self`
    pub fn deep_clone(&self) -> Image {
        Self {
            files: self
                .files
                .iter()
                .map(|(path, file)| (path.clone(), Arc::new(ImageFile::clone(file))))
                .collect(),
        }
    }

    /// The typed descriptors in dependency order
    pub fn file_descriptor_protos(&self) -> Vec<prost_types::FileDescriptorProto> {
        self.files().map(|file| file.descriptor().proto().clone()).collect()
    }

    pub(crate) fn shared_files(&self) -> impl Iterator<Item = &Arc<ImageFile>> + '_ {
        self.files.values()
    }

    /// Mutable access to one file; copies it first if it is shared.
    pub(crate) fn get_file_mut(&mut self, path: &str) -> Option<&mut ImageFile> {
        self.files.get_mut(path).map(Arc::make_mut)
    }
}

/// Orders files so every file follows the files it imports.
///
/// Depth-first over the input order, visiting imports in declaration order.
/// Input already in dependency order comes out unchanged. Imports missing
/// from the set are ignored.
fn sort_topologically(files: IndexMap<String, Arc<ImageFile>>) -> IndexMap<String, Arc<ImageFile>> {
    fn visit<'a>(
        path: &'a str,
        files: &'a IndexMap<String, Arc<ImageFile>>,
        visited: &mut HashSet<&'a str>,
        order: &mut Vec<&'a str>,
    ) {
        if !visited.insert(path) {
            return;
        }
        if let Some(file) = files.get(path) {
            for dependency in file.descriptor().dependencies() {
                if let Some((key, _)) = files.get_key_value(dependency.as_str()) {
                    visit(key, files, visited, order);
                }
            }
        }
        order.push(path);
    }

    let mut visited = HashSet::with_capacity(files.len());
    let mut order = Vec::with_capacity(files.len());
    for path in files.keys() {
        visit(path, &files, &mut visited, &mut order);
    }
    let order: Vec<String> = order.into_iter().map(str::to_string).collect();

    let mut files = files;
    let mut sorted = IndexMap::with_capacity(files.len());
    for path in order {
        if let Some(file) = files.swap_remove(&path) {
            sorted.insert(path, file);
        }
    }
    sorted
}

/// Merges images into one.
///
/// Files keep their first-appearance order. A path that is an import in one
/// image and a non-import in another becomes a non-import; a path that is a
/// non-import in two images is an error. Returns `None` for no images.
pub fn merge_images(images: &[Image]) -> Result<Option<Image>> {
    match images {
        [] => return Ok(None),
        [image] => return Ok(Some(image.clone())),
        _ => {}
    }

    let mut merged: IndexMap<String, Arc<ImageFile>> = IndexMap::new();
    for image in images {
        for file in image.shared_files() {
            let path = file.path();
            match merged.get_mut(path) {
                None => {
                    merged.insert(path.to_string(), Arc::clone(file));
                }
                Some(existing) => match (existing.is_import(), file.is_import()) {
                    (false, false) => {
                        return Err(Error::NonImportInMultipleImages {
                            path: path.to_string(),
                        })
                    }
                    (true, false) => *existing = Arc::clone(file),
                    _ => {}
                },
            }
        }
    }

    debug!("Merged {} images into {} files", images.len(), merged.len());
    Image::from_shared(merged.into_values().collect()).map(Some)
}
