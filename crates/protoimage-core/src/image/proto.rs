//! The binary image format.
//!
//! An encoded image is a message with one repeated `bytes` field (1). Each
//! entry is an encoded `FileDescriptorProto` carrying image metadata in the
//! reserved extension field 8042:
//!
//! ```text
//! ImageFileExtension {
//!   optional bool is_import = 1;
//!   optional ModuleInfo module_info = 2;   // { name = 1 { remote, owner, repository }, commit = 2 }
//!   optional bool is_syntax_unspecified = 3;
//!   repeated int32 unused_dependency = 4;
//! }
//! ```
//!
//! Because field 1 is wire-compatible with `FileDescriptorSet.file`, an
//! encoded image also decodes as a `FileDescriptorSet`, with the metadata
//! left behind as unknown fields.

use super::{Image, ImageFile};
use crate::descriptor::{self, FileDescriptorMessage};
use crate::error::{Error, Result};
use crate::module::ModuleFullName;
use crate::unused;
use crate::wire;
use prost::Message;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// Field number of the image metadata inside each file descriptor.
pub(crate) const IMAGE_FILE_EXTENSION_FIELD: u32 = 8042;

#[derive(Clone, PartialEq, Message)]
pub(crate) struct ProtoImage {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub(crate) file: Vec<Vec<u8>>,
}

/// Carrier for field 8042, so prost can encode and decode it on its own.
#[derive(Clone, PartialEq, Message)]
struct ImageFileExtensionField {
    #[prost(message, optional, tag = "8042")]
    extension: Option<ImageFileExtension>,
}

#[derive(Clone, PartialEq, Message)]
struct ImageFileExtension {
    #[prost(bool, optional, tag = "1")]
    is_import: Option<bool>,
    #[prost(message, optional, tag = "2")]
    module_info: Option<ModuleInfo>,
    #[prost(bool, optional, tag = "3")]
    is_syntax_unspecified: Option<bool>,
    #[prost(int32, repeated, packed = "false", tag = "4")]
    unused_dependency: Vec<i32>,
}

#[derive(Clone, PartialEq, Message)]
struct ModuleInfo {
    #[prost(message, optional, tag = "1")]
    name: Option<ModuleName>,
    #[prost(string, optional, tag = "2")]
    commit: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
struct ModuleName {
    #[prost(string, optional, tag = "1")]
    remote: Option<String>,
    #[prost(string, optional, tag = "2")]
    owner: Option<String>,
    #[prost(string, optional, tag = "3")]
    repository: Option<String>,
}

/// Options for [`Image::decode`].
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Resolve custom options against the image's own extensions
    pub reparse: bool,
    /// Recompute unused dependency indexes instead of trusting the input
    pub compute_unused_imports: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            reparse: true,
            compute_unused_imports: false,
        }
    }
}

impl DecodeOptions {
    /// Create new decode options with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip reparsing; custom options stay unknown fields
    pub fn without_reparse(mut self) -> Self {
        self.reparse = false;
        self
    }

    /// Recompute unused dependency indexes; requires reparse
    pub fn with_unused_imports(mut self) -> Self {
        self.compute_unused_imports = true;
        self
    }
}

impl Image {
    /// Encodes the image, metadata included
    pub fn encode_to_vec(&self) -> Vec<u8> {
        ProtoImage {
            file: self.files().map(encode_file).collect(),
        }
        .encode_to_vec()
    }

    /// Encodes the image as a plain `FileDescriptorSet`, metadata dropped.
    ///
    /// Custom options are kept.
    pub fn encode_file_descriptor_set(&self) -> Vec<u8> {
        ProtoImage {
            file: self.files().map(|file| file.descriptor().encode_to_vec()).collect(),
        }
        .encode_to_vec()
    }

    /// Decodes and validates an encoded image
    pub fn decode(bytes: &[u8], options: &DecodeOptions) -> Result<Image> {
        if options.compute_unused_imports && !options.reparse {
            return Err(Error::InvalidOptions(
                "computing unused imports requires reparse".to_string(),
            ));
        }

        let proto = ProtoImage::decode(bytes)?;
        if proto.file.is_empty() {
            return Err(Error::NoFiles);
        }

        let mut descriptors = Vec::with_capacity(proto.file.len());
        let mut extensions = Vec::with_capacity(proto.file.len());
        for encoded in &proto.file {
            let (rest, extension) = wire::split_field(encoded, IMAGE_FILE_EXTENSION_FIELD)?;
            let extension = ImageFileExtensionField::decode(extension.as_slice())?
                .extension
                .unwrap_or_default();
            descriptors.push(FileDescriptorMessage::decode(&rest)?);
            extensions.push(extension);
        }

        if options.reparse {
            descriptor::reparse(&mut descriptors)?;
        }
        let computed = options
            .compute_unused_imports
            .then(|| unused::unused_dependency_indexes(&descriptors));

        let mut files = Vec::with_capacity(descriptors.len());
        for (index, (descriptor, extension)) in descriptors.into_iter().zip(extensions).enumerate() {
            let unused = match &computed {
                Some(computed) => computed[index].clone(),
                None => unused_from_proto(&descriptor, &extension.unused_dependency)?,
            };
            files.push(decode_file(descriptor, extension, unused)?);
        }

        debug!("Decoded image with {} files", files.len());
        Image::new(files)
    }
}

fn encode_file(file: &ImageFile) -> Vec<u8> {
    let module_info = file.module_full_name().map(|module| ModuleInfo {
        name: Some(ModuleName {
            remote: Some(module.remote().to_string()),
            owner: Some(module.owner().to_string()),
            repository: Some(module.name().to_string()),
        }),
        commit: file.commit_id().map(|commit| commit.simple().to_string()),
    });
    let extension = ImageFileExtension {
        is_import: Some(file.is_import()),
        module_info,
        is_syntax_unspecified: Some(file.is_syntax_unspecified()),
        unused_dependency: file
            .unused_dependency_indexes()
            .iter()
            .map(|&index| index as i32)
            .collect(),
    };

    let mut bytes = file.descriptor().encode_to_vec();
    bytes.extend_from_slice(
        &ImageFileExtensionField {
            extension: Some(extension),
        }
        .encode_to_vec(),
    );
    bytes
}

fn unused_from_proto(descriptor: &FileDescriptorMessage, indexes: &[i32]) -> Result<BTreeSet<u32>> {
    indexes
        .iter()
        .map(|&index| {
            u32::try_from(index).map_err(|_| {
                Error::invalid_image(format!(
                    "{}: negative unused dependency index {}",
                    descriptor.name(),
                    index
                ))
            })
        })
        .collect()
}

fn decode_file(
    descriptor: FileDescriptorMessage,
    extension: ImageFileExtension,
    unused: BTreeSet<u32>,
) -> Result<ImageFile> {
    let path = descriptor.name().to_string();
    if path.is_empty() {
        return Err(Error::invalid_image("file descriptor has no name"));
    }

    let (module_full_name, commit_id) = match extension.module_info {
        None => (None, None),
        Some(info) => {
            let name = info
                .name
                .ok_or_else(|| Error::invalid_image(format!("{}: module info has no name", path)))?;
            let module = ModuleFullName::new(
                name.remote.unwrap_or_default(),
                name.owner.unwrap_or_default(),
                name.repository.unwrap_or_default(),
            )
            .map_err(|err| Error::invalid_image(format!("{}: {}", path, err)))?;
            let commit = match info.commit.as_deref() {
                None | Some("") => None,
                Some(commit) => Some(Uuid::parse_str(commit).map_err(|err| {
                    Error::invalid_image(format!("{}: invalid commit '{}': {}", path, commit, err))
                })?),
            };
            (Some(module), commit)
        }
    };

    ImageFile::builder(descriptor)
        .module_full_name(module_full_name)
        .commit_id(commit_id)
        .is_import(extension.is_import.unwrap_or(false))
        .is_syntax_unspecified(extension.is_syntax_unspecified.unwrap_or(false))
        .unused_dependency_indexes(unused)
        .build()
}

/// Reads an encoded image from disk
pub fn read_image(path: impl AsRef<Path>, options: &DecodeOptions) -> Result<Image> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| Error::file_read(path, err))?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Image::decode(&bytes, options)
}

/// Writes an encoded image to disk
pub fn write_image(path: impl AsRef<Path>, image: &Image) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, image.encode_to_vec()).map_err(|err| Error::file_write(path, err))
}
