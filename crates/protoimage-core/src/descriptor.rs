//! Compiled file descriptors that keep their custom options.
//!
//! `prost_types::FileDescriptorProto` drops every field it does not know,
//! which includes all custom options. [`FileDescriptorMessage`] stores the
//! descriptor as a [`DynamicMessage`] instead, so unknown option bytes are
//! carried through untouched, and keeps a typed copy alongside it for
//! structural reads (name, package, dependencies, message tree).
//!
//! ## Reparse
//!
//! Custom options arrive as unknown fields because the extensions that
//! define them live in the image itself. [`reparse`] builds a
//! [`DescriptorPool`] from the image files and re-decodes every descriptor
//! against the pool's own `google.protobuf.FileDescriptorProto`, turning
//! those unknown fields into typed extension values.

use crate::error::{Error, Result};
use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor, ReflectMessage, Value};
use prost_types::FileDescriptorProto;
use std::collections::HashSet;
use tracing::trace;

/// Full name of the descriptor message type
const FILE_DESCRIPTOR_PROTO_NAME: &str = "google.protobuf.FileDescriptorProto";

/// The `FileDescriptorProto` message type from the built-in descriptor pool.
pub(crate) fn builtin_file_descriptor_proto() -> MessageDescriptor {
    FileDescriptorProto::default().descriptor()
}

/// One compiled file descriptor, lossless with respect to custom options.
#[derive(Debug, Clone)]
pub struct FileDescriptorMessage {
    message: DynamicMessage,
    proto: FileDescriptorProto,
}

impl FileDescriptorMessage {
    /// Wraps a typed descriptor
    pub fn from_proto(proto: FileDescriptorProto) -> Result<Self> {
        let mut message = DynamicMessage::new(builtin_file_descriptor_proto());
        message.transcode_from(&proto)?;
        Ok(Self { message, proto })
    }

    /// Decodes an encoded `FileDescriptorProto`, keeping unknown fields
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_with(builtin_file_descriptor_proto(), bytes)
    }

    pub(crate) fn decode_with(descriptor: MessageDescriptor, bytes: &[u8]) -> Result<Self> {
        let message = DynamicMessage::decode(descriptor, bytes)?;
        Self::from_message(message)
    }

    fn from_message(message: DynamicMessage) -> Result<Self> {
        let proto = message.transcode_to::<FileDescriptorProto>()?;
        Ok(Self { message, proto })
    }

    /// The declared file name
    pub fn name(&self) -> &str {
        self.proto.name()
    }

    /// The declared package, empty if none
    pub fn package(&self) -> &str {
        self.proto.package()
    }

    /// Declared import paths, in declaration order
    pub fn dependencies(&self) -> &[String] {
        &self.proto.dependency
    }

    /// Returns true if the dependency at `index` is a `public` import
    pub fn is_public_dependency(&self, index: usize) -> bool {
        self.proto
            .public_dependency
            .iter()
            .any(|&public| public >= 0 && public as usize == index)
    }

    /// Typed view of the descriptor.
    ///
    /// Custom options are not part of this view; use [`Self::message`] or
    /// [`Self::encode_to_vec`] when they matter.
    pub fn proto(&self) -> &FileDescriptorProto {
        &self.proto
    }

    /// The full descriptor, custom options included
    pub fn message(&self) -> &DynamicMessage {
        &self.message
    }

    /// Encodes the descriptor, custom options included
    pub fn encode_to_vec(&self) -> Vec<u8> {
        self.message.encode_to_vec()
    }

    /// Applies `f` to the dynamic message and refreshes the typed view.
    ///
    /// Only options and source info may be changed this way; the structural
    /// fields cached by an image (name, dependencies) must stay as they are.
    pub(crate) fn modify<R>(&mut self, f: impl FnOnce(&mut DynamicMessage) -> Result<R>) -> Result<R> {
        let result = f(&mut self.message);
        self.proto = self.message.transcode_to::<FileDescriptorProto>()?;
        result
    }

    /// Re-decodes the descriptor against `descriptor`, resolving extensions
    /// known to its pool.
    pub(crate) fn reparse_with(&mut self, descriptor: &MessageDescriptor) -> Result<()> {
        let bytes = self.message.encode_to_vec();
        self.message = DynamicMessage::decode(descriptor.clone(), bytes.as_slice())?;
        Ok(())
    }

    /// Current value of a `FileOptions` field, default included when unset.
    pub(crate) fn file_option(&self, field: &str) -> Option<Value> {
        let options = self.message.get_field_by_name("options")?;
        let options = options.as_message()?;
        options.get_field_by_name(field).map(|value| value.into_owned())
    }

    /// Sets a `FileOptions` field, creating the options message if absent.
    pub(crate) fn set_file_option(&mut self, field: &str, value: Value) -> Result<()> {
        self.modify(|message| {
            let options = message
                .get_field_by_name_mut("options")
                .and_then(Value::as_message_mut)
                .ok_or_else(|| Error::internal("FileDescriptorProto has no options message"))?;
            options
                .try_set_field_by_name(field, value)
                .map_err(|err| Error::internal(format!("cannot set file option {}: {}", field, err)))
        })
    }

    /// Removes every `SourceCodeInfo.Location` whose path is in `paths`.
    ///
    /// Returns the number of locations removed.
    pub(crate) fn remove_source_locations(&mut self, paths: &HashSet<Vec<i32>>) -> Result<usize> {
        if paths.is_empty() || !self.message.has_field_by_name("source_code_info") {
            return Ok(0);
        }
        self.modify(|message| {
            let Some(locations) = message
                .get_field_by_name_mut("source_code_info")
                .and_then(Value::as_message_mut)
                .and_then(|info| info.get_field_by_name_mut("location"))
                .and_then(Value::as_list_mut)
            else {
                return Ok(0);
            };
            let before = locations.len();
            locations.retain(|location| !paths.contains(&location_path(location)));
            Ok(before - locations.len())
        })
    }
}

fn location_path(location: &Value) -> Vec<i32> {
    let Some(location) = location.as_message() else {
        return Vec::new();
    };
    match location.get_field_by_name("path") {
        Some(path) => path
            .as_list()
            .map(|items| items.iter().filter_map(Value::as_i32).collect())
            .unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Reparse every descriptor against a pool built from the descriptors.
///
/// Only files whose imports are all in the set (transitively) go into the
/// pool; the others are still reparsed, but extensions they would need from
/// a missing file stay unknown fields. Returns `false` when the pool has no
/// `descriptor.proto`: no file can then declare a custom option, so there
/// is nothing to resolve.
pub(crate) fn reparse(descriptors: &mut [FileDescriptorMessage]) -> Result<bool> {
    let open = incomplete_files(descriptors);
    if !open.is_empty() {
        trace!("Leaving {} files with missing imports out of the reparse pool", open.len());
    }
    let closed: Vec<FileDescriptorProto> = descriptors
        .iter()
        .filter(|d| !open.contains(d.name()))
        .map(|d| d.proto().clone())
        .collect();

    let mut pool = DescriptorPool::new();
    pool.add_file_descriptor_protos(closed)
        .map_err(|err| Error::descriptor_build(err.to_string()))?;

    let Some(file_descriptor_proto) = pool.get_message_by_name(FILE_DESCRIPTOR_PROTO_NAME) else {
        trace!("No descriptor.proto in file set, skipping reparse");
        return Ok(false);
    };

    for descriptor in descriptors.iter_mut() {
        descriptor.reparse_with(&file_descriptor_proto)?;
    }
    trace!("Reparsed {} descriptors", descriptors.len());
    Ok(true)
}

/// Names of files that import, directly or not, a file missing from the set.
fn incomplete_files(descriptors: &[FileDescriptorMessage]) -> HashSet<String> {
    let present: HashSet<&str> = descriptors.iter().map(FileDescriptorMessage::name).collect();
    let mut open: HashSet<String> = descriptors
        .iter()
        .filter(|d| d.dependencies().iter().any(|dep| !present.contains(dep.as_str())))
        .map(|d| d.name().to_string())
        .collect();
    loop {
        let newly_open: Vec<String> = descriptors
            .iter()
            .filter(|d| !open.contains(d.name()))
            .filter(|d| d.dependencies().iter().any(|dep| open.contains(dep)))
            .map(|d| d.name().to_string())
            .collect();
        if newly_open.is_empty() {
            return open;
        }
        open.extend(newly_open);
    }
}
