//! Error types for the protoimage-core library.
//!
//! This module provides error handling using the `thiserror` crate. Errors
//! fall into four broad classes:
//!
//! - construction and validation errors (bad input, safe to report to a user)
//! - resolution errors (a file or import could not be found)
//! - compilation diagnostics ([`Error::Compile`], carrying a [`FileAnnotationSet`])
//! - internal errors ([`Error::Internal`]): a broken invariant, never bad input

use crate::annotation::FileAnnotationSet;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for protoimage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all protoimage operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid protobuf wire format
    #[error("invalid protobuf wire format at offset {offset}: {details}")]
    InvalidWireFormat {
        /// Byte offset where the error occurred
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Failed to decode varint
    #[error("failed to decode varint at offset {offset}: buffer too small or invalid encoding")]
    VarintDecode {
        /// Byte offset where the error occurred
        offset: usize,
    },

    /// Invalid field number in a wire record
    #[error("invalid field number {number}: must be between 1 and {max}")]
    InvalidFieldNumber {
        /// The invalid field number
        number: u32,
        /// Maximum valid field number
        max: u32,
    },

    /// Failed to decode a descriptor or image message
    #[error("failed to decode descriptor: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// Failed to build a descriptor pool from the image files
    #[error("failed to build descriptor pool: {0}")]
    DescriptorBuild(String),

    /// Malformed path
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The offending path
        path: String,
        /// Why the path was rejected
        reason: &'static str,
    },

    /// Malformed module name
    #[error("invalid module name '{name}': expected remote/owner/name")]
    InvalidModuleFullName {
        /// The offending name
        name: String,
    },

    /// Two files in one image share a path
    #[error("duplicate path in image: {path}")]
    DuplicatePath {
        /// The duplicated path
        path: String,
    },

    /// Two files of the same module carry different commits
    #[error("inconsistent commit for module {module}: '{first}' and '{second}'")]
    InconsistentCommit {
        /// The module full name
        module: String,
        /// The first commit seen, or "none"
        first: String,
        /// The conflicting commit, or "none"
        second: String,
    },

    /// An image was built from zero files
    #[error("image contains no files")]
    NoFiles,

    /// The proto-level image failed validation
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// A requested path matched no file in the image
    #[error("path \"{path}\" has no matching file in the image")]
    PathNotFound {
        /// The requested path
        path: String,
    },

    /// An exclude path would remove an include path entirely
    #[error("excluded path \"{exclude}\" contains targeted path \"{include}\"")]
    ExcludeContainsInclude {
        /// The include path
        include: String,
        /// The exclude path containing it
        exclude: String,
    },

    /// The same path is a build target in more than one merged image
    #[error("{path} is a non-import in multiple images")]
    NonImportInMultipleImages {
        /// The conflicting path
        path: String,
    },

    /// A file requested directly could not be found
    #[error("{path}: does not exist")]
    FileNotFound {
        /// The requested path
        path: String,
    },

    /// A file requested as an import could not be found
    #[error("{}", import_not_found_message(.path, .imported_by.as_deref()))]
    ImportNotFound {
        /// The missing import path
        path: String,
        /// The file that declared the import, if known
        imported_by: Option<String>,
    },

    /// Caller supplied options that cannot be combined
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Compilation produced user-facing diagnostics
    #[error("{0}")]
    Compile(FileAnnotationSet),

    /// The operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// A broken internal invariant
    #[error("internal error: {0}")]
    Internal(String),
}

fn import_not_found_message(path: &str, imported_by: Option<&str>) -> String {
    match imported_by {
        Some(importer) => format!("{importer}: import \"{path}\" was not found"),
        None => format!("import \"{path}\" was not found"),
    }
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new wire format error
    pub fn invalid_wire_format(offset: usize, details: impl Into<String>) -> Self {
        Self::InvalidWireFormat {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new varint decode error
    pub fn varint_decode(offset: usize) -> Self {
        Self::VarintDecode { offset }
    }

    /// Creates a new descriptor build error
    pub fn descriptor_build(msg: impl Into<String>) -> Self {
        Self::DescriptorBuild(msg.into())
    }

    /// Creates a new invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason,
        }
    }

    /// Creates a new image validation error
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this error is a broken invariant rather than bad input
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// Returns true if this error carries compiler diagnostics
    pub fn is_compile(&self) -> bool {
        matches!(self, Self::Compile(_))
    }

    /// Returns true if a file or import could not be found
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound { .. } | Self::ImportNotFound { .. } | Self::PathNotFound { .. }
        )
    }

    /// Returns the compiler diagnostics, if this is a compile error
    pub fn annotations(&self) -> Option<&FileAnnotationSet> {
        match self {
            Self::Compile(set) => Some(set),
            _ => None,
        }
    }
}
