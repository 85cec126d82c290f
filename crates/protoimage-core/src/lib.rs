//! # protoimage-core
//!
//! A library for building, transforming and projecting Protocol Buffer images.
//!
//! An *image* is a self-contained, ordered set of compiled `.proto` files:
//! a `FileDescriptorSet` where every file also carries where it came from
//! (module, commit, on-disk path) and which of its imports it never uses.
//!
//! This crate provides the core functionality for:
//! - Compiling sources from a module bucket into an image
//! - Filtering, merging and stripping images
//! - Reading and writing images in their wire format
//! - Rewriting language options across an image ("managed mode")
//! - Projecting images into plugin `CodeGeneratorRequest`s
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`bucket`]: Module sources the build reads from
//! - [`resolver`]: Source resolution with provenance tracking
//! - [`build`]: The parse and link pipeline
//! - [`image`]: Images, their files, views and wire format
//! - [`managed`]: Managed-option rewriting
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use protoimage_core::{build_image, BuildConfig, MemoryModuleBucket, ProjectOptions};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! // Read every .proto under a directory
//! let bucket = MemoryModuleBucket::from_dir("./proto")?;
//!
//! // Compile it
//! let image = build_image(Arc::new(bucket), &BuildConfig::new(), &CancellationToken::new())?;
//!
//! // Hand it to a plugin
//! let request = image.to_code_generator_request(&ProjectOptions::new().parameter("paths=source_relative"));
//! println!("{} files to generate", request.file_to_generate.len());
//! # Ok::<(), protoimage_core::Error>(())
//! ```
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod annotation;
pub mod bucket;
pub mod build;
pub mod descriptor;
pub mod error;
pub mod image;
pub mod managed;
pub mod module;
pub mod normalpath;
pub mod resolver;
pub mod wkt;

mod unused;
mod wire;

// Re-export primary types for convenience
pub use annotation::{FileAnnotation, FileAnnotationSet};
pub use bucket::{MemoryModuleBucket, ModuleFile, ModuleReadBucket};
pub use build::{build_image, BuildConfig};
pub use descriptor::FileDescriptorMessage;
pub use error::{Error, Result};
pub use image::{
    images_to_code_generator_requests, merge_images, read_image, write_image, CodeGeneratorRequest, DecodeOptions,
    Image, ImageFile, ImageFileBuilder, ProjectOptions,
};
pub use module::ModuleFullName;
pub use resolver::FileResolver;

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
