//! Projection of images into code generator plugin requests.
//!
//! [`CodeGeneratorRequest`] mirrors `google.protobuf.compiler.CodeGeneratorRequest`
//! but keeps each `proto_file` as encoded bytes, so custom options reach the
//! plugin intact.

use super::{Image, ImageFile};
use crate::descriptor::{self, FileDescriptorMessage};
use crate::error::Result;
use crate::wkt;
use prost::Message;
use prost_types::compiler::Version;
use std::collections::HashSet;
use tracing::debug;

/// A plugin request with lossless file descriptors.
#[derive(Clone, PartialEq, Message)]
pub struct CodeGeneratorRequest {
    /// Files the plugin should generate code for
    #[prost(string, repeated, tag = "1")]
    pub file_to_generate: Vec<String>,
    /// Plugin parameter
    #[prost(string, optional, tag = "2")]
    pub parameter: Option<String>,
    /// Version of the compiler producing the request
    #[prost(message, optional, tag = "3")]
    pub compiler_version: Option<Version>,
    /// Encoded `FileDescriptorProto`s, dependencies first
    #[prost(bytes = "vec", repeated, tag = "15")]
    pub proto_file: Vec<Vec<u8>>,
}

impl CodeGeneratorRequest {
    /// Converts to the typed request; custom options are dropped.
    pub fn to_prost(&self) -> Result<prost_types::compiler::CodeGeneratorRequest> {
        let proto_file = self
            .proto_file
            .iter()
            .map(|bytes| prost_types::FileDescriptorProto::decode(bytes.as_slice()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(prost_types::compiler::CodeGeneratorRequest {
            file_to_generate: self.file_to_generate.clone(),
            parameter: self.parameter.clone(),
            proto_file,
            compiler_version: self.compiler_version.clone(),
            ..Default::default()
        })
    }
}

impl From<prost_types::compiler::CodeGeneratorRequest> for CodeGeneratorRequest {
    fn from(request: prost_types::compiler::CodeGeneratorRequest) -> Self {
        Self {
            file_to_generate: request.file_to_generate,
            parameter: request.parameter,
            compiler_version: request.compiler_version,
            proto_file: request.proto_file.iter().map(Message::encode_to_vec).collect(),
        }
    }
}

/// Options for projecting images into plugin requests.
#[derive(Debug, Clone, Default)]
pub struct ProjectOptions {
    /// Plugin parameter passed through unchanged
    pub parameter: Option<String>,
    /// Compiler version passed through unchanged
    pub compiler_version: Option<Version>,
    /// Also generate for import files
    pub include_imports: bool,
    /// With `include_imports`, also generate for well-known types
    pub include_well_known_types: bool,
}

impl ProjectOptions {
    /// Create new projection options with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the plugin parameter
    pub fn parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }

    /// Set the compiler version
    pub fn compiler_version(mut self, version: Version) -> Self {
        self.compiler_version = Some(version);
        self
    }

    /// Generate for imports too
    pub fn include_imports(mut self, include: bool) -> Self {
        self.include_imports = include;
        self
    }

    /// Generate for well-known types too (needs `include_imports`)
    pub fn include_well_known_types(mut self, include: bool) -> Self {
        self.include_well_known_types = include;
        self
    }
}

impl Image {
    /// Builds the plugin request for this image
    pub fn to_code_generator_request(&self, options: &ProjectOptions) -> CodeGeneratorRequest {
        project(self, options, &mut HashSet::new(), &HashSet::new())
    }

    /// Rebuilds an image from a plugin request.
    ///
    /// Only `file_to_generate` become non-imports; custom options are
    /// resolved when the request carries `descriptor.proto`.
    pub fn from_code_generator_request(request: &CodeGeneratorRequest) -> Result<Image> {
        let mut descriptors = request
            .proto_file
            .iter()
            .map(|bytes| FileDescriptorMessage::decode(bytes))
            .collect::<Result<Vec<_>>>()?;
        descriptor::reparse(&mut descriptors)?;

        let files = descriptors
            .into_iter()
            .map(|descriptor| ImageFile::builder(descriptor).is_import(true).build())
            .collect::<Result<Vec<_>>>()?;
        Image::new(files)?.with_only_paths(&request.file_to_generate, std::iter::empty::<&str>())
    }
}

/// Builds one plugin request per image.
///
/// A file is generated by at most one request: once claimed, later images
/// skip it, and an import is never generated where it is a non-import of
/// another image in the batch.
pub fn images_to_code_generator_requests(images: &[Image], options: &ProjectOptions) -> Vec<CodeGeneratorRequest> {
    let non_imports: HashSet<String> = images
        .iter()
        .flat_map(|image| image.files().filter(|file| !file.is_import()))
        .map(|file| file.path().to_string())
        .collect();
    let mut claimed = HashSet::new();
    let requests: Vec<_> = images
        .iter()
        .map(|image| project(image, options, &mut claimed, &non_imports))
        .collect();
    debug!("Projected {} images, {} files to generate", images.len(), claimed.len());
    requests
}

fn project(
    image: &Image,
    options: &ProjectOptions,
    claimed: &mut HashSet<String>,
    batch_non_imports: &HashSet<String>,
) -> CodeGeneratorRequest {
    let mut file_to_generate = Vec::new();
    for file in image.files() {
        let generate = if !file.is_import() {
            true
        } else {
            options.include_imports
                && (options.include_well_known_types || !wkt::is_well_known_type(file.path()))
                && !claimed.contains(file.path())
                && !batch_non_imports.contains(file.path())
        };
        if generate {
            claimed.insert(file.path().to_string());
            file_to_generate.push(file.path().to_string());
        }
    }

    CodeGeneratorRequest {
        file_to_generate,
        parameter: options.parameter.clone(),
        compiler_version: options.compiler_version.clone(),
        proto_file: image.files().map(|file| file.descriptor().encode_to_vec()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{file, import};
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Image {
        Image::new(vec![
            import("google/protobuf/timestamp.proto", &[]),
            import("dep.proto", &[]),
            file("a.proto", &["dep.proto", "google/protobuf/timestamp.proto"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_only_non_imports_by_default() {
        let request = sample().to_code_generator_request(&ProjectOptions::new().parameter("paths=source_relative"));
        assert_eq!(request.file_to_generate, vec!["a.proto".to_string()]);
        assert_eq!(request.proto_file.len(), 3);
        assert_eq!(request.parameter.as_deref(), Some("paths=source_relative"));
    }

    #[test]
    fn test_include_imports_skips_well_known_types() {
        let options = ProjectOptions::new().include_imports(true);
        let request = sample().to_code_generator_request(&options);
        assert_eq!(request.file_to_generate, vec!["dep.proto".to_string(), "a.proto".to_string()]);

        let options = options.include_well_known_types(true);
        let request = sample().to_code_generator_request(&options);
        assert_eq!(
            request.file_to_generate,
            vec![
                "google/protobuf/timestamp.proto".to_string(),
                "dep.proto".to_string(),
                "a.proto".to_string()
            ]
        );
    }

    #[test]
    fn test_batch_generates_each_file_once() {
        let first = Image::new(vec![import("shared.proto", &[]), file("a.proto", &["shared.proto"])]).unwrap();
        let second = Image::new(vec![import("shared.proto", &[]), file("b.proto", &["shared.proto"])]).unwrap();
        let third = Image::new(vec![import("b.proto", &[]), file("c.proto", &["b.proto"])]).unwrap();

        let options = ProjectOptions::new().include_imports(true);
        let requests = images_to_code_generator_requests(&[first, second, third], &options);
        let generated: Vec<Vec<&str>> = requests
            .iter()
            .map(|r| r.file_to_generate.iter().map(String::as_str).collect())
            .collect();
        assert_eq!(
            generated,
            vec![vec!["shared.proto", "a.proto"], vec!["b.proto"], vec!["c.proto"]]
        );
    }

    #[test]
    fn test_batch_never_generates_well_known_imports() {
        const TIMESTAMP: &str = "google/protobuf/timestamp.proto";
        let first = Image::new(vec![import(TIMESTAMP, &[]), file("a.proto", &[TIMESTAMP])]).unwrap();
        let second = Image::new(vec![import(TIMESTAMP, &[]), file("b.proto", &[TIMESTAMP])]).unwrap();

        let options = ProjectOptions::new()
            .include_imports(true)
            .include_well_known_types(false);
        let requests = images_to_code_generator_requests(&[first.clone(), second.clone()], &options);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].file_to_generate, vec!["a.proto".to_string()]);
        assert_eq!(requests[1].file_to_generate, vec!["b.proto".to_string()]);

        let timestamp = first.get_file(TIMESTAMP).unwrap().descriptor().encode_to_vec();
        for request in &requests {
            assert_eq!(request.proto_file.len(), 2);
            assert!(request.proto_file.contains(&timestamp));
        }

        // with both flags the first image claims it
        let options = options.include_well_known_types(true);
        let requests = images_to_code_generator_requests(&[first, second], &options);
        assert_eq!(requests[0].file_to_generate, vec![TIMESTAMP.to_string(), "a.proto".to_string()]);
        assert_eq!(requests[1].file_to_generate, vec!["b.proto".to_string()]);
    }

    #[test]
    fn test_round_trip_through_request() {
        let request = sample().to_code_generator_request(&ProjectOptions::new());
        let image = Image::from_code_generator_request(&request).unwrap();
        let files: Vec<(&str, bool)> = image.files().map(|f| (f.path(), f.is_import())).collect();
        assert_eq!(
            files,
            vec![
                ("google/protobuf/timestamp.proto", true),
                ("dep.proto", true),
                ("a.proto", false)
            ]
        );
    }

    #[test]
    fn test_prost_conversion() {
        let request = sample().to_code_generator_request(&ProjectOptions::new());
        let typed = request.to_prost().unwrap();
        assert_eq!(typed.proto_file.len(), 3);
        assert_eq!(CodeGeneratorRequest::from(typed), request);
    }
}
