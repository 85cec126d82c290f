//! End-to-end tests: build an image from sources, then transform, serialize
//! and project it.

use pretty_assertions::assert_eq;
use protoimage_core::managed::{modify_image, ManagedConfig};
use protoimage_core::{
    build_image, read_image, write_image, BuildConfig, DecodeOptions, Error, Image, MemoryModuleBucket,
    ModuleFullName, ProjectOptions,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const OPTIONS_PROTO: &str = r#"syntax = "proto3";
package acme.options;
import "google/protobuf/descriptor.proto";
extend google.protobuf.FileOptions {
  string owner = 50001;
}
"#;

const WEATHER_PROTO: &str = r#"syntax = "proto3";
package acme.weather.v1;
import "acme/options/options.proto";
import "acme/weather/v1/unit.proto";
import "google/protobuf/timestamp.proto";
option (acme.options.owner) = "platform-team";
message Reading {
  google.protobuf.Timestamp observed_at = 1;
  double value = 2;
}
"#;

const UNIT_PROTO: &str = r#"syntax = "proto3";
package acme.weather.v1;
enum Unit {
  UNIT_UNSPECIFIED = 0;
}
"#;

fn weather_bucket() -> MemoryModuleBucket {
    let deps: ModuleFullName = "buf.build/acme/options".parse().unwrap();
    let mut bucket = MemoryModuleBucket::new();
    bucket.add_file("acme/weather/v1/weather.proto", WEATHER_PROTO).unwrap();
    bucket.add_file("acme/weather/v1/unit.proto", UNIT_PROTO).unwrap();
    bucket
        .add_dependency("acme/options/options.proto", OPTIONS_PROTO, deps, None)
        .unwrap();
    bucket
}

fn build(bucket: MemoryModuleBucket) -> Result<Image, Error> {
    build_image(Arc::new(bucket), &BuildConfig::new(), &CancellationToken::new())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[test]
fn test_build_labels_targets_and_imports() {
    let image = build(weather_bucket()).unwrap();

    let imports: Vec<(&str, bool)> = image.files().map(|f| (f.path(), f.is_import())).collect();
    assert_eq!(imports.len(), 5);
    for (path, is_import) in &imports {
        let expected = !path.starts_with("acme/weather/");
        assert_eq!(*is_import, expected, "{}", path);
    }

    let timestamp = image.get_file("google/protobuf/timestamp.proto").unwrap();
    assert!(timestamp.is_well_known_type());
    assert!(timestamp.module_full_name().is_none());

    let options = image.get_file("acme/options/options.proto").unwrap();
    assert_eq!(
        options.module_full_name().map(ToString::to_string).as_deref(),
        Some("buf.build/acme/options")
    );
}

#[test]
fn test_build_orders_dependencies_first() {
    let image = build(weather_bucket()).unwrap();
    let paths: Vec<&str> = image.paths().collect();
    let position = |path: &str| paths.iter().position(|p| *p == path).unwrap();

    let weather = position("acme/weather/v1/weather.proto");
    assert!(position("acme/weather/v1/unit.proto") < weather);
    assert!(position("acme/options/options.proto") < weather);
    assert!(position("google/protobuf/descriptor.proto") < position("acme/options/options.proto"));
}

#[test]
fn test_unused_imports() {
    let image = build(weather_bucket()).unwrap();
    let weather = image.get_file("acme/weather/v1/weather.proto").unwrap();

    // options.proto is used through the custom option, unit.proto is not
    let unused: Vec<u32> = weather.unused_dependency_indexes().iter().copied().collect();
    assert_eq!(unused, vec![1]);
    assert_eq!(weather.descriptor().dependencies()[1], "acme/weather/v1/unit.proto");
}

#[test]
fn test_public_import_is_never_unused() {
    let mut bucket = MemoryModuleBucket::new();
    bucket
        .add_file("a.proto", "syntax = \"proto3\";\nimport public \"b.proto\";\n")
        .unwrap();
    bucket.add_file("b.proto", "syntax = \"proto3\";\nmessage B {}\n").unwrap();

    let image = build(bucket).unwrap();
    assert!(image.get_file("a.proto").unwrap().unused_dependency_indexes().is_empty());
}

#[test]
fn test_custom_options_survive_round_trip() {
    let image = build(weather_bucket()).unwrap();
    assert!(contains(&image.encode_to_vec(), b"platform-team"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("image.binpb");
    write_image(&path, &image).unwrap();
    let read = read_image(&path, &DecodeOptions::new()).unwrap();

    assert_eq!(read.paths().collect::<Vec<_>>(), image.paths().collect::<Vec<_>>());
    assert!(contains(&read.encode_to_vec(), b"platform-team"));
    let weather = read.get_file("acme/weather/v1/weather.proto").unwrap();
    assert!(!weather.is_import());
    assert_eq!(weather.unused_dependency_indexes().len(), 1);
}

#[test]
fn test_targets_only_view_round_trips() {
    let targets = build(weather_bucket()).unwrap().without_imports();
    let decoded = Image::decode(&targets.encode_to_vec(), &DecodeOptions::new()).unwrap();

    assert_eq!(decoded.paths().collect::<Vec<_>>(), targets.paths().collect::<Vec<_>>());
    // options.proto is gone, so the custom option stays as raw bytes
    assert!(contains(&decoded.encode_to_vec(), b"platform-team"));
}

#[test]
fn test_syntax_unspecified() {
    let mut bucket = MemoryModuleBucket::new();
    bucket.add_file("legacy.proto", "package legacy;\nmessage Old {}\n").unwrap();
    let image = build(bucket).unwrap();
    assert!(image.get_file("legacy.proto").unwrap().is_syntax_unspecified());
}

#[test]
fn test_missing_import_names_importer() {
    let mut bucket = MemoryModuleBucket::new();
    bucket
        .add_file("a.proto", "syntax = \"proto3\";\nimport \"gone.proto\";\n")
        .unwrap();
    match build(bucket).unwrap_err() {
        Error::ImportNotFound { path, .. } => assert_eq!(path, "gone.proto"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_link_error_is_annotated() {
    let mut bucket = MemoryModuleBucket::new();
    bucket
        .add_file("a.proto", "syntax = \"proto3\";\nmessage A {\n  Missing m = 1;\n}\n")
        .unwrap();
    let err = build(bucket).unwrap_err();
    assert!(err.is_compile());
    let annotations = err.annotations().unwrap();
    assert!(!annotations.is_empty());
    assert_eq!(annotations.annotations()[0].path, "a.proto");
}

#[test]
fn test_cancelled_build() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = build_image(Arc::new(weather_bucket()), &BuildConfig::new(), &cancel).unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[test]
fn test_managed_mode_on_built_image() {
    let mut image = build(weather_bucket()).unwrap();
    let config = ManagedConfig::new().go_package_prefix("github.com/acme/gen");
    let report = modify_image(&mut image, &config).unwrap();
    assert!(report.modified_options > 0);

    let go_package = |path: &str| {
        image
            .get_file(path)
            .unwrap()
            .descriptor()
            .proto()
            .options
            .as_ref()
            .and_then(|o| o.go_package.clone())
    };
    assert_eq!(
        go_package("acme/weather/v1/weather.proto").as_deref(),
        Some("github.com/acme/gen/acme/weather/v1;weatherv1")
    );
    assert_ne!(
        go_package("google/protobuf/timestamp.proto").as_deref(),
        Some("github.com/acme/gen/google/protobuf")
    );
    // custom options are untouched by the rewrite
    assert!(contains(&image.encode_to_vec(), b"platform-team"));
}

#[test]
fn test_code_generator_requests_per_directory() {
    let image = build(weather_bucket()).unwrap();
    let requests = image
        .by_dir()
        .unwrap()
        .iter()
        .map(|dir| dir.to_code_generator_request(&ProjectOptions::new().parameter("paths=source_relative")))
        .collect::<Vec<_>>();

    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(
        request.file_to_generate,
        vec!["acme/weather/v1/unit.proto", "acme/weather/v1/weather.proto"]
    );
    assert_eq!(request.parameter.as_deref(), Some("paths=source_relative"));
    assert_eq!(request.proto_file.len(), image.len());
}

#[test]
fn test_without_imports_then_filter() {
    let image = build(weather_bucket()).unwrap();
    let targets = image.without_imports();
    assert_eq!(targets.len(), 2);

    let unit = image
        .with_only_paths(["acme/weather/v1/unit.proto"], Vec::<String>::new())
        .unwrap();
    assert_eq!(unit.paths().collect::<Vec<_>>(), vec!["acme/weather/v1/unit.proto"]);
}
