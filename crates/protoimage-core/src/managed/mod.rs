//! Managed mode: rewriting language-specific options across an image.
//!
//! [`modify_image`] walks every file of an image and sets file options
//! (`go_package`, `java_package`, ...) and field options (`jstype`) from a
//! [`ManagedConfig`]. Values come from, in increasing priority:
//!
//! 1. defaults derived from the file's package and path
//! 2. prefix and suffix overrides, which parameterize the derived value
//! 3. value overrides, which replace it
//!
//! Disable rules exempt files, fields or options entirely, and well-known
//! type files are never touched. An option is only written when its value
//! changes; each written option's source info is removed when the pass ends.
//!
//! # Example
//!
//! ```no_run
//! use protoimage_core::managed::{modify_image, ManagedConfig};
//! use protoimage_core::{read_image, DecodeOptions};
//!
//! let mut image = read_image("image.binpb", &DecodeOptions::new())?;
//! let config = ManagedConfig::new().go_package_prefix("github.com/acme/gen");
//! let report = modify_image(&mut image, &config)?;
//! println!("{} options changed", report.modified_options);
//! # Ok::<(), protoimage_core::Error>(())
//! ```

mod config;
mod field;
mod sweeper;
mod values;

pub use config::{
    DisableRule, FieldOption, FieldOptionOverride, FileOption, FileOptionOverride, FileSelector, ManagedConfig,
    OverrideValue,
};

use crate::error::{Error, Result};
use crate::image::{Image, ImageFile};
use prost_reflect::Value;
use prost_types::file_options::OptimizeMode;
use sweeper::MarkSweeper;
use tracing::{debug, trace, warn};

/// What a managed mode pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifyReport {
    /// Number of option values written
    pub modified_options: usize,
    /// Number of source locations removed
    pub removed_locations: usize,
    /// Overrides whose file selector matched no file, described for display
    pub unused_overrides: Vec<String>,
}

/// Rewrites options across `image` according to `config`.
///
/// Files shared with other images are copied before they change, so images
/// cloned from `image` keep their original options.
pub fn modify_image(image: &mut Image, config: &ManagedConfig) -> Result<ModifyReport> {
    config.validate()?;

    let paths: Vec<String> = image.paths().map(str::to_string).collect();
    let mut usage = OverrideUsage::new(config);
    let mut report = ModifyReport::default();
    let mut sweeper = MarkSweeper::new(image);

    for path in &paths {
        let Some(file) = sweeper.image_mut().get_file(path) else {
            continue;
        };
        usage.record(file, config);
        if file.is_well_known_type() {
            trace!("Skipping well-known type {}", path);
            continue;
        }
        let Some(file) = sweeper.image_mut().get_file_mut(path) else {
            continue;
        };

        let mut marked = Vec::new();
        let result = modify_file(file, config, &mut marked);
        report.modified_options += marked.len();
        for source_path in marked {
            sweeper.mark(path, source_path);
        }
        result?;
    }

    report.removed_locations = sweeper.sweep()?;
    report.unused_overrides = usage.unused(config);
    for description in &report.unused_overrides {
        warn!("Override never matched a file: {}", description);
    }
    debug!(
        "Managed mode changed {} options, removed {} source locations",
        report.modified_options, report.removed_locations
    );
    Ok(report)
}

/// Tracks which selector-scoped overrides matched at least one file.
struct OverrideUsage {
    file: Vec<bool>,
    field: Vec<bool>,
}

impl OverrideUsage {
    fn new(config: &ManagedConfig) -> Self {
        Self {
            file: config.file_overrides.iter().map(|rule| rule.selector.is_global()).collect(),
            field: config.field_overrides.iter().map(|rule| rule.selector.is_global()).collect(),
        }
    }

    fn record(&mut self, file: &ImageFile, config: &ManagedConfig) {
        for (used, rule) in self.file.iter_mut().zip(&config.file_overrides) {
            *used = *used || rule.selector.matches(file);
        }
        for (used, rule) in self.field.iter_mut().zip(&config.field_overrides) {
            *used = *used || rule.selector.matches(file);
        }
    }

    fn unused(&self, config: &ManagedConfig) -> Vec<String> {
        let file = config
            .file_overrides
            .iter()
            .zip(&self.file)
            .filter(|(_, used)| !**used)
            .map(|(rule, _)| format!("{} {}", rule.option, describe_selector(&rule.selector)));
        let field = config
            .field_overrides
            .iter()
            .zip(&self.field)
            .filter(|(_, used)| !**used)
            .map(|(rule, _)| format!("{} {}", rule.option, describe_selector(&rule.selector)));
        file.chain(field).collect()
    }
}

fn describe_selector(selector: &FileSelector) -> String {
    match (&selector.path, &selector.module_full_name) {
        (Some(path), Some(module)) => format!("for {} in {}", path, module),
        (Some(path), None) => format!("for {}", path),
        (None, Some(module)) => format!("for {}", module),
        (None, None) => "for all files".to_string(),
    }
}

/// A string option with its optional prefix and suffix options.
struct StringFamily {
    option: FileOption,
    prefix: Option<FileOption>,
    suffix: Option<FileOption>,
    default_prefix: Option<&'static str>,
    default_suffix: Option<&'static str>,
    derive: fn(&ImageFile, &StringOverride) -> Option<String>,
}

/// The resolved override state for one string option of one file.
#[derive(Debug, Default, PartialEq, Eq)]
struct StringOverride {
    value: Option<String>,
    prefix: Option<String>,
    suffix: Option<String>,
}

const STRING_FAMILIES: &[StringFamily] = &[
    StringFamily {
        option: FileOption::JavaPackage,
        prefix: Some(FileOption::JavaPackagePrefix),
        suffix: Some(FileOption::JavaPackageSuffix),
        default_prefix: Some(values::DEFAULT_JAVA_PACKAGE_PREFIX),
        default_suffix: None,
        derive: derive_java_package,
    },
    StringFamily {
        option: FileOption::JavaOuterClassname,
        prefix: None,
        suffix: None,
        default_prefix: None,
        default_suffix: None,
        derive: derive_java_outer_classname,
    },
    StringFamily {
        option: FileOption::GoPackage,
        prefix: Some(FileOption::GoPackagePrefix),
        suffix: None,
        default_prefix: None,
        default_suffix: None,
        derive: derive_go_package,
    },
    StringFamily {
        option: FileOption::ObjcClassPrefix,
        prefix: None,
        suffix: None,
        default_prefix: None,
        default_suffix: None,
        derive: derive_objc_class_prefix,
    },
    StringFamily {
        option: FileOption::CsharpNamespace,
        prefix: Some(FileOption::CsharpNamespacePrefix),
        suffix: None,
        default_prefix: None,
        default_suffix: None,
        derive: derive_csharp_namespace,
    },
    StringFamily {
        option: FileOption::SwiftPrefix,
        prefix: None,
        suffix: None,
        default_prefix: None,
        default_suffix: None,
        derive: derive_nothing,
    },
    StringFamily {
        option: FileOption::PhpNamespace,
        prefix: None,
        suffix: None,
        default_prefix: None,
        default_suffix: None,
        derive: derive_php_namespace,
    },
    StringFamily {
        option: FileOption::PhpMetadataNamespace,
        prefix: None,
        suffix: Some(FileOption::PhpMetadataNamespaceSuffix),
        default_prefix: None,
        default_suffix: Some(values::DEFAULT_PHP_METADATA_NAMESPACE_SUFFIX),
        derive: derive_php_metadata_namespace,
    },
    StringFamily {
        option: FileOption::RubyPackage,
        prefix: None,
        suffix: Some(FileOption::RubyPackageSuffix),
        default_prefix: None,
        default_suffix: None,
        derive: derive_ruby_package,
    },
];

/// Scalar options and their managed defaults.
const SCALAR_OPTIONS: &[(FileOption, Option<ScalarDefault>)] = &[
    (FileOption::JavaMultipleFiles, Some(ScalarDefault::Bool(true))),
    (FileOption::JavaStringCheckUtf8, None),
    (FileOption::OptimizeFor, Some(ScalarDefault::OptimizeMode(OptimizeMode::Speed))),
    (FileOption::CcEnableArenas, None),
];

#[derive(Debug, Clone, Copy)]
enum ScalarDefault {
    Bool(bool),
    OptimizeMode(OptimizeMode),
}

fn package(file: &ImageFile) -> &str {
    file.descriptor().package()
}

fn derive_java_package(file: &ImageFile, o: &StringOverride) -> Option<String> {
    values::java_package(package(file), o.prefix.as_deref(), o.suffix.as_deref())
}

fn derive_java_outer_classname(file: &ImageFile, _: &StringOverride) -> Option<String> {
    Some(values::java_outer_classname(file.path()))
}

fn derive_go_package(file: &ImageFile, o: &StringOverride) -> Option<String> {
    let prefix = o.prefix.as_deref().filter(|prefix| !prefix.is_empty())?;
    Some(values::go_package(file.path(), package(file), prefix))
}

fn derive_objc_class_prefix(file: &ImageFile, _: &StringOverride) -> Option<String> {
    values::objc_class_prefix(package(file))
}

fn derive_csharp_namespace(file: &ImageFile, o: &StringOverride) -> Option<String> {
    values::csharp_namespace(package(file), o.prefix.as_deref())
}

/// Options with no derived default; only a value override sets them
fn derive_nothing(_: &ImageFile, _: &StringOverride) -> Option<String> {
    None
}

fn derive_php_namespace(file: &ImageFile, _: &StringOverride) -> Option<String> {
    values::php_namespace(package(file))
}

fn derive_php_metadata_namespace(file: &ImageFile, o: &StringOverride) -> Option<String> {
    values::php_metadata_namespace(package(file), o.suffix.as_deref())
}

fn derive_ruby_package(file: &ImageFile, o: &StringOverride) -> Option<String> {
    values::ruby_package(package(file), o.suffix.as_deref())
}

fn modify_file(file: &mut ImageFile, config: &ManagedConfig, marked: &mut Vec<Vec<i32>>) -> Result<()> {
    for family in STRING_FAMILIES {
        modify_string_option(file, config, family, marked)?;
    }
    for &(option, default) in SCALAR_OPTIONS {
        modify_scalar_option(file, config, option, default, marked)?;
    }
    field::modify_js_type(file, config, marked)
}

fn modify_string_option(
    file: &mut ImageFile,
    config: &ManagedConfig,
    family: &StringFamily,
    marked: &mut Vec<Vec<i32>>,
) -> Result<()> {
    if config.is_file_option_disabled(file, family.option) {
        return Ok(());
    }
    let prefix_enabled = family
        .prefix
        .is_some_and(|prefix| !config.is_file_option_disabled(file, prefix));
    let suffix_enabled = family
        .suffix
        .is_some_and(|suffix| !config.is_file_option_disabled(file, suffix));

    let mut resolved = StringOverride {
        value: None,
        prefix: family.default_prefix.filter(|_| prefix_enabled).map(str::to_string),
        suffix: family.default_suffix.filter(|_| suffix_enabled).map(str::to_string),
    };
    for rule in config.file_overrides.iter().filter(|rule| rule.selector.matches(file)) {
        if rule.option == family.option {
            resolved = StringOverride {
                value: Some(string_value(rule.option, &rule.value)?),
                prefix: None,
                suffix: None,
            };
        } else if prefix_enabled && Some(rule.option) == family.prefix {
            resolved.value = None;
            resolved.prefix = Some(string_value(rule.option, &rule.value)?);
        } else if suffix_enabled && Some(rule.option) == family.suffix {
            resolved.value = None;
            resolved.suffix = Some(string_value(rule.option, &rule.value)?);
        }
    }

    let value = match resolved.value.take() {
        Some(value) => value,
        None => match (family.derive)(file, &resolved) {
            Some(value) => value,
            None => return Ok(()),
        },
    };
    set_if_changed(file, family.option, Value::String(value), marked)
}

fn modify_scalar_option(
    file: &mut ImageFile,
    config: &ManagedConfig,
    option: FileOption,
    default: Option<ScalarDefault>,
    marked: &mut Vec<Vec<i32>>,
) -> Result<()> {
    if config.is_file_option_disabled(file, option) {
        return Ok(());
    }
    let mut value = default.map(|default| match default {
        ScalarDefault::Bool(b) => Value::Bool(b),
        ScalarDefault::OptimizeMode(mode) => Value::EnumNumber(mode as i32),
    });
    for rule in config.file_overrides.iter().filter(|rule| rule.selector.matches(file)) {
        if rule.option == option {
            value = Some(scalar_value(option, &rule.value)?);
        }
    }
    match value {
        Some(value) => set_if_changed(file, option, value, marked),
        None => Ok(()),
    }
}

fn string_value(option: FileOption, value: &OverrideValue) -> Result<String> {
    match value {
        OverrideValue::String(s) => Ok(s.clone()),
        other => Err(Error::internal(format!("{} override must be a string, got {:?}", option, other))),
    }
}

fn scalar_value(option: FileOption, value: &OverrideValue) -> Result<Value> {
    match (option, value) {
        (FileOption::OptimizeFor, OverrideValue::OptimizeMode(mode)) => Ok(Value::EnumNumber(*mode as i32)),
        (FileOption::OptimizeFor, other) => Err(Error::internal(format!(
            "optimize_for override must be an optimize mode, got {:?}",
            other
        ))),
        (_, OverrideValue::Bool(b)) => Ok(Value::Bool(*b)),
        (_, other) => Err(Error::internal(format!("{} override must be a bool, got {:?}", option, other))),
    }
}

fn set_if_changed(file: &mut ImageFile, option: FileOption, value: Value, marked: &mut Vec<Vec<i32>>) -> Result<()> {
    let (Some((field_name, _)), Some(source_path)) = (option.field(), option.source_path()) else {
        return Err(Error::internal(format!("{} is not a descriptor option", option)));
    };
    if file.descriptor().file_option(field_name).as_ref() == Some(&value) {
        return Ok(());
    }
    trace!("Setting {} on {}", field_name, file.path());
    file.descriptor_mut().set_file_option(field_name, value)?;
    marked.push(source_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FileDescriptorMessage;
    use crate::module::ModuleFullName;
    use pretty_assertions::assert_eq;
    use prost_types::source_code_info::Location;
    use prost_types::{FileDescriptorProto, FileOptions, SourceCodeInfo};

    fn proto_file(path: &str, package: &str, module: Option<&str>) -> ImageFile {
        let descriptor = FileDescriptorMessage::from_proto(FileDescriptorProto {
            name: Some(path.to_string()),
            package: Some(package.to_string()),
            options: Some(FileOptions {
                go_package: Some("example.com/old".to_string()),
                ..Default::default()
            }),
            source_code_info: Some(SourceCodeInfo {
                location: vec![
                    Location {
                        path: vec![8, 11],
                        ..Default::default()
                    },
                    Location {
                        path: vec![2],
                        ..Default::default()
                    },
                ],
            }),
            syntax: Some("proto3".to_string()),
            ..Default::default()
        })
        .unwrap();
        ImageFile::builder(descriptor)
            .module_full_name(module.map(|m| m.parse().unwrap()))
            .build()
            .unwrap()
    }

    fn options(image: &Image, path: &str) -> FileOptions {
        image
            .get_file(path)
            .unwrap()
            .descriptor()
            .proto()
            .options
            .clone()
            .unwrap_or_default()
    }

    fn locations(image: &Image, path: &str) -> Vec<Vec<i32>> {
        let file = image.get_file(path).unwrap();
        let info = file.descriptor().proto().source_code_info.clone().unwrap_or_default();
        info.location.into_iter().map(|l| l.path).collect()
    }

    #[test]
    fn test_go_package_prefix_with_version() {
        let mut image = Image::new(vec![proto_file("acme/weather/v1/a.proto", "acme.weather.v1", None)]).unwrap();
        let config = ManagedConfig::new().go_package_prefix("github.com/acme/gen");
        modify_image(&mut image, &config).unwrap();

        assert_eq!(
            options(&image, "acme/weather/v1/a.proto").go_package(),
            "github.com/acme/gen/acme/weather/v1;weatherv1"
        );
        assert_eq!(locations(&image, "acme/weather/v1/a.proto"), vec![vec![2]]);
    }

    #[test]
    fn test_defaults() {
        let mut image = Image::new(vec![proto_file("acme/weather/v1/a.proto", "acme.weather.v1", None)]).unwrap();
        modify_image(&mut image, &ManagedConfig::new()).unwrap();

        let options = options(&image, "acme/weather/v1/a.proto");
        assert_eq!(options.java_package(), "com.acme.weather.v1");
        assert_eq!(options.java_outer_classname(), "AProto");
        assert!(options.java_multiple_files());
        assert_eq!(options.objc_class_prefix(), "AWX");
        assert_eq!(options.csharp_namespace(), "Acme.Weather.V1");
        assert_eq!(options.php_namespace(), "Acme\\Weather\\V1");
        assert_eq!(options.php_metadata_namespace(), "Acme\\Weather\\V1\\GPBMetadata");
        assert_eq!(options.ruby_package(), "Acme::Weather::V1");
        // no prefix configured: go_package is left alone
        assert_eq!(options.go_package(), "example.com/old");
        assert!(options.swift_prefix.is_none());
    }

    #[test]
    fn test_per_file_override_wins() {
        let mut image = Image::new(vec![
            proto_file("acme/weather/v1/a.proto", "acme.weather.v1", None),
            proto_file("acme/weather/v1/b.proto", "acme.weather.v1", None),
        ])
        .unwrap();
        let config = ManagedConfig::new()
            .go_package_prefix("github.com/acme/gen")
            .override_for_file(FileOption::GoPackage, "acme/weather/v1/b.proto", "example.com/b");
        modify_image(&mut image, &config).unwrap();

        assert_eq!(
            options(&image, "acme/weather/v1/a.proto").go_package(),
            "github.com/acme/gen/acme/weather/v1;weatherv1"
        );
        assert_eq!(options(&image, "acme/weather/v1/b.proto").go_package(), "example.com/b");
    }

    #[test]
    fn test_module_exception() {
        let mut image = Image::new(vec![
            proto_file("acme/a.proto", "acme", Some("buf.build/acme/app")),
            proto_file("googleapis/b.proto", "google.api", Some("buf.build/googleapis/googleapis")),
        ])
        .unwrap();
        let googleapis: ModuleFullName = "buf.build/googleapis/googleapis".parse().unwrap();
        let config = ManagedConfig::new()
            .go_package_prefix("github.com/acme/gen")
            .except_module(FileOption::GoPackage, googleapis);
        modify_image(&mut image, &config).unwrap();

        assert_eq!(options(&image, "acme/a.proto").go_package(), "github.com/acme/gen/acme");
        assert_eq!(options(&image, "googleapis/b.proto").go_package(), "example.com/old");
    }

    #[test]
    fn test_prefix_then_suffix_compose() {
        let mut image = Image::new(vec![proto_file("a.proto", "acme.weather", None)]).unwrap();
        let config = ManagedConfig::new()
            .override_file_option(FileOptionOverride::new(FileOption::JavaPackage, "fixed.value"))
            .override_file_option(FileOptionOverride::new(FileOption::JavaPackagePrefix, "org"))
            .override_file_option(FileOptionOverride::new(FileOption::JavaPackageSuffix, "pb"));
        modify_image(&mut image, &config).unwrap();
        assert_eq!(options(&image, "a.proto").java_package(), "org.acme.weather.pb");
    }

    #[test]
    fn test_disabled_prefix_is_ignored() {
        let mut image = Image::new(vec![proto_file("a.proto", "acme", None)]).unwrap();
        let config = ManagedConfig::new()
            .override_file_option(FileOptionOverride::new(FileOption::JavaPackagePrefix, "org"))
            .disable(DisableRule::new().file_option(FileOption::JavaPackagePrefix));
        modify_image(&mut image, &config).unwrap();
        assert_eq!(options(&image, "a.proto").java_package(), "acme");
    }

    #[test]
    fn test_idempotent() {
        let mut image = Image::new(vec![proto_file("acme/weather/v1/a.proto", "acme.weather.v1", None)]).unwrap();
        let config = ManagedConfig::new()
            .go_package_prefix("github.com/acme/gen")
            .override_file_option(FileOptionOverride::new(FileOption::OptimizeFor, OptimizeMode::CodeSize));
        let first = modify_image(&mut image, &config).unwrap();
        assert!(first.modified_options > 0);
        let before = image.encode_to_vec();

        let second = modify_image(&mut image, &config).unwrap();
        assert_eq!(second.modified_options, 0);
        assert_eq!(image.encode_to_vec(), before);
    }

    #[test]
    fn test_well_known_types_untouched() {
        let mut image = Image::new(vec![proto_file("google/protobuf/timestamp.proto", "google.protobuf", None)]).unwrap();
        let report = modify_image(&mut image, &ManagedConfig::new()).unwrap();
        assert_eq!(report.modified_options, 0);
        assert_eq!(options(&image, "google/protobuf/timestamp.proto").java_package(), "");
    }

    #[test]
    fn test_type_mismatch_is_internal() {
        let mut image = Image::new(vec![proto_file("a.proto", "acme", None)]).unwrap();
        let config = ManagedConfig::new().override_file_option(FileOptionOverride::new(FileOption::GoPackage, true));
        let err = modify_image(&mut image, &config).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_reports_unused_overrides() {
        let mut image = Image::new(vec![proto_file("a.proto", "acme", None)]).unwrap();
        let config = ManagedConfig::new()
            .go_package_prefix("github.com/acme/gen")
            .override_for_file(FileOption::GoPackage, "missing.proto", "x")
            .override_for_module(
                FileOption::JavaPackage,
                "buf.build/acme/other".parse().unwrap(),
                "com.other",
            );
        let report = modify_image(&mut image, &config).unwrap();
        assert_eq!(
            report.unused_overrides,
            vec![
                "go_package for missing.proto".to_string(),
                "java_package for buf.build/acme/other".to_string(),
            ]
        );
    }

    #[test]
    fn test_override_on_well_known_type_counts_as_matched() {
        let mut image = Image::new(vec![
            proto_file("google/protobuf/timestamp.proto", "google.protobuf", None),
            proto_file("a.proto", "acme", None),
        ])
        .unwrap();
        let config = ManagedConfig::new().override_for_file(
            FileOption::GoPackage,
            "google/protobuf/timestamp.proto",
            "example.com/timestamppb",
        );
        let report = modify_image(&mut image, &config).unwrap();
        assert!(report.unused_overrides.is_empty());
        assert_eq!(
            options(&image, "google/protobuf/timestamp.proto").go_package(),
            "example.com/old"
        );
    }

    #[test]
    fn test_go_package_versioned_package_outside_version_dir() {
        let mut image = Image::new(vec![proto_file("proto/a.proto", "acme.weather.v1", None)]).unwrap();
        modify_image(&mut image, &ManagedConfig::new().go_package_prefix("github.com/acme/gen")).unwrap();
        assert_eq!(
            options(&image, "proto/a.proto").go_package(),
            "github.com/acme/gen/proto;genproto"
        );
    }

    #[test]
    fn test_clone_keeps_original_options() {
        let original = Image::new(vec![proto_file("a.proto", "acme", None)]).unwrap();
        let mut copy = original.clone();
        modify_image(&mut copy, &ManagedConfig::new().go_package_prefix("github.com/acme/gen")).unwrap();
        assert_eq!(options(&original, "a.proto").go_package(), "example.com/old");
        assert_eq!(options(&copy, "a.proto").go_package(), "github.com/acme/gen");
    }
}
