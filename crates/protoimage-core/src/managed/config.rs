//! Managed mode configuration: options, overrides and disable rules.

use crate::error::{Error, Result};
use crate::image::ImageFile;
use crate::module::ModuleFullName;
use crate::normalpath;
use prost_types::field_options::JsType;
use prost_types::file_options::OptimizeMode;
use std::fmt;
use std::str::FromStr;

/// Field number of `options` in `FileDescriptorProto` and `FieldDescriptorProto`
pub(crate) const OPTIONS_FIELD_NUMBER: i32 = 8;

/// A file option managed mode can set.
///
/// `*Prefix` and `*Suffix` variants do not correspond to descriptor fields;
/// they parameterize the computation of their base option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FileOption {
    /// `java_package`
    JavaPackage,
    /// Prefix for the computed `java_package`
    JavaPackagePrefix,
    /// Suffix for the computed `java_package`
    JavaPackageSuffix,
    /// `java_outer_classname`
    JavaOuterClassname,
    /// `java_multiple_files`
    JavaMultipleFiles,
    /// `java_string_check_utf8`
    JavaStringCheckUtf8,
    /// `optimize_for`
    OptimizeFor,
    /// `go_package`
    GoPackage,
    /// Import path prefix for the computed `go_package`
    GoPackagePrefix,
    /// `cc_enable_arenas`
    CcEnableArenas,
    /// `objc_class_prefix`
    ObjcClassPrefix,
    /// `csharp_namespace`
    CsharpNamespace,
    /// Prefix for the computed `csharp_namespace`
    CsharpNamespacePrefix,
    /// `swift_prefix`
    SwiftPrefix,
    /// `php_namespace`
    PhpNamespace,
    /// `php_metadata_namespace`
    PhpMetadataNamespace,
    /// Suffix for the computed `php_metadata_namespace`
    PhpMetadataNamespaceSuffix,
    /// `ruby_package`
    RubyPackage,
    /// Suffix for the computed `ruby_package`
    RubyPackageSuffix,
}

/// Descriptor field name and `FileOptions` field number of each real option.
const FILE_OPTION_FIELDS: &[(FileOption, &str, i32)] = &[
    (FileOption::JavaPackage, "java_package", 1),
    (FileOption::JavaOuterClassname, "java_outer_classname", 8),
    (FileOption::OptimizeFor, "optimize_for", 9),
    (FileOption::JavaMultipleFiles, "java_multiple_files", 10),
    (FileOption::GoPackage, "go_package", 11),
    (FileOption::JavaStringCheckUtf8, "java_string_check_utf8", 27),
    (FileOption::CcEnableArenas, "cc_enable_arenas", 31),
    (FileOption::ObjcClassPrefix, "objc_class_prefix", 36),
    (FileOption::CsharpNamespace, "csharp_namespace", 37),
    (FileOption::SwiftPrefix, "swift_prefix", 39),
    (FileOption::PhpNamespace, "php_namespace", 41),
    (FileOption::PhpMetadataNamespace, "php_metadata_namespace", 44),
    (FileOption::RubyPackage, "ruby_package", 45),
];

impl FileOption {
    /// Every file option
    pub const ALL: [FileOption; 19] = [
        FileOption::JavaPackage,
        FileOption::JavaPackagePrefix,
        FileOption::JavaPackageSuffix,
        FileOption::JavaOuterClassname,
        FileOption::JavaMultipleFiles,
        FileOption::JavaStringCheckUtf8,
        FileOption::OptimizeFor,
        FileOption::GoPackage,
        FileOption::GoPackagePrefix,
        FileOption::CcEnableArenas,
        FileOption::ObjcClassPrefix,
        FileOption::CsharpNamespace,
        FileOption::CsharpNamespacePrefix,
        FileOption::SwiftPrefix,
        FileOption::PhpNamespace,
        FileOption::PhpMetadataNamespace,
        FileOption::PhpMetadataNamespaceSuffix,
        FileOption::RubyPackage,
        FileOption::RubyPackageSuffix,
    ];

    /// Configuration name, e.g. `go_package_prefix`
    pub fn name(self) -> &'static str {
        match self {
            FileOption::JavaPackage => "java_package",
            FileOption::JavaPackagePrefix => "java_package_prefix",
            FileOption::JavaPackageSuffix => "java_package_suffix",
            FileOption::JavaOuterClassname => "java_outer_classname",
            FileOption::JavaMultipleFiles => "java_multiple_files",
            FileOption::JavaStringCheckUtf8 => "java_string_check_utf8",
            FileOption::OptimizeFor => "optimize_for",
            FileOption::GoPackage => "go_package",
            FileOption::GoPackagePrefix => "go_package_prefix",
            FileOption::CcEnableArenas => "cc_enable_arenas",
            FileOption::ObjcClassPrefix => "objc_class_prefix",
            FileOption::CsharpNamespace => "csharp_namespace",
            FileOption::CsharpNamespacePrefix => "csharp_namespace_prefix",
            FileOption::SwiftPrefix => "swift_prefix",
            FileOption::PhpNamespace => "php_namespace",
            FileOption::PhpMetadataNamespace => "php_metadata_namespace",
            FileOption::PhpMetadataNamespaceSuffix => "php_metadata_namespace_suffix",
            FileOption::RubyPackage => "ruby_package",
            FileOption::RubyPackageSuffix => "ruby_package_suffix",
        }
    }

    /// The `FileOptions` field this option sets, with its field number.
    ///
    /// `None` for prefix and suffix options.
    pub(crate) fn field(self) -> Option<(&'static str, i32)> {
        FILE_OPTION_FIELDS
            .iter()
            .find(|(option, _, _)| *option == self)
            .map(|&(_, name, number)| (name, number))
    }

    /// Source path of this option within a file: `[8, field number]`
    pub(crate) fn source_path(self) -> Option<Vec<i32>> {
        self.field().map(|(_, number)| vec![OPTIONS_FIELD_NUMBER, number])
    }
}

impl fmt::Display for FileOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FileOption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FileOption::ALL
            .into_iter()
            .find(|option| option.name() == s)
            .ok_or_else(|| Error::InvalidOptions(format!("unknown file option: {}", s)))
    }
}

/// A field option managed mode can set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FieldOption {
    /// `jstype`, valid on 64-bit integer fields only
    JsType,
}

impl FieldOption {
    /// Configuration name
    pub fn name(self) -> &'static str {
        match self {
            FieldOption::JsType => "jstype",
        }
    }

    /// `FieldOptions` field number
    pub(crate) fn field_number(self) -> i32 {
        match self {
            FieldOption::JsType => 6,
        }
    }
}

impl fmt::Display for FieldOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldOption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "jstype" => Ok(FieldOption::JsType),
            _ => Err(Error::InvalidOptions(format!("unknown field option: {}", s))),
        }
    }
}

/// The value of an override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideValue {
    /// String options, prefixes and suffixes
    String(String),
    /// Boolean options
    Bool(bool),
    /// `optimize_for`
    OptimizeMode(OptimizeMode),
    /// `jstype`
    JsType(JsType),
}

impl From<&str> for OverrideValue {
    fn from(value: &str) -> Self {
        OverrideValue::String(value.to_string())
    }
}

impl From<String> for OverrideValue {
    fn from(value: String) -> Self {
        OverrideValue::String(value)
    }
}

impl From<bool> for OverrideValue {
    fn from(value: bool) -> Self {
        OverrideValue::Bool(value)
    }
}

impl From<OptimizeMode> for OverrideValue {
    fn from(value: OptimizeMode) -> Self {
        OverrideValue::OptimizeMode(value)
    }
}

impl From<JsType> for OverrideValue {
    fn from(value: JsType) -> Self {
        OverrideValue::JsType(value)
    }
}

/// Matches files by path (file or directory) and module; unset matches all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSelector {
    /// Normalized file or directory path
    pub path: Option<String>,
    /// Module the file must belong to
    pub module_full_name: Option<ModuleFullName>,
}

impl FileSelector {
    /// Returns true if the selector names neither path nor module
    pub fn is_global(&self) -> bool {
        self.path.is_none() && self.module_full_name.is_none()
    }

    /// Returns true if `file` is selected
    pub fn matches(&self, file: &ImageFile) -> bool {
        if let Some(path) = &self.path {
            if !normalpath::equals_or_contains(path, file.path()) {
                return false;
            }
        }
        if let Some(module) = &self.module_full_name {
            if file.module_full_name() != Some(module) {
                return false;
            }
        }
        true
    }

    fn validate(&self) -> Result<()> {
        if let Some(path) = &self.path {
            if normalpath::normalize(path)? != *path {
                return Err(Error::invalid_path(path.clone(), "rule path is not normalized"));
            }
        }
        Ok(())
    }
}

/// Turns managed mode off for matching files, fields and options.
///
/// Every unset criterion matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisableRule {
    /// Which files
    pub selector: FileSelector,
    /// Fully-qualified field name, for field options
    pub field_name: Option<String>,
    /// Which file option
    pub file_option: Option<FileOption>,
    /// Which field option
    pub field_option: Option<FieldOption>,
}

impl DisableRule {
    /// Disables everything until narrowed
    pub fn new() -> Self {
        Self::default()
    }

    /// Only files at or under `path`
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.selector.path = Some(path.into());
        self
    }

    /// Only files of `module`
    pub fn module(mut self, module: ModuleFullName) -> Self {
        self.selector.module_full_name = Some(module);
        self
    }

    /// Only the field with this fully-qualified name
    pub fn field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    /// Only this file option
    pub fn file_option(mut self, option: FileOption) -> Self {
        self.file_option = Some(option);
        self
    }

    /// Only this field option
    pub fn field_option(mut self, option: FieldOption) -> Self {
        self.field_option = Some(option);
        self
    }

    pub(crate) fn disables_file_option(&self, file: &ImageFile, option: FileOption) -> bool {
        self.field_name.is_none()
            && self.field_option.is_none()
            && self.file_option.map_or(true, |o| o == option)
            && self.selector.matches(file)
    }

    pub(crate) fn disables_field_option(&self, file: &ImageFile, field_name: &str, option: FieldOption) -> bool {
        self.file_option.is_none()
            && self.field_option.map_or(true, |o| o == option)
            && self.field_name.as_deref().map_or(true, |name| name == field_name)
            && self.selector.matches(file)
    }
}

/// Sets a file option, prefix or suffix for matching files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOptionOverride {
    /// Which files
    pub selector: FileSelector,
    /// The option to override
    pub option: FileOption,
    /// The value
    pub value: OverrideValue,
}

impl FileOptionOverride {
    /// Overrides `option` for every file until narrowed
    pub fn new(option: FileOption, value: impl Into<OverrideValue>) -> Self {
        Self {
            selector: FileSelector::default(),
            option,
            value: value.into(),
        }
    }

    /// Only files at or under `path`
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.selector.path = Some(path.into());
        self
    }

    /// Only files of `module`
    pub fn module(mut self, module: ModuleFullName) -> Self {
        self.selector.module_full_name = Some(module);
        self
    }
}

/// Sets a field option on matching fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOptionOverride {
    /// Which files
    pub selector: FileSelector,
    /// Fully-qualified field name; unset matches every field
    pub field_name: Option<String>,
    /// The option to override
    pub option: FieldOption,
    /// The value
    pub value: OverrideValue,
}

impl FieldOptionOverride {
    /// Overrides `option` on every field until narrowed
    pub fn new(option: FieldOption, value: impl Into<OverrideValue>) -> Self {
        Self {
            selector: FileSelector::default(),
            field_name: None,
            option,
            value: value.into(),
        }
    }

    /// Only files at or under `path`
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.selector.path = Some(path.into());
        self
    }

    /// Only files of `module`
    pub fn module(mut self, module: ModuleFullName) -> Self {
        self.selector.module_full_name = Some(module);
        self
    }

    /// Only the field with this fully-qualified name
    pub fn field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }
}

/// Managed mode configuration.
///
/// Rules apply in declaration order; for overrides, the last matching rule
/// wins.
///
/// # Example
///
/// ```
/// use protoimage_core::managed::{FileOption, ManagedConfig};
///
/// let weather = "buf.build/acme/weather".parse()?;
/// let config = ManagedConfig::new()
///     .go_package_prefix("github.com/acme/gen")
///     .except_module(FileOption::GoPackage, weather);
/// # Ok::<(), protoimage_core::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManagedConfig {
    /// Disable rules
    pub disables: Vec<DisableRule>,
    /// File option overrides
    pub file_overrides: Vec<FileOptionOverride>,
    /// Field option overrides
    pub field_overrides: Vec<FieldOptionOverride>,
}

impl ManagedConfig {
    /// Create a configuration with no rules; defaults still apply
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a disable rule
    pub fn disable(mut self, rule: DisableRule) -> Self {
        self.disables.push(rule);
        self
    }

    /// Add a file option override
    pub fn override_file_option(mut self, rule: FileOptionOverride) -> Self {
        self.file_overrides.push(rule);
        self
    }

    /// Add a field option override
    pub fn override_field_option(mut self, rule: FieldOptionOverride) -> Self {
        self.field_overrides.push(rule);
        self
    }

    /// Compute `go_package` for every file under `prefix`
    pub fn go_package_prefix(self, prefix: impl Into<String>) -> Self {
        self.override_file_option(FileOptionOverride::new(FileOption::GoPackagePrefix, prefix.into()))
    }

    /// Leave `option` alone for files of `module`
    pub fn except_module(self, option: FileOption, module: ModuleFullName) -> Self {
        self.disable(DisableRule::new().file_option(option).module(module))
    }

    /// Override `option` for files of `module`
    pub fn override_for_module(
        self,
        option: FileOption,
        module: ModuleFullName,
        value: impl Into<OverrideValue>,
    ) -> Self {
        self.override_file_option(FileOptionOverride::new(option, value).module(module))
    }

    /// Override `option` for files at or under `path`
    pub fn override_for_file(self, option: FileOption, path: impl Into<String>, value: impl Into<OverrideValue>) -> Self {
        self.override_file_option(FileOptionOverride::new(option, value).path(path))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.disables.iter().try_for_each(|rule| rule.selector.validate())?;
        self.file_overrides.iter().try_for_each(|rule| rule.selector.validate())?;
        self.field_overrides.iter().try_for_each(|rule| rule.selector.validate())
    }

    /// Returns true if `option` is disabled for `file`
    pub(crate) fn is_file_option_disabled(&self, file: &ImageFile, option: FileOption) -> bool {
        self.disables.iter().any(|rule| rule.disables_file_option(file, option))
    }

    /// Returns true if `option` is disabled for the field `field_name` of `file`
    pub(crate) fn is_field_option_disabled(&self, file: &ImageFile, field_name: &str, option: FieldOption) -> bool {
        self.disables
            .iter()
            .any(|rule| rule.disables_field_option(file, field_name, option))
    }
}
