//! Unused import detection.
//!
//! A dependency is used when the importing file references a type it
//! defines, or an extension it defines appears among the importing file's
//! options. A dependency also counts as used when it re-exports, through a
//! chain of `public` imports, a file that is used. A file's own `public`
//! imports are never reported.
//!
//! Option usage is read from resolved extension values, so descriptors must
//! have been reparsed for custom options to be seen.

use crate::descriptor::FileDescriptorMessage;
use prost_reflect::{DynamicMessage, Value};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};
use std::collections::{BTreeSet, HashMap, HashSet};

/// For each descriptor, the indexes of dependencies it does not use.
pub(crate) fn unused_dependency_indexes(descriptors: &[FileDescriptorMessage]) -> Vec<BTreeSet<u32>> {
    let mut symbols: HashMap<String, &str> = HashMap::new();
    let mut public_imports: HashMap<&str, Vec<&str>> = HashMap::new();
    for descriptor in descriptors {
        collect_symbols(descriptor.proto(), &mut symbols);
        let proto = descriptor.proto();
        let public = proto
            .public_dependency
            .iter()
            .filter_map(|&index| proto.dependency.get(usize::try_from(index).ok()?))
            .map(String::as_str)
            .collect();
        public_imports.insert(descriptor.name(), public);
    }

    descriptors
        .iter()
        .map(|descriptor| {
            let used = used_files(descriptor, &symbols);
            descriptor
                .dependencies()
                .iter()
                .enumerate()
                .filter(|&(index, dependency)| {
                    !descriptor.is_public_dependency(index)
                        && !is_used(dependency, &used, &public_imports)
                })
                .map(|(index, _)| index as u32)
                .collect()
        })
        .collect()
}

fn is_used(dependency: &str, used: &HashSet<String>, public_imports: &HashMap<&str, Vec<&str>>) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![dependency];
    while let Some(file) = stack.pop() {
        if !visited.insert(file) {
            continue;
        }
        if used.contains(file) {
            return true;
        }
        if let Some(reexported) = public_imports.get(file) {
            stack.extend(reexported.iter().copied());
        }
    }
    false
}

/// Maps every fully-qualified type name (`.pkg.Outer.Inner`) to its file.
fn collect_symbols<'a>(proto: &'a FileDescriptorProto, symbols: &mut HashMap<String, &'a str>) {
    let file = proto.name();
    let scope = match proto.package() {
        "" => String::new(),
        package => format!(".{}", package),
    };
    for message in &proto.message_type {
        collect_message_symbols(message, &scope, file, symbols);
    }
    for enumeration in &proto.enum_type {
        symbols.insert(format!("{}.{}", scope, enumeration.name()), file);
    }
}

fn collect_message_symbols<'a>(
    message: &DescriptorProto,
    scope: &str,
    file: &'a str,
    symbols: &mut HashMap<String, &'a str>,
) {
    let name = format!("{}.{}", scope, message.name());
    for nested in &message.nested_type {
        collect_message_symbols(nested, &name, file, symbols);
    }
    for enumeration in &message.enum_type {
        symbols.insert(format!("{}.{}", name, enumeration.name()), file);
    }
    symbols.insert(name, file);
}

/// Files that `descriptor` draws a type or an option extension from.
fn used_files(descriptor: &FileDescriptorMessage, symbols: &HashMap<String, &str>) -> HashSet<String> {
    let mut references: Vec<&str> = Vec::new();
    let proto = descriptor.proto();
    for message in &proto.message_type {
        collect_message_references(message, &mut references);
    }
    collect_field_references(&proto.extension, &mut references);
    for service in &proto.service {
        for method in &service.method {
            references.push(method.input_type());
            references.push(method.output_type());
        }
    }

    let mut used: HashSet<String> = references
        .into_iter()
        .filter(|name| !name.is_empty())
        .filter_map(|name| symbols.get(name))
        .map(|file| file.to_string())
        .collect();
    collect_extension_files(descriptor.message(), &mut used);
    used.remove(descriptor.name());
    used
}

fn collect_message_references<'a>(message: &'a DescriptorProto, references: &mut Vec<&'a str>) {
    collect_field_references(&message.field, references);
    collect_field_references(&message.extension, references);
    for nested in &message.nested_type {
        collect_message_references(nested, references);
    }
}

fn collect_field_references<'a>(fields: &'a [FieldDescriptorProto], references: &mut Vec<&'a str>) {
    for field in fields {
        references.push(field.type_name());
        references.push(field.extendee());
    }
}

/// Walks the whole descriptor, recording the file of every extension set on
/// any options message.
fn collect_extension_files(message: &DynamicMessage, files: &mut HashSet<String>) {
    for (extension, value) in message.extensions() {
        files.insert(extension.parent_file().name().to_string());
        collect_value_extension_files(value, files);
    }
    for (_, value) in message.fields() {
        collect_value_extension_files(value, files);
    }
}

fn collect_value_extension_files(value: &Value, files: &mut HashSet<String>) {
    match value {
        Value::Message(message) => collect_extension_files(message, files),
        Value::List(items) => {
            for item in items {
                collect_value_extension_files(item, files);
            }
        }
        Value::Map(entries) => {
            for entry in entries.values() {
                collect_value_extension_files(entry, files);
            }
        }
        _ => {}
    }
}
