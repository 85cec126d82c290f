//! Field option rewriting (`jstype`).

use super::config::{FieldOption, ManagedConfig, OverrideValue, OPTIONS_FIELD_NUMBER};
use crate::error::{Error, Result};
use crate::image::ImageFile;
use prost_reflect::{DynamicMessage, Value};
use prost_types::field_descriptor_proto::Type;
use prost_types::field_options::JsType;
use prost_types::{DescriptorProto, FieldDescriptorProto};

/// `FileDescriptorProto.message_type`
const FILE_MESSAGE_TYPE: i32 = 4;
/// `FileDescriptorProto.extension`
const FILE_EXTENSION: i32 = 7;
/// `DescriptorProto.field`
const MESSAGE_FIELD: i32 = 2;
/// `DescriptorProto.nested_type`
const MESSAGE_NESTED_TYPE: i32 = 3;
/// `DescriptorProto.extension`
const MESSAGE_EXTENSION: i32 = 6;

/// A field declaration, addressed by its source path.
struct FieldSite {
    path: Vec<i32>,
    full_name: String,
    field_type: Type,
    js_type: JsType,
}

/// Applies `jstype` overrides to every 64-bit integer field of `file`.
///
/// Source paths of changed options are pushed to `marked`.
pub(super) fn modify_js_type(file: &mut ImageFile, config: &ManagedConfig, marked: &mut Vec<Vec<i32>>) -> Result<()> {
    let option = FieldOption::JsType;
    let rules: Vec<_> = config
        .field_overrides
        .iter()
        .filter(|rule| rule.option == option && rule.selector.matches(file))
        .collect();
    if rules.is_empty() {
        return Ok(());
    }

    let mut changes = Vec::new();
    for site in field_sites(file) {
        if !is_64_bit_integer(site.field_type) || config.is_field_option_disabled(file, &site.full_name, option) {
            continue;
        }
        let mut value = None;
        for rule in &rules {
            if rule.field_name.as_deref().map_or(true, |name| name == site.full_name) {
                value = Some(js_type_value(&rule.value)?);
            }
        }
        match value {
            Some(value) if value != site.js_type => changes.push((site.path, value)),
            _ => {}
        }
    }

    for (path, value) in changes {
        file.descriptor_mut().modify(|message| set_js_type(message, &path, value))?;
        let mut source_path = path;
        source_path.extend([OPTIONS_FIELD_NUMBER, option.field_number()]);
        marked.push(source_path);
    }
    Ok(())
}

fn js_type_value(value: &OverrideValue) -> Result<JsType> {
    match value {
        OverrideValue::JsType(js_type) => Ok(*js_type),
        other => Err(Error::internal(format!("jstype override has non-jstype value {:?}", other))),
    }
}

fn is_64_bit_integer(field_type: Type) -> bool {
    matches!(
        field_type,
        Type::Int64 | Type::Uint64 | Type::Sint64 | Type::Fixed64 | Type::Sfixed64
    )
}

fn field_sites(file: &ImageFile) -> Vec<FieldSite> {
    let proto = file.descriptor().proto();
    let mut sites = Vec::new();
    for (index, message) in proto.message_type.iter().enumerate() {
        collect_message_sites(message, vec![FILE_MESSAGE_TYPE, index as i32], proto.package(), &mut sites);
    }
    for (index, extension) in proto.extension.iter().enumerate() {
        sites.push(site(extension, vec![FILE_EXTENSION, index as i32], proto.package()));
    }
    sites
}

fn collect_message_sites(message: &DescriptorProto, path: Vec<i32>, scope: &str, sites: &mut Vec<FieldSite>) {
    let name = qualify(scope, message.name());
    for (index, field) in message.field.iter().enumerate() {
        sites.push(site(field, child_path(&path, MESSAGE_FIELD, index), &name));
    }
    for (index, extension) in message.extension.iter().enumerate() {
        sites.push(site(extension, child_path(&path, MESSAGE_EXTENSION, index), &name));
    }
    for (index, nested) in message.nested_type.iter().enumerate() {
        collect_message_sites(nested, child_path(&path, MESSAGE_NESTED_TYPE, index), &name, sites);
    }
}

fn site(field: &FieldDescriptorProto, path: Vec<i32>, scope: &str) -> FieldSite {
    FieldSite {
        path,
        full_name: qualify(scope, field.name()),
        field_type: field.r#type(),
        js_type: field.options.as_ref().map_or(JsType::JsNormal, |o| o.jstype()),
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

fn child_path(path: &[i32], field: i32, index: usize) -> Vec<i32> {
    let mut child = path.to_vec();
    child.extend([field, index as i32]);
    child
}

/// Walks `(field number, index)` pairs from the file message to a field.
fn message_at_path<'a>(root: &'a mut DynamicMessage, path: &[i32]) -> Option<&'a mut DynamicMessage> {
    let mut current = root;
    for pair in path.chunks(2) {
        let &[number, index] = pair else {
            return None;
        };
        let list = current
            .get_field_by_number_mut(u32::try_from(number).ok()?)?
            .as_list_mut()?;
        current = list.get_mut(usize::try_from(index).ok()?)?.as_message_mut()?;
    }
    Some(current)
}

fn set_js_type(message: &mut DynamicMessage, path: &[i32], value: JsType) -> Result<()> {
    let field = message_at_path(message, path)
        .ok_or_else(|| Error::internal(format!("no field at source path {:?}", path)))?;
    let options = field
        .get_field_by_name_mut("options")
        .and_then(Value::as_message_mut)
        .ok_or_else(|| Error::internal("FieldDescriptorProto has no options message"))?;
    options
        .try_set_field_by_name("jstype", Value::EnumNumber(value as i32))
        .map_err(|err| Error::internal(format!("cannot set jstype: {}", err)))
}
