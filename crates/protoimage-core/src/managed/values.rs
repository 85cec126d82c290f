//! Default option values derived from a file's package and path.

use crate::normalpath;
use heck::ToUpperCamelCase;

/// Default prefix for `java_package`
pub(crate) const DEFAULT_JAVA_PACKAGE_PREFIX: &str = "com";

/// Default suffix for `php_metadata_namespace`
pub(crate) const DEFAULT_PHP_METADATA_NAMESPACE_SUFFIX: &str = "GPBMetadata";

const PHP_RESERVED_KEYWORDS: &[&str] = &[
    "abstract", "and", "array", "as", "bool", "break", "callable", "case", "catch", "class", "clone",
    "const", "continue", "declare", "default", "die", "do", "echo", "else", "elseif", "empty",
    "enddeclare", "endfor", "endforeach", "endif", "endswitch", "endwhile", "eval", "exit",
    "extends", "false", "final", "finally", "float", "fn", "for", "foreach", "function", "global",
    "goto", "if", "implements", "include", "include_once", "instanceof", "insteadof", "int",
    "interface", "isset", "iterable", "list", "match", "mixed", "namespace", "never", "new",
    "null", "object", "or", "parent", "print", "private", "protected", "public", "readonly",
    "require", "require_once", "return", "self", "static", "string", "switch", "throw", "trait",
    "true", "try", "unset", "use", "var", "void", "while", "xor", "yield",
];

/// `prefix.package.suffix`, skipping empty parts. `None` for no package.
pub(crate) fn java_package(package: &str, prefix: Option<&str>, suffix: Option<&str>) -> Option<String> {
    if package.is_empty() {
        return None;
    }
    let parts: Vec<&str> = [prefix, Some(package), suffix]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect();
    Some(parts.join("."))
}

/// `PascalCase(file stem) + "Proto"`
pub(crate) fn java_outer_classname(path: &str) -> String {
    let base = normalpath::base(path);
    let stem = base.strip_suffix(".proto").unwrap_or(base);
    format!("{}Proto", stem.to_upper_camel_case())
}

/// The Go import path for `path` under `prefix`.
///
/// When the package ends in a version, the import path is followed by an
/// explicit package name made of its last two directories, e.g.
/// `github.com/acme/gen/acme/weather/v1;weatherv1`. Characters Go does not
/// allow in package names (`-`, `.`) become `_`.
pub(crate) fn go_package(path: &str, package: &str, prefix: &str) -> String {
    let import_path = normalpath::join(prefix, normalpath::dir(path));
    if package_version(package).is_some() {
        let parent = normalpath::dir(&import_path);
        if !parent.is_empty() && parent != "." {
            let name = format!("{}{}", normalpath::base(parent), normalpath::base(&import_path));
            return format!("{};{}", import_path, name.replace(&['-', '.'][..], "_"));
        }
    }
    import_path
}

/// Upper-case initials of the package's components, padded to three
/// characters. A trailing version component is skipped.
pub(crate) fn objc_class_prefix(package: &str) -> Option<String> {
    let parts = unversioned_parts(package);
    if parts.is_empty() {
        return None;
    }
    let mut prefix: String = parts
        .iter()
        .filter_map(|part| part.chars().next())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    while prefix.len() < 3 {
        prefix.push('X');
    }
    if prefix == "GPB" {
        prefix = "GPX".to_string();
    }
    Some(prefix)
}

/// `Prefix.Pascal.Package`
pub(crate) fn csharp_namespace(package: &str, prefix: Option<&str>) -> Option<String> {
    if package.is_empty() {
        return None;
    }
    let namespace = package
        .split('.')
        .map(|part| part.to_upper_camel_case())
        .collect::<Vec<_>>()
        .join(".");
    match prefix {
        Some(prefix) if !prefix.is_empty() => Some(format!("{}.{}", prefix, namespace)),
        _ => Some(namespace),
    }
}

/// `Pascal\Package`, with reserved words suffixed by `_`
pub(crate) fn php_namespace(package: &str) -> Option<String> {
    if package.is_empty() {
        return None;
    }
    let namespace = package
        .split('.')
        .map(|part| {
            let part = part.to_upper_camel_case();
            if PHP_RESERVED_KEYWORDS.contains(&part.to_lowercase().as_str()) {
                format!("{}_", part)
            } else {
                part
            }
        })
        .collect::<Vec<_>>()
        .join("\\");
    Some(namespace)
}

/// `php_namespace` followed by `\suffix`
pub(crate) fn php_metadata_namespace(package: &str, suffix: Option<&str>) -> Option<String> {
    let namespace = php_namespace(package)?;
    match suffix {
        Some(suffix) if !suffix.is_empty() => Some(format!("{}\\{}", namespace, suffix)),
        _ => Some(namespace),
    }
}

/// `Pascal::Package`, followed by `::suffix`
pub(crate) fn ruby_package(package: &str, suffix: Option<&str>) -> Option<String> {
    if package.is_empty() {
        return None;
    }
    let mut ruby = package
        .split('.')
        .map(|part| part.to_upper_camel_case())
        .collect::<Vec<_>>()
        .join("::");
    if let Some(suffix) = suffix.filter(|s| !s.is_empty()) {
        ruby.push_str("::");
        ruby.push_str(suffix);
    }
    Some(ruby)
}

/// The trailing version component of a package, if any.
pub(crate) fn package_version(package: &str) -> Option<&str> {
    let last = package.rsplit('.').next()?;
    is_version(last).then_some(last)
}

fn unversioned_parts(package: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = package.split('.').filter(|part| !part.is_empty()).collect();
    if parts.last().is_some_and(|last| is_version(last)) {
        parts.pop();
    }
    parts
}

/// `v1`, `v1alpha`, `v2beta3`, `v1test`, `v1p1alpha`, ...
fn is_version(component: &str) -> bool {
    let Some(rest) = component.strip_prefix('v') else {
        return false;
    };
    let rest = match strip_digits(rest) {
        Some(rest) => rest,
        None => return false,
    };
    if rest.is_empty() {
        return true;
    }
    if let Some(test) = rest.strip_prefix("test") {
        return test.chars().all(|c| c.is_ascii_alphanumeric());
    }
    let rest = match rest.strip_prefix('p') {
        Some(point) => match strip_digits(point) {
            Some(rest) => rest,
            None => return false,
        },
        None => rest,
    };
    match rest.strip_prefix("alpha").or_else(|| rest.strip_prefix("beta")) {
        Some(tail) => tail.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Strips leading ASCII digits, requiring at least one.
fn strip_digits(s: &str) -> Option<&str> {
    let rest = s.trim_start_matches(|c: char| c.is_ascii_digit());
    (rest.len() < s.len()).then_some(rest)
}
