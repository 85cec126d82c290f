//! Normalized, slash-separated relative paths.
//!
//! Every path stored in an image is normalized: relative, `/`-separated,
//! no `.` or empty components, and never escaping its root.

use crate::error::{Error, Result};

/// Normalize a relative path.
///
/// `./a//b.proto` becomes `a/b.proto`. Absolute paths, backslashes and paths
/// that escape the root via `..` are rejected.
pub fn normalize(path: &str) -> Result<String> {
    if path.is_empty() {
        return Err(Error::invalid_path(path, "path is empty"));
    }
    if path.contains('\\') {
        return Err(Error::invalid_path(path, "path must use forward slashes"));
    }
    if path.starts_with('/') {
        return Err(Error::invalid_path(path, "path must be relative"));
    }

    let mut components: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if components.pop().is_none() {
                    return Err(Error::invalid_path(path, "path escapes its root"));
                }
            }
            other => components.push(other),
        }
    }

    if components.is_empty() {
        Ok(".".to_string())
    } else {
        Ok(components.join("/"))
    }
}

/// The directory of a normalized path, or `.` for a root-level file.
pub fn dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => ".",
    }
}

/// The final component of a normalized path.
pub fn base(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Join two normalized paths, treating `.` and empty as identity.
pub fn join(left: &str, right: &str) -> String {
    match (left, right) {
        ("" | ".", "" | ".") => ".".to_string(),
        ("" | ".", right) => right.to_string(),
        (left, "" | ".") => left.trim_end_matches('/').to_string(),
        (left, right) => format!("{}/{}", left.trim_end_matches('/'), right),
    }
}

/// Returns true if `path` equals `parent` or is nested under it.
///
/// `.` contains every path.
pub fn equals_or_contains(parent: &str, path: &str) -> bool {
    if parent == "." || parent == path {
        return true;
    }
    path.len() > parent.len() && path.starts_with(parent) && path.as_bytes()[parent.len()] == b'/'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a/b.proto").unwrap(), "a/b.proto");
        assert_eq!(normalize("./a//b.proto").unwrap(), "a/b.proto");
        assert_eq!(normalize("a/c/../b.proto").unwrap(), "a/b.proto");
        assert_eq!(normalize("a/").unwrap(), "a");
        assert_eq!(normalize(".").unwrap(), ".");
    }

    #[test]
    fn test_normalize_rejects() {
        assert!(normalize("").is_err());
        assert!(normalize("/abs.proto").is_err());
        assert!(normalize("../up.proto").is_err());
        assert!(normalize("a\\b.proto").is_err());
    }

    #[test]
    fn test_dir_and_base() {
        assert_eq!(dir("a/b/c.proto"), "a/b");
        assert_eq!(dir("c.proto"), ".");
        assert_eq!(base("a/b/c.proto"), "c.proto");
        assert_eq!(base("c.proto"), "c.proto");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("github.com/acme", "a/b"), "github.com/acme/a/b");
        assert_eq!(join("github.com/acme", "."), "github.com/acme");
        assert_eq!(join(".", "a"), "a");
    }

    #[test]
    fn test_equals_or_contains() {
        assert!(equals_or_contains("a", "a/b.proto"));
        assert!(equals_or_contains("a/b.proto", "a/b.proto"));
        assert!(equals_or_contains(".", "a/b.proto"));
        assert!(!equals_or_contains("a", "ab/c.proto"));
        assert!(!equals_or_contains("a/b", "a"));
    }
}
