//! The well-known types shipped with every protobuf distribution.

/// Paths of the well-known type files.
pub const WELL_KNOWN_TYPE_PATHS: &[&str] = &[
    "google/protobuf/any.proto",
    "google/protobuf/api.proto",
    "google/protobuf/compiler/plugin.proto",
    "google/protobuf/cpp_features.proto",
    "google/protobuf/descriptor.proto",
    "google/protobuf/duration.proto",
    "google/protobuf/empty.proto",
    "google/protobuf/field_mask.proto",
    "google/protobuf/java_features.proto",
    "google/protobuf/source_context.proto",
    "google/protobuf/struct.proto",
    "google/protobuf/timestamp.proto",
    "google/protobuf/type.proto",
    "google/protobuf/wrappers.proto",
];

/// Returns true if `path` is one of the well-known type files.
pub fn is_well_known_type(path: &str) -> bool {
    WELL_KNOWN_TYPE_PATHS.contains(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_well_known_type() {
        assert!(is_well_known_type("google/protobuf/timestamp.proto"));
        assert!(is_well_known_type("google/protobuf/descriptor.proto"));
        assert!(!is_well_known_type("google/type/date.proto"));
        assert!(!is_well_known_type("acme/timestamp.proto"));
    }
}
