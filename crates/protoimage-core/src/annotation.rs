//! Compiler diagnostics as file annotations.

use std::fmt;

/// A single diagnostic attached to a position in a file.
///
/// Line and column are 1-based; zero means the position is unknown.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileAnnotation {
    /// Human-facing path of the file
    pub path: String,
    /// 1-based line, 0 if unknown
    pub line: usize,
    /// 1-based column, 0 if unknown
    pub column: usize,
    /// The diagnostic message
    pub message: String,
}

impl FileAnnotation {
    /// Creates a new annotation
    pub fn new(path: impl Into<String>, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for FileAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (0, _) => write!(f, "{}: {}", self.path, self.message),
            (line, 0) => write!(f, "{}:{}: {}", self.path, line, self.message),
            (line, column) => write!(f, "{}:{}:{}: {}", self.path, line, column, self.message),
        }
    }
}

/// A sorted, deduplicated set of annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAnnotationSet {
    annotations: Vec<FileAnnotation>,
}

impl FileAnnotationSet {
    /// Creates a set, sorting by path then position and dropping duplicates
    pub fn new(mut annotations: Vec<FileAnnotation>) -> Self {
        annotations.sort();
        annotations.dedup();
        Self { annotations }
    }

    /// Returns the annotations in sorted order
    pub fn annotations(&self) -> &[FileAnnotation] {
        &self.annotations
    }

    /// Number of annotations
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    /// Returns true if there are no annotations
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}

impl fmt::Display for FileAnnotationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, annotation) in self.annotations.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", annotation)?;
        }
        Ok(())
    }
}
