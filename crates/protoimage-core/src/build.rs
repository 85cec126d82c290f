//! Building images from source.
//!
//! The pipeline runs in two phases:
//!
//! 1. **Parse**: every target is read and parsed on a bounded worker pool.
//!    Syntax errors from all targets are collected before anything fails.
//! 2. **Link**: the compiler resolves imports (served from the parse cache
//!    where possible), links, and emits descriptors with custom options
//!    intact.
//!
//! The resulting descriptors are reparsed against their own extensions,
//! unused imports are computed, and every file is labeled with the
//! provenance the resolver recorded.

use crate::annotation::{FileAnnotation, FileAnnotationSet};
use crate::bucket::ModuleReadBucket;
use crate::descriptor::{self, FileDescriptorMessage};
use crate::error::{Error, Result};
use crate::image::proto::ProtoImage;
use crate::image::{Image, ImageFile};
use crate::normalpath;
use crate::resolver::{CompilerResolver, FileResolver};
use crate::unused;
use miette::Diagnostic;
use prost::Message;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Configuration for [`build_image`].
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Maximum number of files parsed concurrently
    pub parallelism: usize,
    /// Keep source code info (comments and spans) in the descriptors
    pub include_source_code_info: bool,
    /// Compute unused dependency indexes for every file
    pub compute_unused_imports: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            parallelism: std::thread::available_parallelism().map_or(1, |n| n.get()),
            include_source_code_info: true,
            compute_unused_imports: true,
        }
    }
}

impl BuildConfig {
    /// Create a new build config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of parser threads; zero means one
    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Parse on a single thread
    pub fn no_parallelism(self) -> Self {
        self.parallelism(1)
    }

    /// Keep or drop source code info
    pub fn include_source_code_info(mut self, include: bool) -> Self {
        self.include_source_code_info = include;
        self
    }

    /// Compute unused imports or leave them empty
    pub fn compute_unused_imports(mut self, compute: bool) -> Self {
        self.compute_unused_imports = compute;
        self
    }
}

/// Compiles the targets of `bucket` into an image.
///
/// Targets are non-imports; every file they transitively import is
/// included as an import. Syntax and link errors come back as
/// [`Error::Compile`] with all diagnostics found; a missing target is
/// [`Error::FileNotFound`] and a missing import is [`Error::ImportNotFound`].
pub fn build_image(
    bucket: Arc<dyn ModuleReadBucket>,
    config: &BuildConfig,
    cancel: &CancellationToken,
) -> Result<Image> {
    let mut targets = bucket
        .target_paths()
        .iter()
        .map(|path| normalpath::normalize(path))
        .collect::<Result<Vec<_>>>()?;
    targets.sort();
    targets.dedup();
    if targets.is_empty() {
        return Err(Error::NoFiles);
    }
    debug!("Building image from {} targets", targets.len());

    let resolver = Arc::new(FileResolver::new(bucket));
    parse_targets(&resolver, &targets, config, cancel)?;
    let encoded = link_targets(&resolver, &targets, config, cancel)?;
    let image = assemble(&resolver, &encoded, &targets, config)?;
    debug!("Built image with {} files", image.len());
    Ok(image)
}

fn parse_targets(
    resolver: &FileResolver,
    targets: &[String],
    config: &BuildConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.parallelism.max(1))
        .build()
        .map_err(|err| Error::internal(format!("failed to start parser pool: {}", err)))?;

    let results: Vec<Result<Vec<FileAnnotation>>> = pool.install(|| {
        targets
            .par_iter()
            .map(|path| {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                trace!("Parsing {}", path);
                match resolver.preload(path) {
                    Ok(()) => Ok(Vec::new()),
                    // reported with its importer once linking asks for it
                    Err(err) if err.is_file_not_found() => Ok(Vec::new()),
                    Err(err) => Ok(annotations_for(&err, resolver)),
                }
            })
            .collect()
    });

    let mut annotations = Vec::new();
    for result in results {
        annotations.extend(result?);
    }
    resolver.check()?;
    if !annotations.is_empty() {
        return Err(Error::Compile(FileAnnotationSet::new(annotations)));
    }
    Ok(())
}

fn link_targets(
    resolver: &Arc<FileResolver>,
    targets: &[String],
    config: &BuildConfig,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    let mut compiler = protox::Compiler::with_file_resolver(CompilerResolver(Arc::clone(resolver)));
    compiler
        .include_imports(true)
        .include_source_info(config.include_source_code_info);

    let mut annotations = Vec::new();
    for path in targets {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Err(err) = compiler.open_file(path) {
            resolver.check()?;
            if let Some(missing) = resolver.missing_paths().into_iter().next() {
                return Err(not_found(missing, &err, targets));
            }
            annotations.extend(annotations_for(&err, resolver));
        }
    }
    resolver.check()?;
    if !annotations.is_empty() {
        return Err(Error::Compile(FileAnnotationSet::new(annotations)));
    }
    Ok(compiler.encode_file_descriptor_set())
}

fn not_found(missing: String, err: &protox::Error, targets: &[String]) -> Error {
    if targets.contains(&missing) {
        return Error::FileNotFound { path: missing };
    }
    let imported_by = err.file().filter(|file| *file != missing).map(str::to_string);
    Error::ImportNotFound {
        path: missing,
        imported_by,
    }
}

fn assemble(resolver: &FileResolver, encoded: &[u8], targets: &[String], config: &BuildConfig) -> Result<Image> {
    let set = ProtoImage::decode(encoded)?;
    let mut descriptors = set
        .file
        .iter()
        .map(|bytes| FileDescriptorMessage::decode(bytes))
        .collect::<Result<Vec<_>>>()?;
    descriptor::reparse(&mut descriptors)?;

    let unused = if config.compute_unused_imports {
        unused::unused_dependency_indexes(&descriptors)
    } else {
        vec![BTreeSet::new(); descriptors.len()]
    };

    let targets: HashSet<&str> = targets.iter().map(String::as_str).collect();
    let files = descriptors
        .into_iter()
        .zip(unused)
        .map(|(descriptor, unused)| {
            let path = descriptor.name().to_string();
            ImageFile::builder(descriptor)
                .external_path(resolver.display_path(&path))
                .local_path(resolver.local_path(&path))
                .module_full_name(resolver.module_full_name(&path))
                .commit_id(resolver.commit_id(&path))
                .is_import(!targets.contains(path.as_str()))
                .is_syntax_unspecified(resolver.is_syntax_unspecified(&path))
                .unused_dependency_indexes(unused)
                .build()
        })
        .collect::<Result<Vec<_>>>()?;
    Image::new(files)
}

/// Flattens a compiler error into annotations, one per labeled span.
fn annotations_for(err: &protox::Error, resolver: &FileResolver) -> Vec<FileAnnotation> {
    let fallback = err.file().map(str::to_string);
    let mut annotations = Vec::new();
    collect_annotations(err, fallback.as_deref(), resolver, &mut annotations);
    if annotations.is_empty() {
        let path = fallback.as_deref().map(|p| resolver.display_path(p)).unwrap_or_default();
        annotations.push(FileAnnotation::new(path, 0, 0, err.to_string()));
    }
    annotations
}

fn collect_annotations(
    diagnostic: &dyn Diagnostic,
    fallback: Option<&str>,
    resolver: &FileResolver,
    annotations: &mut Vec<FileAnnotation>,
) {
    if let (Some(labels), Some(source)) = (diagnostic.labels(), diagnostic.source_code()) {
        for label in labels {
            let Ok(contents) = source.read_span(label.inner(), 0, 0) else {
                continue;
            };
            let path = contents
                .name()
                .or(fallback)
                .map(|p| resolver.display_path(p))
                .unwrap_or_default();
            annotations.push(FileAnnotation::new(
                path,
                contents.line() + 1,
                contents.column() + 1,
                diagnostic.to_string(),
            ));
        }
    }
    if let Some(related) = diagnostic.related() {
        for related in related {
            collect_annotations(related, fallback, resolver, annotations);
        }
    }
}
