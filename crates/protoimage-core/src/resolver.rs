//! Thread-safe source resolution with provenance tracking.
//!
//! [`FileResolver`] serves file contents to the compiler from a
//! [`ModuleReadBucket`], falling back to the bundled well-known types. Every
//! file it serves has its provenance recorded (external path, local path,
//! module, commit), so the finished image can be labeled.
//!
//! Recording is first-writer-wins. A later, different value for the same
//! path is an internal consistency failure; it is stored and surfaced by
//! [`FileResolver::check`] once the compiler returns control.

use crate::bucket::{ModuleFile, ModuleReadBucket};
use crate::error::{Error, Result};
use crate::module::ModuleFullName;
use crate::normalpath;
use parking_lot::{Mutex, RwLock};
use protox::file::{File, FileResolver as _, GoogleFileResolver};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Provenance {
    external_paths: HashMap<String, String>,
    local_paths: HashMap<String, PathBuf>,
    module_full_names: HashMap<String, ModuleFullName>,
    commit_ids: HashMap<String, Uuid>,
    syntax_unspecified: HashSet<String>,
}

impl Provenance {
    fn record(&mut self, file: &ModuleFile) -> Result<()> {
        let path = file.path();
        record_value(&mut self.external_paths, path, file.external_path().to_string(), "external path")?;
        if let Some(local_path) = file.local_path() {
            record_value(&mut self.local_paths, path, local_path.to_path_buf(), "local path")?;
        }
        if let Some(module) = file.module_full_name() {
            record_value(&mut self.module_full_names, path, module.clone(), "module")?;
        }
        if let Some(commit_id) = file.commit_id() {
            record_value(&mut self.commit_ids, path, commit_id, "commit")?;
        }
        Ok(())
    }
}

fn record_value<V>(map: &mut HashMap<String, V>, path: &str, value: V, what: &str) -> Result<()>
where
    V: PartialEq + std::fmt::Debug,
{
    match map.get(path) {
        Some(existing) if *existing != value => Err(Error::internal(format!(
            "conflicting {} for {}: {:?} and {:?}",
            what, path, existing, value
        ))),
        Some(_) => Ok(()),
        None => {
            map.insert(path.to_string(), value);
            Ok(())
        }
    }
}

/// Serves sources to the compiler and remembers where each came from.
pub struct FileResolver {
    bucket: Arc<dyn ModuleReadBucket>,
    well_known: GoogleFileResolver,
    provenance: RwLock<Provenance>,
    parsed: Mutex<HashMap<String, File>>,
    missing: Mutex<Vec<String>>,
    failure: Mutex<Option<Error>>,
}

impl FileResolver {
    /// Creates a resolver over `bucket`
    pub fn new(bucket: Arc<dyn ModuleReadBucket>) -> Self {
        Self {
            bucket,
            well_known: GoogleFileResolver::new(),
            provenance: RwLock::new(Provenance::default()),
            parsed: Mutex::new(HashMap::new()),
            missing: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    /// Parses `path` ahead of compilation and caches the result.
    ///
    /// Safe to call from many threads at once.
    pub(crate) fn preload(&self, path: &str) -> std::result::Result<(), protox::Error> {
        if self.parsed.lock().contains_key(path) {
            return Ok(());
        }
        let file = self.load(path)?;
        self.parsed.lock().insert(path.to_string(), file);
        Ok(())
    }

    fn open(&self, name: &str) -> std::result::Result<File, protox::Error> {
        if let Some(file) = self.parsed.lock().remove(name) {
            return Ok(file);
        }
        self.load(name)
    }

    fn load(&self, name: &str) -> std::result::Result<File, protox::Error> {
        let Ok(path) = normalpath::normalize(name) else {
            return Err(self.not_found(name));
        };

        match self.bucket.get_file(&path) {
            Ok(Some(file)) => {
                if let Err(err) = self.provenance.write().record(&file) {
                    self.fail(err);
                    return Err(protox::Error::file_not_found(&path));
                }
                let source = String::from_utf8_lossy(file.content());
                if !declares_syntax(&source) {
                    self.provenance.write().syntax_unspecified.insert(path.clone());
                }
                trace!("Resolved {} from bucket", path);
                File::from_source(&path, &source)
            }
            Ok(None) => match self.well_known.open_file(&path) {
                Ok(file) => {
                    trace!("Resolved {} as a well-known type", path);
                    let mut provenance = self.provenance.write();
                    provenance
                        .external_paths
                        .entry(path.clone())
                        .or_insert_with(|| path.clone());
                    Ok(file)
                }
                Err(err) if err.is_file_not_found() => Err(self.not_found(&path)),
                Err(err) => Err(err),
            },
            Err(err) => {
                self.fail(err);
                Err(protox::Error::file_not_found(&path))
            }
        }
    }

    fn not_found(&self, path: &str) -> protox::Error {
        let mut missing = self.missing.lock();
        if !missing.iter().any(|p| p == path) {
            missing.push(path.to_string());
        }
        protox::Error::file_not_found(path)
    }

    fn fail(&self, err: Error) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(err);
        }
    }

    /// Returns the first internal failure recorded while serving files
    pub(crate) fn check(&self) -> Result<()> {
        match self.failure.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Paths that were requested but could not be found, in request order
    pub(crate) fn missing_paths(&self) -> Vec<String> {
        self.missing.lock().clone()
    }

    /// Human-facing path of `path`, if it was served
    pub fn external_path(&self, path: &str) -> Option<String> {
        self.provenance.read().external_paths.get(path).cloned()
    }

    /// On-disk path of `path`, if it has one
    pub fn local_path(&self, path: &str) -> Option<PathBuf> {
        self.provenance.read().local_paths.get(path).cloned()
    }

    /// Module of `path`, if it came from one
    pub fn module_full_name(&self, path: &str) -> Option<ModuleFullName> {
        self.provenance.read().module_full_names.get(path).cloned()
    }

    /// Commit of the module of `path`
    pub fn commit_id(&self, path: &str) -> Option<Uuid> {
        self.provenance.read().commit_ids.get(path).copied()
    }

    /// Returns true if the source of `path` has no syntax declaration
    pub fn is_syntax_unspecified(&self, path: &str) -> bool {
        self.provenance.read().syntax_unspecified.contains(path)
    }

    /// The path to show a user for `path`
    pub(crate) fn display_path(&self, path: &str) -> String {
        self.external_path(path).unwrap_or_else(|| path.to_string())
    }
}

/// Adapter handing a shared [`FileResolver`] to the compiler.
pub(crate) struct CompilerResolver(pub(crate) Arc<FileResolver>);

impl protox::file::FileResolver for CompilerResolver {
    fn resolve_path(&self, path: &Path) -> Option<String> {
        path.to_str().and_then(|p| normalpath::normalize(p).ok())
    }

    fn open_file(&self, name: &str) -> std::result::Result<File, protox::Error> {
        self.0.open(name)
    }
}

/// Returns true if the first token of `source` is `syntax` or `edition`.
fn declares_syntax(source: &str) -> bool {
    let mut rest = source.trim_start_matches('\u{feff}');
    loop {
        rest = rest.trim_start();
        if let Some(comment) = rest.strip_prefix("//") {
            rest = comment.split_once('\n').map_or("", |(_, after)| after);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.split_once("*/").map_or("", |(_, after)| after);
        } else {
            break;
        }
    }
    let token_end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    matches!(&rest[..token_end], "syntax" | "edition")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::MemoryModuleBucket;
    use protox::file::FileResolver as _;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn resolver(bucket: MemoryModuleBucket) -> Arc<FileResolver> {
        Arc::new(FileResolver::new(Arc::new(bucket)))
    }

    #[test]
    fn test_declares_syntax() {
        assert!(declares_syntax("syntax = \"proto3\";"));
        assert!(declares_syntax("// header\n/* block */\n  syntax=\"proto2\";"));
        assert!(declares_syntax("edition = \"2023\";"));
        assert!(!declares_syntax("package acme;"));
        assert!(!declares_syntax("// syntax = \"proto3\";\nmessage A {}"));
        assert!(!declares_syntax("syntaxfoo = 1;"));
        assert!(!declares_syntax(""));
    }

    #[test]
    fn test_records_provenance() {
        let module: ModuleFullName = "buf.build/acme/weather".parse().unwrap();
        let commit = Uuid::from_u128(42);
        let mut bucket = MemoryModuleBucket::new();
        bucket.insert(
            ModuleFile::new("acme/a.proto", "syntax = \"proto3\"; package acme;")
                .unwrap()
                .with_external_path("/src/acme/a.proto")
                .with_local_path("/src/acme/a.proto")
                .with_module(module.clone(), Some(commit)),
        );
        bucket.add_file("b.proto", "package b;").unwrap();
        let resolver = resolver(bucket);
        let adapter = CompilerResolver(resolver.clone());

        adapter.open_file("acme/a.proto").unwrap();
        adapter.open_file("b.proto").unwrap();

        assert_eq!(resolver.external_path("acme/a.proto").as_deref(), Some("/src/acme/a.proto"));
        assert_eq!(resolver.local_path("acme/a.proto"), Some(PathBuf::from("/src/acme/a.proto")));
        assert_eq!(resolver.module_full_name("acme/a.proto"), Some(module));
        assert_eq!(resolver.commit_id("acme/a.proto"), Some(commit));
        assert!(!resolver.is_syntax_unspecified("acme/a.proto"));
        assert!(resolver.is_syntax_unspecified("b.proto"));
        assert!(resolver.check().is_ok());
    }

    /// Serves `a.proto` under a different external path on every lookup.
    struct ShiftingBucket {
        lookups: AtomicUsize,
        local_paths: bool,
    }

    impl ModuleReadBucket for ShiftingBucket {
        fn get_file(&self, path: &str) -> Result<Option<ModuleFile>> {
            if path != "a.proto" {
                return Ok(None);
            }
            let n = self.lookups.fetch_add(1, Ordering::SeqCst);
            let file = ModuleFile::new(path, "syntax = \"proto3\";")?;
            Ok(Some(if self.local_paths {
                file.with_local_path(format!("/checkout-{}/a.proto", n))
            } else {
                file.with_external_path(format!("/checkout-{}/a.proto", n))
            }))
        }

        fn file_paths(&self) -> Vec<String> {
            vec!["a.proto".to_string()]
        }

        fn target_paths(&self) -> Vec<String> {
            self.file_paths()
        }
    }

    #[test]
    fn test_conflicting_provenance_is_internal() {
        for local_paths in [false, true] {
            let resolver = Arc::new(FileResolver::new(Arc::new(ShiftingBucket {
                lookups: AtomicUsize::new(0),
                local_paths,
            })));
            let adapter = CompilerResolver(resolver.clone());

            adapter.open_file("a.proto").unwrap();
            assert!(resolver.check().is_ok());
            assert!(adapter.open_file("a.proto").is_err());

            let err = resolver.check().unwrap_err();
            assert!(err.is_internal(), "{}", err);
            // the first record wins
            assert_eq!(
                resolver.display_path("a.proto"),
                if local_paths { "a.proto" } else { "/checkout-0/a.proto" }
            );
        }
    }

    #[test]
    fn test_well_known_fallback() {
        let resolver = resolver(MemoryModuleBucket::new());
        let adapter = CompilerResolver(resolver.clone());
        adapter.open_file("google/protobuf/timestamp.proto").unwrap();
        assert_eq!(
            resolver.external_path("google/protobuf/timestamp.proto").as_deref(),
            Some("google/protobuf/timestamp.proto")
        );
        assert!(!resolver.is_syntax_unspecified("google/protobuf/timestamp.proto"));
    }

    #[test]
    fn test_missing_is_recorded() {
        let resolver = resolver(MemoryModuleBucket::new());
        let adapter = CompilerResolver(resolver.clone());
        let err = adapter.open_file("nope.proto").unwrap_err();
        assert!(err.is_file_not_found());
        assert_eq!(resolver.missing_paths(), vec!["nope.proto".to_string()]);
    }

    #[test]
    fn test_preload_then_open() {
        let mut bucket = MemoryModuleBucket::new();
        bucket.add_file("a.proto", "syntax = \"proto3\";").unwrap();
        let resolver = resolver(bucket);
        resolver.preload("a.proto").unwrap();
        assert!(resolver.parsed.lock().contains_key("a.proto"));

        CompilerResolver(resolver.clone()).open_file("a.proto").unwrap();
        assert!(resolver.parsed.lock().is_empty());
    }

    #[test]
    fn test_preload_reports_parse_errors() {
        let mut bucket = MemoryModuleBucket::new();
        bucket.add_file("a.proto", "syntax = \"proto3\"; message {").unwrap();
        let resolver = resolver(bucket);
        assert!(resolver.preload("a.proto").is_err());
    }
}
