//! Narrowing an image to a subset of target paths.

use super::{Image, ImageFile};
use crate::error::{Error, Result};
use crate::normalpath;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

impl Image {
    /// Narrows the image to the files under `include`, minus `exclude`.
    ///
    /// Paths may name files or directories. The matched files become the
    /// targets (non-imports) and everything they transitively import is kept
    /// as imports; all other files are dropped. With no includes, every
    /// non-import file is a candidate target. Every path given must match at
    /// least one file.
    pub fn with_only_paths<I, E>(&self, include: I, exclude: E) -> Result<Image>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        self.only_paths(normalize_all(include)?, normalize_all(exclude)?, false)
    }

    /// Like [`Self::with_only_paths`], but paths that match nothing are
    /// skipped.
    pub fn with_only_paths_allow_not_exist<I, E>(&self, include: I, exclude: E) -> Result<Image>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        self.only_paths(normalize_all(include)?, normalize_all(exclude)?, true)
    }

    /// One image per directory holding at least one non-import file.
    ///
    /// Images are ordered by directory; each targets exactly the non-import
    /// files of its directory.
    pub fn by_dir(&self) -> Result<Vec<Image>> {
        let mut by_dir: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for file in self.files().filter(|file| !file.is_import()) {
            by_dir
                .entry(normalpath::dir(file.path()))
                .or_default()
                .push(file.path());
        }
        debug!("Splitting image into {} directories", by_dir.len());
        by_dir
            .values()
            .map(|paths| self.with_only_paths(paths, std::iter::empty::<&str>()))
            .collect()
    }

    fn only_paths(&self, include: Vec<String>, exclude: Vec<String>, allow_not_exist: bool) -> Result<Image> {
        if include.is_empty() && exclude.is_empty() {
            return Ok(self.clone());
        }
        for include_path in &include {
            for exclude_path in &exclude {
                if normalpath::equals_or_contains(exclude_path, include_path) {
                    return Err(Error::ExcludeContainsInclude {
                        include: include_path.clone(),
                        exclude: exclude_path.clone(),
                    });
                }
            }
        }

        let mut targets: HashSet<&str> = HashSet::new();
        if include.is_empty() {
            targets.extend(self.files().filter(|file| !file.is_import()).map(ImageFile::path));
        } else {
            for include_path in &include {
                let before = targets.len();
                let mut matched = false;
                for file in self.files() {
                    if normalpath::equals_or_contains(include_path, file.path()) {
                        targets.insert(file.path());
                        matched = true;
                    }
                }
                if !matched && !allow_not_exist {
                    return Err(Error::PathNotFound {
                        path: include_path.clone(),
                    });
                }
                debug!("Include {} matched {} new files", include_path, targets.len() - before);
            }
        }

        for exclude_path in &exclude {
            let mut matched = false;
            for file in self.files() {
                if normalpath::equals_or_contains(exclude_path, file.path()) {
                    targets.remove(file.path());
                    matched = true;
                }
            }
            if !matched && !allow_not_exist {
                return Err(Error::PathNotFound {
                    path: exclude_path.clone(),
                });
            }
        }

        if targets.is_empty() {
            return Err(Error::NoFiles);
        }

        let mut needed: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = targets.iter().copied().collect();
        while let Some(path) = stack.pop() {
            if !needed.insert(path) {
                continue;
            }
            if let Some(file) = self.get_file(path) {
                for dependency in file.descriptor().dependencies() {
                    if let Some(dependency) = self.get_file(dependency) {
                        stack.push(dependency.path());
                    }
                }
            }
        }

        let files = self
            .shared_files()
            .filter(|file| needed.contains(file.path()))
            .map(|file| {
                let is_import = !targets.contains(file.path());
                if file.is_import() == is_import {
                    Arc::clone(file)
                } else {
                    Arc::new(file.with_is_import(is_import))
                }
            })
            .collect();
        Image::from_shared(files)
    }
}

fn normalize_all<I>(paths: I) -> Result<Vec<String>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    paths
        .into_iter()
        .map(|path| normalpath::normalize(path.as_ref()))
        .collect()
}
