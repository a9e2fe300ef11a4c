// SPDX-License-Identifier: GPL-2.0-only

//! Bundle metadata, loaded once per run.
//!
//! A bundle is a directory under the bundles root owning zero or more patches
//! and optionally depending on sibling bundles. The [`BundleCache`] holds each
//! bundle's *own* metadata; inheritance is expressed by the dependency trie, not
//! by merging metadata here.

mod error;
mod meta;

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use indexmap::IndexMap;
use serde::Serialize;

pub(crate) use self::{
    error::Error,
    meta::{BundleMeta, BUNDLEMETA_FILE},
};
use crate::patchpath::PatchPath;

/// Name of a bundle directory under the bundles root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub(crate) struct BundleName(String);

impl BundleName {
    /// Bundle name from a command line argument, which may be a path to the bundle.
    pub(crate) fn from_arg(arg: &Path) -> Result<Self, Error> {
        let invalid = || {
            Error::InvalidBundleName(
                arg.display().to_string(),
                "not a bundle directory name".into(),
            )
        };
        arg.file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(invalid)?
            .parse()
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BundleName {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BundleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BundleName {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Err(Error::InvalidBundleName(name.into(), reason.into()));

        if name.is_empty() {
            invalid("bundle name may not be empty")
        } else if name == "." || name == ".." {
            invalid("bundle name may not be '.' or '..'")
        } else if name.contains(['/', '\\']) {
            invalid("bundle name may not contain path separators")
        } else if name.chars().any(|c| c.is_control()) {
            invalid("bundle name may not contain control characters")
        } else {
            Ok(Self(name.into()))
        }
    }
}

impl From<BundleName> for String {
    fn from(name: BundleName) -> Self {
        name.0
    }
}

/// Bundle names from command line paths, and the bundles root those paths imply.
///
/// A path with a parent directory names its bundles root; dependencies are
/// looked up next to it. Every such path must share the same parent, which must
/// also be `bundles_dir` when one was given explicitly.
pub(crate) fn resolve_bundle_args(
    args: &[&Path],
    bundles_dir: Option<&Path>,
) -> Result<(Option<PathBuf>, Vec<BundleName>), Error> {
    let mut root: Option<(&Path, &Path)> = None;
    let mut names = Vec::with_capacity(args.len());

    for &arg in args {
        names.push(BundleName::from_arg(arg)?);
        let Some(parent) = arg.parent().filter(|p| !p.as_os_str().is_empty()) else {
            continue;
        };
        if let Some(dir) = bundles_dir {
            if !same_dir(parent, dir) {
                return Err(Error::OutsideBundlesDir(arg.into(), dir.into()));
            }
        }
        match root {
            Some((first_arg, first_parent)) if !same_dir(parent, first_parent) => {
                return Err(Error::MixedBundleDirs(first_arg.into(), arg.into()));
            }
            Some(_) => {}
            None => root = Some((arg, parent)),
        }
    }

    Ok((root.map(|(_, parent)| parent.to_path_buf()), names))
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Read-only table of every bundle taking part in a run.
#[derive(Debug, Default)]
pub(crate) struct BundleCache {
    bundles: IndexMap<BundleName, BundleMeta>,
}

impl BundleCache {
    /// Names of all bundles under `bundles_dir`, sorted.
    pub(crate) fn discover(bundles_dir: &Path) -> Result<Vec<BundleName>, Error> {
        if !bundles_dir.is_dir() {
            return Err(Error::BundlesDirNotFound(bundles_dir.to_path_buf()));
        }
        let io_err = |source| Error::Io {
            path: bundles_dir.to_path_buf(),
            source,
        };

        let mut names = Vec::new();
        for entry in std::fs::read_dir(bundles_dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.starts_with('.') || !entry.path().join(BUNDLEMETA_FILE).is_file() {
                continue;
            }
            names.push(file_name.parse()?);
        }
        names.sort();
        Ok(names)
    }

    /// Load the requested bundles and everything they transitively depend on.
    ///
    /// When `patches_dir` is given, every listed patch must exist under it. Any
    /// problem fails the whole load.
    pub(crate) fn load(
        bundles_dir: &Path,
        requested: &[BundleName],
        patches_dir: Option<&Path>,
    ) -> Result<Self, Error> {
        if !bundles_dir.is_dir() {
            return Err(Error::BundlesDirNotFound(bundles_dir.to_path_buf()));
        }

        let mut bundles = IndexMap::new();
        let mut pending: Vec<(BundleName, Option<BundleName>)> =
            requested.iter().rev().map(|name| (name.clone(), None)).collect();

        while let Some((name, required_by)) = pending.pop() {
            if bundles.contains_key(&name) {
                continue;
            }
            let meta = match (
                BundleMeta::load(&name, &bundles_dir.join(name.as_str())),
                required_by,
            ) {
                (Err(Error::BundleNotFound(dependency)), Some(bundle)) => {
                    return Err(Error::UnknownDependency { bundle, dependency })
                }
                (result, _) => result?,
            };
            for dependency in meta.depends.iter().rev() {
                pending.push((dependency.clone(), Some(name.clone())));
            }
            tracing::trace!(bundle = %name, patches = meta.patch_order.len(), "loaded bundle");
            bundles.insert(name, meta);
        }
        bundles.sort_keys();

        let cache = Self { bundles };
        if let Some(patches_dir) = patches_dir {
            cache.check_patches_exist(patches_dir)?;
        }
        Ok(cache)
    }

    fn check_patches_exist(&self, patches_dir: &Path) -> Result<(), Error> {
        for (name, meta) in &self.bundles {
            for patch in &meta.patch_order {
                let path: PathBuf = patch.under(patches_dir);
                if !path.is_file() {
                    return Err(Error::MissingPatch {
                        bundle: name.clone(),
                        patch: patch.clone(),
                        path,
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn get(&self, name: &BundleName) -> Option<&BundleMeta> {
        self.bundles.get(name)
    }

    pub(crate) fn contains(&self, name: &BundleName) -> bool {
        self.bundles.contains_key(name)
    }

    /// Patches owned directly by `name`; empty for unknown bundles.
    pub(crate) fn patch_order(&self, name: &BundleName) -> &[PatchPath] {
        self.bundles
            .get(name)
            .map(|meta| meta.patch_order.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &BundleName> {
        self.bundles.keys()
    }

    pub(crate) fn len(&self) -> usize {
        self.bundles.len()
    }
}

#[cfg(test)]
impl BundleCache {
    /// Build a cache from `(name, depends, patch_order)` triples.
    pub(crate) fn from_entries(entries: &[(&str, &[&str], &[&str])]) -> Self {
        let bundles = entries
            .iter()
            .map(|(name, depends, patches)| {
                let meta = BundleMeta {
                    depends: depends.iter().map(|d| d.parse().unwrap()).collect(),
                    patch_order: patches.iter().map(|p| p.parse().unwrap()).collect(),
                    display_name: None,
                };
                (name.parse().unwrap(), meta)
            })
            .collect();
        Self { bundles }
    }
}
