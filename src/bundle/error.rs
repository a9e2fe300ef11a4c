// SPDX-License-Identifier: GPL-2.0-only

use std::path::PathBuf;

use super::BundleName;
use crate::patchpath::PatchPath;

#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error("invalid bundle name `{0}` ({1})")]
    InvalidBundleName(String, String),

    #[error("bundles directory `{}` not found", .0.display())]
    BundlesDirNotFound(PathBuf),

    #[error(
        "bundles `{}` and `{}` are in different directories",
        .0.display(),
        .1.display()
    )]
    MixedBundleDirs(PathBuf, PathBuf),

    #[error(
        "bundle `{}` is outside of the bundles directory `{}`",
        .0.display(),
        .1.display()
    )]
    OutsideBundlesDir(PathBuf, PathBuf),

    #[error("bundle `{0}` not found")]
    BundleNotFound(BundleName),

    #[error("bundle `{bundle}` depends on unknown bundle `{dependency}`")]
    UnknownDependency {
        bundle: BundleName,
        dependency: BundleName,
    },

    #[error("bundle `{0}` depends on itself")]
    SelfDependency(BundleName),

    #[error("could not read `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed metadata for bundle `{bundle}`")]
    MalformedMeta {
        bundle: BundleName,
        #[source]
        source: toml::de::Error,
    },

    #[error("bundle `{bundle}` patch order line {line}")]
    InvalidPatchOrder {
        bundle: BundleName,
        line: usize,
        #[source]
        source: crate::patchpath::Error,
    },

    #[error("bundle `{bundle}` lists patch `{patch}` more than once")]
    DuplicatePatch { bundle: BundleName, patch: PatchPath },

    #[error("bundle `{bundle}` lists patch `{patch}` but `{}` does not exist", path.display())]
    MissingPatch {
        bundle: BundleName,
        patch: PatchPath,
        path: PathBuf,
    },
}
