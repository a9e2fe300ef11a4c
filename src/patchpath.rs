// SPDX-License-Identifier: GPL-2.0-only

//! Validated relative paths of patch files under the shared patch root.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum Error {
    #[error("invalid patch path `{0}` ({1})")]
    InvalidPatchPath(String, String),
}

/// Path of a patch file, relative to the patch root.
///
/// This is the exact name handed to quilt on the command line and written to
/// series files, so it must be a plain relative path with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub(crate) struct PatchPath(String);

impl PatchPath {
    /// Location of the patch file on disk.
    pub(crate) fn under(&self, patches_dir: &Path) -> PathBuf {
        self.0
            .split('/')
            .fold(patches_dir.to_path_buf(), |path, component| {
                path.join(component)
            })
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PatchPath {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PatchPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PatchPath {
    type Err = Error;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Err(Error::InvalidPatchPath(path.into(), reason.into()));

        if path.is_empty() {
            return invalid("patch path may not be empty");
        } else if path.starts_with('/') {
            return invalid("patch path must be relative");
        } else if path.ends_with('/') {
            return invalid("patch path may not end with '/'");
        } else if path.contains('\\') {
            return invalid("patch path must use '/' separators");
        }

        for c in path.chars() {
            if c.is_whitespace() {
                return invalid("patch path may not contain whitespace");
            } else if c.is_control() {
                return invalid("patch path may not contain control characters");
            }
        }

        for component in path.split('/') {
            match component {
                "" => return invalid("patch path may not contain empty components"),
                "." | ".." => return invalid("patch path may not contain '.' or '..'"),
                _ => {}
            }
        }

        Ok(Self(path.into()))
    }
}

impl TryFrom<String> for PatchPath {
    type Error = Error;

    fn try_from(path: String) -> Result<Self, Self::Error> {
        path.parse()
    }
}

impl From<PatchPath> for String {
    fn from(path: PatchPath) -> Self {
        path.0
    }
}
