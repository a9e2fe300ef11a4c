// SPDX-License-Identifier: GPL-2.0-only

use crate::bundle::BundleName;

#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error("bundle `{0}` is not loaded")]
    UnknownBundle(BundleName),

    #[error("dependency cycle `{0}`")]
    DependencyCycle(String),

    #[error("bundle `{bundle}` would be placed beneath both {parent} and {other}")]
    ConflictingPosition {
        bundle: BundleName,
        parent: String,
        other: String,
    },

    #[error("bundle `{0}` is already in the dependency trie")]
    DuplicateNode(BundleName),
}
