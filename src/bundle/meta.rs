// SPDX-License-Identifier: GPL-2.0-only

//! On-disk metadata of a single bundle directory.

use std::{collections::HashSet, path::Path};

use serde::Deserialize;

use super::{BundleName, Error};
use crate::patchpath::PatchPath;

/// File holding a bundle's `depends` and display name.
pub(crate) const BUNDLEMETA_FILE: &str = "bundlemeta.toml";

/// Newline-delimited list of the bundle's own patches, in apply order.
pub(crate) const PATCH_ORDER_FILE: &str = "patch_order.list";

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBundleMeta {
    #[serde(default)]
    depends: Vec<String>,
    display_name: Option<String>,
}

/// A bundle's own metadata. Never merged with the metadata of its dependencies.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct BundleMeta {
    /// Parent bundles in increasing order of precedence.
    pub depends: Vec<BundleName>,

    /// Patches owned directly by this bundle, in apply order.
    pub patch_order: Vec<PatchPath>,

    pub display_name: Option<String>,
}

impl BundleMeta {
    /// Read `bundlemeta.toml` and, if present, `patch_order.list` from `bundle_dir`.
    pub(crate) fn load(name: &BundleName, bundle_dir: &Path) -> Result<Self, Error> {
        let meta_path = bundle_dir.join(BUNDLEMETA_FILE);
        let meta_text = match std::fs::read_to_string(&meta_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::BundleNotFound(name.clone()))
            }
            Err(source) => {
                return Err(Error::Io {
                    path: meta_path,
                    source,
                })
            }
        };
        let mut meta = Self::parse(name, &meta_text)?;

        let order_path = bundle_dir.join(PATCH_ORDER_FILE);
        match std::fs::read_to_string(&order_path) {
            Ok(text) => meta.patch_order = parse_patch_order(name, &text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(Error::Io {
                    path: order_path,
                    source,
                })
            }
        }

        Ok(meta)
    }

    fn parse(name: &BundleName, text: &str) -> Result<Self, Error> {
        let raw: RawBundleMeta = toml::from_str(text).map_err(|source| Error::MalformedMeta {
            bundle: name.clone(),
            source,
        })?;

        let mut depends = Vec::with_capacity(raw.depends.len());
        for dependency in raw.depends {
            let dependency = dependency.parse::<BundleName>()?;
            if &dependency == name {
                return Err(Error::SelfDependency(name.clone()));
            }
            depends.push(dependency);
        }

        Ok(Self {
            depends,
            patch_order: Vec::new(),
            display_name: raw.display_name,
        })
    }
}

fn parse_patch_order(name: &BundleName, text: &str) -> Result<Vec<PatchPath>, Error> {
    let mut seen = HashSet::new();
    let mut patch_order = Vec::new();

    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let patch = line
            .parse::<PatchPath>()
            .map_err(|source| Error::InvalidPatchOrder {
                bundle: name.clone(),
                line: i + 1,
                source,
            })?;
        if !seen.insert(patch.clone()) {
            return Err(Error::DuplicatePatch {
                bundle: name.clone(),
                patch,
            });
        }
        patch_order.push(patch);
    }

    Ok(patch_order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> BundleName {
        s.parse().unwrap()
    }

    #[test]
    fn parse_depends_and_display_name() {
        let meta = BundleMeta::parse(
            &name("debian_bullseye"),
            "display_name = \"Debian 11\"\ndepends = [\"common\", \"linux_rooted\"]\n",
        )
        .unwrap();
        assert_eq!(meta.depends, vec![name("common"), name("linux_rooted")]);
        assert_eq!(meta.display_name.as_deref(), Some("Debian 11"));
        assert!(meta.patch_order.is_empty());
    }

    #[test]
    fn depends_defaults_to_empty() {
        let meta = BundleMeta::parse(&name("common"), "").unwrap();
        assert!(meta.depends.is_empty());
    }

    #[test]
    fn reject_unknown_keys() {
        assert!(matches!(
            BundleMeta::parse(&name("common"), "depend = [\"x\"]\n"),
            Err(Error::MalformedMeta { .. })
        ));
    }

    #[test]
    fn reject_self_dependency() {
        assert!(matches!(
            BundleMeta::parse(&name("common"), "depends = [\"common\"]\n"),
            Err(Error::SelfDependency(_))
        ));
    }

    #[test]
    fn patch_order_skips_blanks_and_comments() {
        let order = parse_patch_order(
            &name("common"),
            "# core patches\ncore/a.patch\n\n  core/b.patch  \n",
        )
        .unwrap();
        let order: Vec<&str> = order.iter().map(PatchPath::as_str).collect();
        assert_eq!(order, ["core/a.patch", "core/b.patch"]);
    }

    #[test]
    fn patch_order_errors_carry_line_numbers() {
        match parse_patch_order(&name("common"), "ok.patch\n../bad.patch\n") {
            Err(Error::InvalidPatchOrder { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            parse_patch_order(&name("common"), "a.patch\na.patch\n"),
            Err(Error::DuplicatePatch { .. })
        ));
    }
}
