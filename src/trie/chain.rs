// SPDX-License-Identifier: GPL-2.0-only

//! Flattening of a bundle's `depends` graph into a single chain.

use std::{collections::HashSet, iter::Rev, slice::Iter};

use super::Error;
use crate::bundle::{BundleCache, BundleName};

/// Ancestors of `name`, deepest first. `name` itself is not included.
///
/// `depends` is walked in reverse (highest precedence first), each parent being
/// followed by its own ancestors, and the resulting sequence is reversed. A
/// bundle reachable along several paths keeps its deepest position.
pub(super) fn dependency_chain(
    cache: &BundleCache,
    name: &BundleName,
) -> Result<Vec<BundleName>, Error> {
    let mut preorder: Vec<&BundleName> = Vec::new();
    let mut path: Vec<&BundleName> = vec![name];
    let mut frames: Vec<Rev<Iter<'_, BundleName>>> = vec![depends_of(cache, name)?.iter().rev()];

    while let Some(frame) = frames.last_mut() {
        if let Some(dependency) = frame.next() {
            if let Some(pos) = path.iter().position(|&seen| seen == dependency) {
                let cycle: Vec<&str> = path[pos..]
                    .iter()
                    .chain(std::iter::once(&dependency))
                    .map(|name| name.as_str())
                    .collect();
                return Err(Error::DependencyCycle(cycle.join(" -> ")));
            }
            preorder.push(dependency);
            path.push(dependency);
            frames.push(depends_of(cache, dependency)?.iter().rev());
        } else {
            frames.pop();
            path.pop();
        }
    }

    let mut seen = HashSet::new();
    Ok(preorder
        .into_iter()
        .rev()
        .filter(|&dependency| seen.insert(dependency))
        .cloned()
        .collect())
}

fn depends_of<'c>(cache: &'c BundleCache, name: &BundleName) -> Result<&'c [BundleName], Error> {
    cache
        .get(name)
        .map(|meta| meta.depends.as_slice())
        .ok_or_else(|| Error::UnknownBundle(name.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(cache: &BundleCache, name: &str) -> Vec<String> {
        dependency_chain(cache, &name.parse().unwrap())
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn no_dependencies() {
        let cache = BundleCache::from_entries(&[("common", &[], &[])]);
        assert!(chain(&cache, "common").is_empty());
    }

    #[test]
    fn linear_chain_is_deepest_first() {
        let cache = BundleCache::from_entries(&[
            ("common", &[], &[]),
            ("linux", &["common"], &[]),
            ("debian", &["linux"], &[]),
            ("debian_buster", &["debian"], &[]),
        ]);
        assert_eq!(chain(&cache, "debian_buster"), ["common", "linux", "debian"]);
    }

    #[test]
    fn later_depends_take_precedence() {
        let cache = BundleCache::from_entries(&[
            ("common", &[], &[]),
            ("mixin", &[], &[]),
            ("linux", &["common"], &[]),
            ("debian", &["linux", "mixin"], &[]),
        ]);
        assert_eq!(chain(&cache, "debian"), ["common", "linux", "mixin"]);
    }

    #[test]
    fn diamond_keeps_deepest_occurrence() {
        let cache = BundleCache::from_entries(&[
            ("common", &[], &[]),
            ("left", &["common"], &[]),
            ("right", &["common"], &[]),
            ("both", &["left", "right"], &[]),
        ]);
        assert_eq!(chain(&cache, "both"), ["common", "left", "right"]);
    }

    #[test]
    fn cycles_are_reported() {
        let cache = BundleCache::from_entries(&[
            ("a", &["b"], &[]),
            ("b", &["c"], &[]),
            ("c", &["a"], &[]),
        ]);
        match dependency_chain(&cache, &"a".parse().unwrap()) {
            Err(Error::DependencyCycle(cycle)) => assert_eq!(cycle, "a -> b -> c -> a"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_dependency() {
        let cache = BundleCache::from_entries(&[("a", &["missing"], &[])]);
        assert!(matches!(
            dependency_chain(&cache, &"a".parse().unwrap()),
            Err(Error::UnknownBundle(_))
        ));
    }
}
