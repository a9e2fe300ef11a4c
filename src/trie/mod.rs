// SPDX-License-Identifier: GPL-2.0-only

//! Deduplicated tree of bundle dependencies.
//!
//! Each bundle is placed exactly once, beneath the last bundle of its
//! dependency chain. Walking the trie depth-first therefore applies the patches
//! of shared ancestors once and inherits them for every descendant.
//!
//! The trie is stored as a flat table keyed by [`BundleName`]; each node knows
//! its parent and holds the set of its children.

mod chain;
mod error;

use std::collections::{btree_set, BTreeSet, HashSet};

use indexmap::IndexMap;

pub(crate) use self::error::Error;
use self::chain::dependency_chain;
use crate::bundle::{BundleCache, BundleName};

/// Iterator over one level of the trie, in name order.
pub(crate) type Children<'t> = btree_set::Iter<'t, BundleName>;

static NO_CHILDREN: BTreeSet<BundleName> = BTreeSet::new();

#[derive(Debug, Default)]
struct TrieNode {
    parent: Option<BundleName>,
    children: BTreeSet<BundleName>,
}

#[derive(Debug, Default)]
pub(crate) struct DependencyTrie {
    roots: BTreeSet<BundleName>,
    nodes: IndexMap<BundleName, TrieNode>,
}

impl DependencyTrie {
    /// Build the trie for `subset`, or for every cached bundle when `None`.
    ///
    /// Bundles outside of `subset` are still placed when they are dependencies
    /// of a requested bundle.
    pub(crate) fn build(cache: &BundleCache, subset: Option<&[BundleName]>) -> Result<Self, Error> {
        let mut unexplored: BTreeSet<BundleName> = match subset {
            Some(subset) => subset.iter().cloned().collect(),
            None => cache.names().cloned().collect(),
        };
        let mut trie = Self::default();
        let mut nested = HashSet::new();

        while let Some(name) = unexplored.pop_first() {
            if !cache.contains(&name) {
                return Err(Error::UnknownBundle(name));
            }
            let chain = dependency_chain(cache, &name)?;

            let mut parent: Option<&BundleName> = None;
            for (i, link) in chain.iter().enumerate() {
                unexplored.remove(link);
                trie.attach(parent, link)?;
                if i > 0 {
                    nested.insert(link.clone());
                }
                parent = Some(link);
            }

            if trie.contains(&name) {
                return Err(Error::DuplicateNode(name));
            }
            trie.attach(parent, &name)?;
        }

        // Bundles first met on their own sit at the top level until a chain
        // reveals where they belong.
        trie.roots.retain(|root| !nested.contains(root));

        Ok(trie)
    }

    /// Place `name` beneath `parent`, or at the top level when `parent` is `None`.
    ///
    /// An existing node is reused only where it already sits. A top-level
    /// bundle may still be moved beneath `parent` while it has no children,
    /// since nothing placed so far relies on it staying at the top.
    fn attach(&mut self, parent: Option<&BundleName>, name: &BundleName) -> Result<(), Error> {
        let Some((existing, has_children)) = self
            .nodes
            .get(name)
            .map(|node| (node.parent.clone(), !node.children.is_empty()))
        else {
            self.nodes.insert(
                name.clone(),
                TrieNode {
                    parent: parent.cloned(),
                    children: BTreeSet::new(),
                },
            );
            match parent {
                Some(parent) => self.adopt(parent, name),
                None => {
                    self.roots.insert(name.clone());
                }
            }
            return Ok(());
        };

        match (parent, existing) {
            (None, None) => Ok(()),
            (Some(parent), Some(existing)) if &existing == parent => Ok(()),
            (Some(parent), None) if !has_children => {
                if let Some(node) = self.nodes.get_mut(name) {
                    node.parent = Some(parent.clone());
                }
                self.adopt(parent, name);
                Ok(())
            }
            (parent, existing) => Err(Error::ConflictingPosition {
                bundle: name.clone(),
                parent: placement(parent),
                other: placement(existing.as_ref()),
            }),
        }
    }

    fn adopt(&mut self, parent: &BundleName, child: &BundleName) {
        self.nodes
            .get_mut(parent)
            .expect("parent is attached before its children")
            .children
            .insert(child.clone());
    }

    pub(crate) fn roots(&self) -> Children<'_> {
        self.roots.iter()
    }

    pub(crate) fn children(&self, name: &BundleName) -> Children<'_> {
        self.nodes
            .get(name)
            .map_or(&NO_CHILDREN, |node| &node.children)
            .iter()
    }

    pub(crate) fn parent(&self, name: &BundleName) -> Option<&BundleName> {
        self.nodes.get(name).and_then(|node| node.parent.as_ref())
    }

    pub(crate) fn contains(&self, name: &BundleName) -> bool {
        self.nodes.contains_key(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Bundles beneath `name`, in depth-first order.
    pub(crate) fn descendants(&self, name: &BundleName) -> Vec<&BundleName> {
        let mut found = Vec::new();
        let mut cursors = vec![self.children(name)];
        while let Some(cursor) = cursors.last_mut() {
            if let Some(child) = cursor.next() {
                found.push(child);
                cursors.push(self.children(child));
            } else {
                cursors.pop();
            }
        }
        found
    }

    /// Every bundle with its depth, in depth-first order.
    pub(crate) fn preorder(&self) -> Vec<(usize, &BundleName)> {
        let mut order = Vec::with_capacity(self.len());
        let mut cursors = vec![self.roots()];
        while let Some(cursor) = cursors.last_mut() {
            if let Some(name) = cursor.next() {
                order.push((cursors.len() - 1, name));
                cursors.push(self.children(name));
            } else {
                cursors.pop();
            }
        }
        order
    }
}

fn placement(parent: Option<&BundleName>) -> String {
    match parent {
        Some(parent) => format!("`{parent}`"),
        None => "the top level".to_string(),
    }
}
