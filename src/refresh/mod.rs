// SPDX-License-Identifier: GPL-2.0-only

//! Depth-first refresh of every bundle's patches.
//!
//! The walk keeps two parallel stacks: one cursor per trie level and one entry
//! per level holding the patches of the bundle currently entered at that level.
//! The concatenation of those entries is the series that must be applied for
//! the current bundle to be complete. Quilt is only told to pop when a bundle
//! with patches is about to be pushed on top of something else, and once more
//! at the very end.

mod report;

use anyhow::Result;

pub(crate) use self::report::{BranchFailure, RefreshReport};
use crate::{
    bundle::{BundleCache, BundleName},
    patchpath::PatchPath,
    quilt::{PatchStack, PopTarget},
    trie::{Children, DependencyTrie},
};

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct RefreshOptions {
    /// Stop at the first rejected patch instead of skipping its branch.
    pub abort_on_failure: bool,
}

/// Refresh every patch of every bundle in `trie`.
///
/// The patch stack must start with nothing applied. Rejected patches are
/// reported rather than returned as errors; an error means quilt itself could
/// not be driven and the run cannot continue.
pub(crate) fn refresh_patches<S: PatchStack + ?Sized>(
    cache: &BundleCache,
    trie: &DependencyTrie,
    stack: &mut S,
    options: RefreshOptions,
) -> Result<RefreshReport> {
    let mut report = RefreshReport::default();
    let mut cursors: Vec<Children<'_>> = vec![trie.roots()];
    let mut orders: Vec<Option<&[PatchPath]>> = vec![None];

    while let Some(cursor) = cursors.last_mut() {
        let Some(bundle) = cursor.next() else {
            cursors.pop();
            orders.pop();
            continue;
        };

        let depth = orders.len() - 1;
        let patches = cache.patch_order(bundle);
        orders[depth] = Some(patches);
        report.bundles_visited += 1;
        tracing::info!(%bundle, depth, patches = patches.len(), "refreshing bundle");

        let rejected = if patches.is_empty() {
            None
        } else {
            stack.pop_to(&boundary(&orders[..depth]))?;
            stack.write_series(&series(&orders))?;
            apply_bundle(stack, patches, &mut report)?
        };

        if let Some((patch, output)) = rejected {
            tracing::error!(%bundle, %patch, "patch failed to apply\n{}", output.trim_end());
            let skipped: Vec<BundleName> = trie.descendants(bundle).into_iter().cloned().collect();
            if !skipped.is_empty() {
                tracing::warn!(%bundle, skipped = skipped.len(), "skipping dependent bundles");
            }
            report.failures.push(BranchFailure {
                bundle: bundle.clone(),
                patch,
                output,
                skipped,
            });
            if options.abort_on_failure {
                report.aborted = true;
                return Ok(report);
            }
            stack.pop_to(&boundary(&orders[..depth]))?;
            continue;
        }

        cursors.push(trie.children(bundle));
        orders.push(None);
    }

    stack.pop_to(&PopTarget::All)?;
    Ok(report)
}

/// Push and refresh each of a bundle's patches, stopping at the first rejection.
fn apply_bundle<S: PatchStack + ?Sized>(
    stack: &mut S,
    patches: &[PatchPath],
    report: &mut RefreshReport,
) -> Result<Option<(PatchPath, String)>> {
    for patch in patches {
        if let Some(output) = stack.push(patch)? {
            return Ok(Some((patch.clone(), output)));
        }
        stack.refresh()?;
        report.patches_refreshed += 1;
        tracing::debug!(%patch, "refreshed");
    }
    Ok(None)
}

/// Last patch applied by the given levels, or every patch if they own none.
fn boundary(levels: &[Option<&[PatchPath]>]) -> PopTarget {
    levels
        .iter()
        .rev()
        .find_map(|level| level.and_then(|patches| patches.last()))
        .map_or(PopTarget::All, |patch| PopTarget::Patch(patch.clone()))
}

fn series(levels: &[Option<&[PatchPath]>]) -> Vec<PatchPath> {
    levels.iter().flatten().flat_map(|patches| patches.iter().cloned()).collect()
}
