// SPDX-License-Identifier: GPL-2.0-only

//! Drive quilt, the external patch-stack tool.
//!
//! Quilt owns the list of applied patches in the source tree. Everything that
//! reads or changes that list goes through a single [`PatchStack`]; there is
//! never more than one caller.

mod command;
mod context;
mod series;

use anyhow::Result;

pub(crate) use self::context::{QuiltConfig, QuiltContext};
use crate::patchpath::PatchPath;

/// Where a pop should stop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PopTarget {
    /// Pop until this patch is the top patch.
    Patch(PatchPath),

    /// Pop every applied patch.
    All,
}

impl PopTarget {
    /// The patch expected on top once the pop completes.
    pub(crate) fn top(&self) -> Option<&PatchPath> {
        match self {
            Self::Patch(patch) => Some(patch),
            Self::All => None,
        }
    }
}

impl std::fmt::Display for PopTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Patch(patch) => write!(f, "{patch}"),
            Self::All => f.write_str("-a"),
        }
    }
}

/// Operations on the external patch stack.
pub(crate) trait PatchStack {
    /// Apply `patch`, the next patch of the current series.
    ///
    /// Returns `None` if the patch applies, or the tool's output if the patch
    /// is rejected. Failing to run the tool at all is an error.
    fn push(&mut self, patch: &PatchPath) -> Result<Option<String>>;

    /// Rewrite the top patch to match the current state of the tree.
    fn refresh(&mut self) -> Result<()>;

    /// Currently applied top patch, or `None` when nothing is applied.
    fn top(&mut self) -> Result<Option<PatchPath>>;

    /// Pop patches unconditionally.
    fn pop(&mut self, target: &PopTarget) -> Result<()>;

    /// Replace the active series.
    fn write_series(&mut self, patches: &[PatchPath]) -> Result<()>;

    /// Pop until `target` is the top, doing nothing if it already is.
    fn pop_to(&mut self, target: &PopTarget) -> Result<()> {
        let top = self.top()?;
        if top.as_ref() == target.top() {
            tracing::trace!(%target, "stack already in place");
            Ok(())
        } else {
            self.pop(target)
        }
    }
}
