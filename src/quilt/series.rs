// SPDX-License-Identifier: GPL-2.0-only

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::patchpath::PatchPath;

/// Series file private to one run.
///
/// The file lives in its own temporary directory, which is removed along with
/// the file when this is dropped.
pub(crate) struct ScratchSeries {
    _dir: tempfile::TempDir,
    path: PathBuf,
}

impl ScratchSeries {
    pub(crate) fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("patch-refresh-")
            .tempdir()
            .context("creating scratch series directory")?;
        let path = dir.path().join("series");
        std::fs::write(&path, "")
            .with_context(|| format!("creating `{}`", path.display()))?;
        Ok(Self { _dir: dir, path })
    }

    pub(crate) fn path(&self) -> &Path {
        self.path.as_ref()
    }

    /// Replace the series with `patches`, one per line, in apply order.
    pub(crate) fn write(&self, patches: &[PatchPath]) -> Result<()> {
        let mut content = String::with_capacity(patches.iter().map(|p| p.as_str().len() + 1).sum());
        for patch in patches {
            content.push_str(patch.as_str());
            content.push('\n');
        }
        std::fs::write(&self.path, content)
            .with_context(|| format!("writing `{}`", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_cleanup() {
        let series = ScratchSeries::new().unwrap();
        let path = series.path().to_path_buf();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        let patches: Vec<PatchPath> = ["core/a.patch", "extra/b.patch"]
            .iter()
            .map(|p| p.parse().unwrap())
            .collect();
        series.write(&patches).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "core/a.patch\nextra/b.patch\n"
        );

        series.write(&patches[..1]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "core/a.patch\n");

        drop(series);
        assert!(!path.exists());
    }
}
