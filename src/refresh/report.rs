// SPDX-License-Identifier: GPL-2.0-only

//! Outcome of a refresh run.

use std::{io::Write, path::Path};

use anyhow::{Context, Result};
use serde::Serialize;
use termcolor::{Color, ColorSpec, WriteColor};

use crate::{bundle::BundleName, patchpath::PatchPath};

/// A bundle whose patch was rejected, and the branch it takes down with it.
#[derive(Debug, Serialize)]
pub(crate) struct BranchFailure {
    pub bundle: BundleName,
    pub patch: PatchPath,

    /// Everything quilt printed for the rejected push.
    pub output: String,

    /// Bundles beneath the failed one that were not attempted.
    pub skipped: Vec<BundleName>,
}

#[derive(Debug, Default, Serialize)]
pub(crate) struct RefreshReport {
    pub bundles_visited: usize,
    pub patches_refreshed: usize,
    pub failures: Vec<BranchFailure>,

    /// The walk stopped at the first failure.
    pub aborted: bool,
}

impl RefreshReport {
    pub(crate) fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub(crate) fn write_summary<W: WriteColor>(&self, out: &mut W) -> std::io::Result<()> {
        let mut color_spec = ColorSpec::new();

        write!(
            out,
            "Refreshed {} patches in {} bundles",
            self.patches_refreshed, self.bundles_visited
        )?;
        if self.aborted {
            write!(out, " (aborted)")?;
        }
        writeln!(out)?;

        for failure in &self.failures {
            out.set_color(color_spec.set_fg(Some(Color::Red)).set_bold(true))?;
            write!(out, "failed")?;
            color_spec.clear();
            out.set_color(&color_spec)?;
            write!(out, ": ")?;
            out.set_color(color_spec.set_bold(true))?;
            write!(out, "{}", failure.bundle)?;
            color_spec.clear();
            out.set_color(&color_spec)?;
            writeln!(out, " at {}", failure.patch)?;

            if !failure.skipped.is_empty() {
                out.set_color(color_spec.set_fg(Some(Color::Yellow)))?;
                write!(out, "  skipped")?;
                color_spec.clear();
                out.set_color(&color_spec)?;
                let skipped: Vec<&str> = failure.skipped.iter().map(BundleName::as_str).collect();
                writeln!(out, ": {}", skipped.join(", "))?;
            }
        }
        Ok(())
    }

    pub(crate) fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating report `{}`", path.display()))?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .with_context(|| format!("writing report `{}`", path.display()))?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use termcolor::NoColor;

    use super::*;

    fn failed_report() -> RefreshReport {
        RefreshReport {
            bundles_visited: 3,
            patches_refreshed: 7,
            failures: vec![BranchFailure {
                bundle: "linux".parse().unwrap(),
                patch: "core/fix.patch".parse().unwrap(),
                output: "Hunk #1 FAILED at 3.\n".into(),
                skipped: vec!["debian".parse().unwrap(), "fedora".parse().unwrap()],
            }],
            aborted: false,
        }
    }

    #[test]
    fn summary_lists_failures() {
        let mut out = NoColor::new(Vec::new());
        failed_report().write_summary(&mut out).unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();
        assert_eq!(
            text,
            "Refreshed 7 patches in 3 bundles\n\
             failed: linux at core/fix.patch\n  \
             skipped: debian, fedora\n"
        );
    }

    #[test]
    fn json_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        failed_report().write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["patches_refreshed"], 7);
        assert_eq!(value["failures"][0]["bundle"], "linux");
        assert_eq!(value["failures"][0]["patch"], "core/fix.patch");
        assert_eq!(value["failures"][0]["skipped"][1], "fedora");
        assert_eq!(value["aborted"], false);
    }

    #[test]
    fn clean_report() {
        let report = RefreshReport::default();
        assert!(!report.has_failures());
        let mut out = NoColor::new(Vec::new());
        report.write_summary(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out.into_inner()).unwrap(),
            "Refreshed 0 patches in 0 bundles\n"
        );
    }
}
