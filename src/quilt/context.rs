// SPDX-License-Identifier: GPL-2.0-only

//! Context for executing quilt commands against one source tree.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use bstr::ByteSlice;

use super::{
    command::{quilt_command_error, QuiltCommand, QuiltExitStatus, QuiltOutput},
    series::ScratchSeries,
    PatchStack, PopTarget,
};
use crate::patchpath::PatchPath;

/// `quilt top` exit code meaning no patches are applied.
const NOTHING_APPLIED: i32 = 2;

/// Keep refreshed patches free of timestamps and index lines.
const QUILT_REFRESH_ARGS: &str = "-p ab --no-timestamps --no-index";

const QUILT_PATCH_OPTS: &str = "--reject-format=unified";

/// Locations and limits for running quilt.
#[derive(Clone, Debug)]
pub(crate) struct QuiltConfig {
    /// The quilt executable.
    pub program: OsString,

    /// Tree the patches are applied to.
    pub source_dir: PathBuf,

    /// Root of the patch files named in series files.
    pub patches_dir: PathBuf,

    /// Limit for a single quilt invocation.
    pub timeout: Option<Duration>,
}

/// Quilt bound to a source tree, a patch directory, and a scratch series file.
pub(crate) struct QuiltContext {
    program: OsString,
    source_dir: PathBuf,
    patches_dir: PathBuf,
    timeout: Option<Duration>,
    series: ScratchSeries,
}

impl QuiltContext {
    pub(crate) fn new(config: QuiltConfig) -> Result<Self> {
        let source_dir = canonical_dir(&config.source_dir, "source")?;
        let patches_dir = canonical_dir(&config.patches_dir, "patches")?;
        Ok(Self {
            program: config.program,
            source_dir,
            patches_dir,
            timeout: config.timeout,
            series: ScratchSeries::new()?,
        })
    }

    pub(crate) fn series_path(&self) -> &Path {
        self.series.path()
    }

    fn quilt(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.current_dir(&self.source_dir);
        self.setup_quilt_env(&mut command);
        command.args(["--quiltrc", "-"]);
        command
    }

    fn setup_quilt_env(&self, command: &mut Command) {
        command
            .env("QUILT_PATCHES", &self.patches_dir)
            .env("QUILT_SERIES", self.series.path())
            .env("QUILT_REFRESH_ARGS", QUILT_REFRESH_ARGS)
            .env("QUILT_PATCH_OPTS", QUILT_PATCH_OPTS)
            .env_remove("QUILT_PC");
    }

    fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        tracing::debug!(command = %args.join(" "), "quilt");
        self.quilt()
            .args(args)
            .output_quilt(self.timeout)
            .with_context(|| format!("`quilt {}`", args.join(" ")))
    }
}

impl PatchStack for QuiltContext {
    fn push(&mut self, patch: &PatchPath) -> Result<Option<String>> {
        let output = self.run(&["push", patch.as_str()])?;
        if output.status.success() {
            Ok(None)
        } else if output.status.is_signal() {
            Err(quilt_command_error(&format!("push {patch}"), &output))
        } else {
            Ok(Some(output.combined_text()))
        }
    }

    fn refresh(&mut self) -> Result<()> {
        self.run(&["refresh"])?.require_success("refresh")?;
        Ok(())
    }

    fn top(&mut self) -> Result<Option<PatchPath>> {
        let output = self.run(&["top"])?;
        match output.status.code() {
            Some(0) => {
                let name = output.stdout.to_str_lossy();
                let patch = name
                    .trim()
                    .parse::<PatchPath>()
                    .with_context(|| "`quilt top` printed an unexpected patch name")?;
                Ok(Some(patch))
            }
            Some(NOTHING_APPLIED) => Ok(None),
            _ => Err(quilt_command_error("top", &output)),
        }
    }

    fn pop(&mut self, target: &PopTarget) -> Result<()> {
        let target = target.to_string();
        self.run(&["pop", target.as_str()])?
            .require_success(&format!("pop {target}"))?;
        Ok(())
    }

    fn write_series(&mut self, patches: &[PatchPath]) -> Result<()> {
        self.series.write(patches)
    }
}

fn canonical_dir(dir: &Path, what: &str) -> Result<PathBuf> {
    let canonical = dir
        .canonicalize()
        .with_context(|| format!("{what} directory `{}`", dir.display()))?;
    if canonical.is_dir() {
        Ok(canonical)
    } else {
        Err(anyhow!("{what} path `{}` is not a directory", dir.display()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    /// Stand-in for quilt that records its invocations and keeps the applied
    /// list in a plain file next to itself.
    const FAKE_QUILT: &str = r#"#!/bin/sh
here=$(dirname "$0")
applied="$here/applied"
touch "$applied"
echo "$* | $QUILT_PATCHES | $QUILT_SERIES | $(tr '\n' ' ' < "$QUILT_SERIES")" >> "$here/log"
[ "$1" = "--quiltrc" ] && [ "$2" = "-" ] || exit 99
shift 2
case "$1" in
top)
    [ -s "$applied" ] || { echo "No patches applied"; exit 2; }
    tail -n 1 "$applied"
    ;;
push)
    case "$2" in
    bad*) echo "Applying patch $2"; echo "Hunk #1 FAILED at 12."; exit 1 ;;
    esac
    echo "$2" >> "$applied"
    ;;
pop)
    if [ "$2" = "-a" ]; then
        : > "$applied"
    else
        awk -v top="$2" '{ print } $0 == top { exit }' "$applied" > "$applied.new"
        mv "$applied.new" "$applied"
    fi
    ;;
refresh)
    [ -s "$applied" ] || exit 1
    ;;
slow)
    sleep 5
    ;;
esac
"#;

    struct Fixture {
        root: tempfile::TempDir,
        quilt: QuiltContext,
    }

    impl Fixture {
        fn new(timeout: Option<Duration>) -> Self {
            let root = tempfile::tempdir().unwrap();
            let bin = root.path().join("bin");
            let source = root.path().join("src");
            let patches = root.path().join("patches");
            for dir in [&bin, &source, &patches] {
                std::fs::create_dir(dir).unwrap();
            }
            let program = bin.join("quilt");
            std::fs::write(&program, FAKE_QUILT).unwrap();
            std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

            let quilt = QuiltContext::new(QuiltConfig {
                program: program.into_os_string(),
                source_dir: source,
                patches_dir: patches,
                timeout,
            })
            .unwrap();
            Self { root, quilt }
        }

        fn log(&self) -> Vec<String> {
            std::fs::read_to_string(self.root.path().join("bin/log"))
                .unwrap_or_default()
                .lines()
                .map(String::from)
                .collect()
        }
    }

    fn patches(names: &[&str]) -> Vec<PatchPath> {
        names.iter().map(|n| n.parse().unwrap()).collect()
    }

    #[test]
    fn top_of_empty_stack() {
        let mut fixture = Fixture::new(None);
        assert_eq!(fixture.quilt.top().unwrap(), None);
    }

    #[test]
    fn environment_points_at_series_and_patches() {
        let mut fixture = Fixture::new(None);
        fixture
            .quilt
            .write_series(&patches(&["a.patch", "b.patch"]))
            .unwrap();
        fixture.quilt.top().unwrap();

        let series = fixture.quilt.series_path().display().to_string();
        let patches_dir = fixture.root.path().join("patches").canonicalize().unwrap();
        let log = fixture.log();
        assert_eq!(
            log,
            [format!(
                "--quiltrc - top | {} | {series} | a.patch b.patch ",
                patches_dir.display()
            )]
        );
    }

    #[test]
    fn push_refresh_and_pop() {
        let mut fixture = Fixture::new(Some(Duration::from_secs(30)));
        let series = patches(&["a.patch", "b.patch", "c.patch"]);
        fixture.quilt.write_series(&series).unwrap();

        for patch in &series {
            assert_eq!(fixture.quilt.push(patch).unwrap(), None);
            fixture.quilt.refresh().unwrap();
        }
        assert_eq!(fixture.quilt.top().unwrap(), Some(series[2].clone()));

        fixture
            .quilt
            .pop_to(&PopTarget::Patch(series[0].clone()))
            .unwrap();
        assert_eq!(fixture.quilt.top().unwrap(), Some(series[0].clone()));

        let before = fixture.log().len();
        fixture
            .quilt
            .pop_to(&PopTarget::Patch(series[0].clone()))
            .unwrap();
        let log = fixture.log();
        assert_eq!(log.len(), before + 1);
        assert!(log[before].starts_with("--quiltrc - top "));

        fixture.quilt.pop_to(&PopTarget::All).unwrap();
        assert_eq!(fixture.quilt.top().unwrap(), None);
    }

    #[test]
    fn rejected_push_returns_output() {
        let mut fixture = Fixture::new(None);
        let bad = patches(&["bad.patch"]);
        fixture.quilt.write_series(&bad).unwrap();

        let output = fixture.quilt.push(&bad[0]).unwrap().unwrap();
        assert!(output.contains("Hunk #1 FAILED at 12."));
        assert_eq!(fixture.quilt.top().unwrap(), None);
    }

    #[test]
    fn failed_refresh_is_an_error() {
        let mut fixture = Fixture::new(None);
        let err = fixture.quilt.refresh().unwrap_err();
        assert!(format!("{err:#}").contains("`quilt refresh`"));
    }

    #[test]
    fn slow_quilt_times_out() {
        let fixture = Fixture::new(Some(Duration::from_millis(100)));
        let err = fixture.quilt.run(&["slow"]).unwrap_err();
        assert!(format!("{err:#}").contains("timed out"));
    }

    #[test]
    fn missing_source_dir() {
        let root = tempfile::tempdir().unwrap();
        let result = QuiltContext::new(QuiltConfig {
            program: "quilt".into(),
            source_dir: root.path().join("nope"),
            patches_dir: root.path().to_path_buf(),
            timeout: None,
        });
        assert!(result.is_err());
    }
}
