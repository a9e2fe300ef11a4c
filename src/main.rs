// SPDX-License-Identifier: GPL-2.0-only

//! Refresh every patch of a hierarchy of patch bundles against a source tree.

mod bundle;
mod color;
mod logging;
mod patchpath;
mod quilt;
mod refresh;
mod trie;

use std::{
    ffi::OsString,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Result};
use clap::{crate_version, parser::ValueSource, value_parser, Arg, ArgAction, ArgMatches};
use termcolor::{Color, ColorSpec, StandardStream, WriteColor};

use crate::{
    bundle::{resolve_bundle_args, BundleCache},
    quilt::{PatchStack, QuiltConfig, QuiltContext},
    refresh::{refresh_patches, RefreshOptions},
    trie::DependencyTrie,
};

/// Default limit, in seconds, for one quilt invocation.
const DEFAULT_TIMEOUT: &str = "300";

fn make() -> clap::Command {
    clap::Command::new("patch-refresh")
        .about("Refresh the patches of every bundle against a source tree")
        .long_about(
            "Refresh the patches of every bundle against a source tree.\n\
             \n\
             Bundles are arranged in a tree following their dependencies so \
             that patches shared by several bundles are pushed and refreshed \
             only once. Each bundle's patches are pushed with quilt on top of \
             those of its dependencies and refreshed in place.\n\
             \n\
             When a patch does not apply, the bundle and everything depending \
             on it are skipped and the remaining bundles are still refreshed, \
             unless --abort-on-failure is given. The source tree must not have \
             any patches applied when starting.",
        )
        .version(crate_version!())
        .max_term_width(88)
        .arg(
            Arg::new("source-dir")
                .long("source-dir")
                .short('s')
                .help("Source tree to refresh the patches against")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .required_unless_present("show-trie"),
        )
        .arg(
            Arg::new("bundle")
                .long("bundle")
                .short('b')
                .help("Refresh only this bundle and its dependencies")
                .long_help(
                    "Refresh only this bundle and its dependencies. May be given \
                     multiple times. The last component of PATH names the bundle \
                     and its parent directory, if any, is used as the bundles \
                     directory. All bundles must then be in the same directory. \
                     By default, every bundle in the bundles directory is refreshed.",
                )
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("bundles-dir")
                .long("bundles-dir")
                .help("Directory containing the bundles")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .env("PATCH_REFRESH_BUNDLES_DIR")
                .default_value("config_bundles"),
        )
        .arg(
            Arg::new("patches-dir")
                .long("patches-dir")
                .help("Directory containing the patch files")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .env("PATCH_REFRESH_PATCHES_DIR")
                .default_value("patches"),
        )
        .arg(
            Arg::new("abort-on-failure")
                .long("abort-on-failure")
                .help("Stop at the first patch that fails to apply")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quilt")
                .long("quilt")
                .help("Quilt executable to use")
                .value_name("PATH")
                .value_parser(value_parser!(OsString))
                .env("PATCH_REFRESH_QUILT")
                .default_value("quilt"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .help("Seconds to allow for each quilt command; 0 for no limit")
                .value_name("SECONDS")
                .value_parser(value_parser!(u64))
                .default_value(DEFAULT_TIMEOUT),
        )
        .arg(
            Arg::new("show-trie")
                .long("show-trie")
                .help("Print the bundle dependency tree and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("report")
                .long("report")
                .help("Write a JSON report of the run to PATH")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log more detail; repeat for even more")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Only log warnings and errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .arg(color::get_color_arg())
}

fn main() {
    let matches = make().get_matches();

    let verbosity = if matches.get_flag("quiet") {
        -1
    } else {
        i8::try_from(matches.get_count("verbose")).unwrap_or(i8::MAX)
    };
    logging::init(verbosity, color::use_color_for_logs(&matches));

    match run(&matches) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            let mut stderr =
                StandardStream::stderr(color::get_color_choice(&matches, atty::Stream::Stderr));
            if write_error_message(&mut stderr, &e).is_err() {
                eprintln!("error: {e:#}");
            }
            std::process::exit(2)
        }
    }
}

/// Returns whether every bundle was refreshed.
fn run(matches: &ArgMatches) -> Result<bool> {
    let configured_dir = matches
        .get_one::<PathBuf>("bundles-dir")
        .expect("has default");
    let patches_dir = matches
        .get_one::<PathBuf>("patches-dir")
        .expect("has default");
    let show_trie = matches.get_flag("show-trie");

    let (bundles_dir, requested) = if let Some(args) = matches.get_many::<PathBuf>("bundle") {
        let args: Vec<&Path> = args.map(PathBuf::as_path).collect();
        let explicit = matches!(
            matches.value_source("bundles-dir"),
            Some(ValueSource::CommandLine | ValueSource::EnvVariable)
        );
        let (root, names) =
            resolve_bundle_args(&args, explicit.then_some(configured_dir.as_path()))?;
        (root.unwrap_or_else(|| configured_dir.clone()), names)
    } else {
        (configured_dir.clone(), BundleCache::discover(configured_dir)?)
    };
    tracing::debug!(bundles_dir = %bundles_dir.display(), "loading bundles");

    let cache = BundleCache::load(
        &bundles_dir,
        &requested,
        (!show_trie).then_some(patches_dir.as_path()),
    )?;
    let trie = DependencyTrie::build(&cache, Some(&requested[..]))?;
    tracing::info!(
        requested = requested.len(),
        loaded = cache.len(),
        placed = trie.len(),
        "built dependency trie"
    );

    if show_trie {
        print_trie(matches, &cache, &trie)?;
        return Ok(true);
    }

    let source_dir = matches
        .get_one::<PathBuf>("source-dir")
        .ok_or_else(|| anyhow!("`--source-dir` is required"))?;
    let mut quilt = QuiltContext::new(QuiltConfig {
        program: quilt_program(matches)?,
        source_dir: source_dir.clone(),
        patches_dir: patches_dir.clone(),
        timeout: match matches.get_one::<u64>("timeout").copied() {
            None | Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
        },
    })?;
    tracing::debug!(series = %quilt.series_path().display(), "using scratch series");

    if let Some(top) = quilt.top()? {
        return Err(anyhow!(
            "source tree already has patches applied, top is `{top}`; \
             pop them with `quilt pop -a` first"
        ));
    }

    let options = RefreshOptions {
        abort_on_failure: matches.get_flag("abort-on-failure"),
    };
    let report = refresh_patches(&cache, &trie, &mut quilt, options)?;

    let mut stdout = color::get_color_stdout(matches);
    report.write_summary(&mut stdout)?;
    if let Some(path) = matches.get_one::<PathBuf>("report") {
        report.write_json(path)?;
    }

    tracing::info!(
        refreshed = report.patches_refreshed,
        failed = report.failures.len(),
        "done"
    );
    Ok(!report.has_failures())
}

/// The quilt executable, made absolute when given as a relative path.
///
/// Quilt runs from the source directory, so a relative path would otherwise
/// be resolved against the wrong directory.
fn quilt_program(matches: &ArgMatches) -> Result<OsString> {
    let program = matches.get_one::<OsString>("quilt").expect("has default");
    let path = PathBuf::from(program);
    if path.is_relative() && path.components().count() > 1 {
        Ok(std::env::current_dir()?.join(path).into_os_string())
    } else {
        Ok(program.clone())
    }
}

fn print_trie(matches: &ArgMatches, cache: &BundleCache, trie: &DependencyTrie) -> Result<()> {
    let mut stdout = color::get_color_stdout(matches);
    let mut color_spec = ColorSpec::new();
    for (depth, name) in trie.preorder() {
        write!(stdout, "{:indent$}", "", indent = depth * 2)?;
        stdout.set_color(color_spec.set_bold(true))?;
        write!(stdout, "{name}")?;
        color_spec.clear();
        stdout.set_color(&color_spec)?;
        let patches = cache.patch_order(name).len();
        match cache.get(name).and_then(|meta| meta.display_name.as_deref()) {
            Some(display_name) => writeln!(stdout, " ({display_name}, {patches} patches)")?,
            None => writeln!(stdout, " ({patches} patches)")?,
        }
    }
    Ok(())
}

/// Write `err` with its causes, highlighting back-quoted names.
fn write_error_message<W: WriteColor>(out: &mut W, err: &anyhow::Error) -> std::io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
    write!(out, "error: ")?;
    out.reset()?;

    let message = format!("{err:#}");
    let segments: Vec<&str> = message.split('`').collect();
    // An odd number of backquotes leaves the last one unpaired.
    let unpaired = segments.len() % 2 == 0;
    for (i, segment) in segments.iter().enumerate() {
        if i % 2 == 0 {
            write!(out, "{segment}")?;
        } else if unpaired && i == segments.len() - 1 {
            write!(out, "`{segment}")?;
        } else {
            write!(out, "`")?;
            out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
            write!(out, "{segment}")?;
            out.reset()?;
            write!(out, "`")?;
        }
    }
    writeln!(out)
}
