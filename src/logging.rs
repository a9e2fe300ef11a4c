// SPDX-License-Identifier: GPL-2.0-only

//! Diagnostic logging to stderr.

use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Default level for a given `-v`/`-q` balance. `RUST_LOG` takes precedence.
fn level_from_verbosity(verbosity: i8) -> LevelFilter {
    match verbosity {
        i8::MIN..=-1 => LevelFilter::WARN,
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

pub(crate) fn init(verbosity: i8, ansi: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(verbosity).into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(ansi)
        .without_time()
        .try_init();
}
