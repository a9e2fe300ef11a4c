// SPDX-License-Identifier: GPL-2.0-only

use clap::{Arg, ArgMatches};
use termcolor::{ColorChoice, StandardStream};

pub(crate) fn get_color_arg() -> Arg {
    Arg::new("color")
        .long("color")
        .help("When to colorize output: auto, always, ansi, never")
        .long_help(
            "Specify WHEN to colorize the output.\n\
             \n\
             'auto' (the default) enables colored output only when \
             outputting to a terminal or TTY. The NO_COLOR environment \
             variable is respected.\n\
             \n\
             'always' and 'never' unconditionally enable/disable \
             colored output, respectively.\n\
             \n\
             'ansi' forces color to be output using ANSI escape sequences, \
             even in a Windows console.",
        )
        .hide_default_value(true)
        .hide_possible_values(true)
        .value_name("WHEN")
        .value_parser(["auto", "always", "ansi", "never"])
        .num_args(1)
        .default_value("auto")
        .overrides_with("color")
}

pub(crate) fn get_color_stdout(matches: &ArgMatches) -> StandardStream {
    StandardStream::stdout(get_color_choice(matches, atty::Stream::Stdout))
}

pub(crate) fn get_color_choice(matches: &ArgMatches, stream: atty::Stream) -> ColorChoice {
    match matches.get_one::<String>("color").map_or("auto", String::as_str) {
        "always" => ColorChoice::Always,
        "ansi" => ColorChoice::AlwaysAnsi,
        "auto" => {
            if atty::is(stream) {
                ColorChoice::Auto
            } else {
                ColorChoice::Never
            }
        }
        _ => ColorChoice::Never,
    }
}

/// Whether log lines written to stderr should carry ANSI colors.
pub(crate) fn use_color_for_logs(matches: &ArgMatches) -> bool {
    match get_color_choice(matches, atty::Stream::Stderr) {
        ColorChoice::Always | ColorChoice::AlwaysAnsi => true,
        ColorChoice::Auto => std::env::var_os("NO_COLOR").is_none(),
        ColorChoice::Never => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(args: &[&str]) -> ArgMatches {
        clap::Command::new("patch-refresh")
            .arg(get_color_arg())
            .try_get_matches_from(std::iter::once("patch-refresh").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn explicit_choices() {
        let always = matches(&["--color", "always"]);
        assert_eq!(get_color_choice(&always, atty::Stream::Stdout), ColorChoice::Always);
        assert!(use_color_for_logs(&always));

        let never = matches(&["--color=never"]);
        assert_eq!(get_color_choice(&never, atty::Stream::Stdout), ColorChoice::Never);
        assert!(!use_color_for_logs(&never));

        let last_wins = matches(&["--color", "never", "--color", "ansi"]);
        assert_eq!(
            get_color_choice(&last_wins, atty::Stream::Stderr),
            ColorChoice::AlwaysAnsi
        );
    }

    #[test]
    fn rejects_unknown_choice() {
        assert!(clap::Command::new("patch-refresh")
            .arg(get_color_arg())
            .try_get_matches_from(["patch-refresh", "--color", "sometimes"])
            .is_err());
    }
}
