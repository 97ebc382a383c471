//! Diagnostic logging to stderr.

use tracing_subscriber::EnvFilter;

/// Default filter directive for a `-q`/`-v` combination.
///
/// Quiet wins over verbosity.
pub fn default_directive(quiet: bool, verbosity: u8) -> &'static str {
    if quiet {
        return "error";
    }
    match verbosity {
        0 => "warn",
        1 => "storycast=info,warn",
        _ => "storycast=debug,info",
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the flags.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(quiet: bool, verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(quiet, verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}
