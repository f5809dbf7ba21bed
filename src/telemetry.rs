//! Logging setup for the binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the caller.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;

/// Default level for a verbosity count: warn, then info, debug, trace.
/// `quiet` wins and keeps only errors.
pub fn default_directive(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Installs a global `fmt` subscriber writing to stderr.
///
/// `RUST_LOG`, when set and valid, overrides the level chosen from the
/// command line.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(verbosity: u8, quiet: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity, quiet)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::default_directive;

    #[test]
    fn verbosity_levels() {
        assert_eq!(default_directive(0, false), "warn");
        assert_eq!(default_directive(1, false), "info");
        assert_eq!(default_directive(2, false), "debug");
        assert_eq!(default_directive(7, false), "trace");
    }

    #[test]
    fn quiet_overrides_verbose() {
        assert_eq!(default_directive(3, true), "error");
    }
}
