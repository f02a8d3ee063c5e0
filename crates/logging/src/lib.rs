#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `logging` wires `-v`/`--verbose` and the `DEBUG` environment variable
//! (§6) into a [`tracing_subscriber`] formatter shared by all three
//! subcommands.
//!
//! # Design
//!
//! Each subcommand calls [`init`] once, before spawning any worker thread,
//! with the verbosity it parsed from argv. Log lines go to stderr so they
//! never interleave with the binary hash/data stream written to stdout.
//!
//! # Invariants
//!
//! - [`init`] is idempotent-safe to call at most once per process; calling
//!   it twice is a logic error in the caller, not something this crate
//!   guards against, since each subcommand process only ever calls it from
//!   `main`.

use std::env;

use tracing_subscriber::EnvFilter;

/// Verbosity requested on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verbosity {
    /// Default: warnings and errors only.
    Normal,
    /// `-v`/`--verbose` or a non-empty `DEBUG` environment variable.
    Verbose,
}

impl Verbosity {
    /// Resolves the verbosity for this run from the `-v` flag and the
    /// `DEBUG` environment variable, per §6: "`-v`/`--verbose` or env
    /// `DEBUG=1` raises log verbosity."
    #[must_use]
    pub fn resolve(verbose_flag: bool) -> Self {
        let debug_env = env::var_os("DEBUG").is_some_and(|v| !v.is_empty());
        if verbose_flag || debug_env {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    fn filter_directive(self) -> &'static str {
        match self {
            Self::Normal => "warn",
            Self::Verbose => "debug",
        }
    }
}

/// Installs the global `tracing` subscriber at the given verbosity.
///
/// Output is written to stderr with the default compact formatter; the
/// binary hash/data streams never share a handle with tracing's writer.
pub fn init(verbosity: Verbosity) {
    let filter = EnvFilter::try_new(verbosity.filter_directive())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_flag_alone_raises_verbosity() {
        assert_eq!(Verbosity::resolve(true), Verbosity::Verbose);
    }

    #[test]
    fn filter_directives_differ_by_verbosity() {
        assert_eq!(Verbosity::Normal.filter_directive(), "warn");
        assert_eq!(Verbosity::Verbose.filter_directive(), "debug");
    }
}
