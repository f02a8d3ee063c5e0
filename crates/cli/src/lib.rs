#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `cli` is the command-line front end for the `blockcopy` binary (§6): it
//! parses `<prog> [-v] <checksum|retrieve|save> FILE ...`, wires up logging,
//! enforces the refuse-to-corrupt TTY rule, and dispatches to whichever of
//! [`checksum`], [`retrieve`], or [`save`] was requested.
//!
//! # Design
//!
//! [`run`] mirrors the binary-crate-facing entry point pattern used
//! throughout this workspace: it accepts an argument iterator plus
//! `stdout`/`stderr` handles and returns a numeric exit code, so the actual
//! `main` stays a thin wrapper and tests can drive the whole CLI surface
//! without a subprocess.
//!
//! # Errors
//!
//! Every subcommand failure is rendered as a single `ERROR (<subcommand>):
//! <message>` line on `stderr` and mapped to its
//! [`errors::BlockcopyError::exit_code`]. Argument-parsing failures (from
//! `clap`) and a missing subcommand both exit with
//! [`errors::ExitCode::Usage`].

mod args;
mod checksum;
mod io_util;
mod retrieve;
mod save;

use std::ffi::OsString;
use std::io::{self, Write};

use clap::Parser;
use errors::{diagnostic, BlockcopyError, ExitCode, Subcommand};
use is_terminal::IsTerminal;

pub use args::{Cli, Command};

/// Exact banner `--version` must print (§6).
pub const VERSION_BANNER: &str = "blockcopy 0.0.2\n";

/// Parses `args`, runs the requested subcommand, and returns a process exit
/// code. Never panics: parse failures, usage errors, and pipeline failures
/// are all reported on `stderr` and turned into a nonzero code.
pub fn run<I, S, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
    Out: Write + IsTerminal,
    Err: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(parse_err) => {
            let _ = write!(stderr, "{parse_err}");
            return ExitCode::Usage.as_i32();
        }
    };

    if cli.version {
        let _ = stdout.write_all(VERSION_BANNER.as_bytes());
        return ExitCode::Ok.as_i32();
    }

    logging::init(logging::Verbosity::resolve(cli.verbose));

    let Some(command) = cli.command else {
        let _ = writeln!(
            stderr,
            "{}",
            diagnostic(
                Subcommand::Checksum,
                &BlockcopyError::Usage(
                    "a subcommand is required: checksum, retrieve, or save".into()
                ),
            )
        );
        return ExitCode::Usage.as_i32();
    };

    let (subcommand, result) = dispatch(command, stdout);

    match result {
        Ok(()) => ExitCode::Ok.as_i32(),
        Err(err) => {
            let _ = writeln!(stderr, "{}", diagnostic(subcommand, &err));
            err.exit_code().as_i32()
        }
    }
}

/// Converts a numeric exit code into a [`std::process::ExitCode`].
pub fn exit_code_from(status: i32) -> std::process::ExitCode {
    let clamped = status.clamp(0, i32::from(u8::MAX));
    std::process::ExitCode::from(clamped as u8)
}

fn dispatch(
    command: Command,
    stdout: &mut (impl Write + IsTerminal),
) -> (Subcommand, Result<(), BlockcopyError>) {
    match command {
        Command::Checksum { file, start, end } => {
            let result = match io_util::refuse_tty(&*stdout, "checksum") {
                Ok(()) => checksum::run(checksum::ChecksumArgs { file, start, end }, stdout),
                Err(err) => Err(err),
            };
            (Subcommand::Checksum, result)
        }
        Command::Retrieve { file } => {
            let result = match io_util::refuse_tty(&*stdout, "retrieve") {
                Ok(()) => retrieve::run(retrieve::RetrieveArgs { file }, io::stdin(), stdout),
                Err(err) => Err(err),
            };
            (Subcommand::Retrieve, result)
        }
        Command::Save { file } => (
            Subcommand::Save,
            save::run(save::SaveArgs { file }, io::stdin()),
        ),
    }
}
