//! Command-line surface: `blockcopy [-v] <checksum|retrieve|save> FILE ...` (§6).

use clap::{Parser, Subcommand};

/// Top-level argument parser for the `blockcopy` binary.
#[derive(Parser, Debug)]
#[command(name = "blockcopy", disable_version_flag = true, disable_help_subcommand = true)]
pub struct Cli {
    /// Raises log verbosity; equivalent to setting `DEBUG=1`.
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Prints `blockcopy 0.0.2` and exits, ignoring any subcommand.
    #[arg(long = "version")]
    pub version: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// The three one-shot pipeline stages.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Hashes a local destination object into a hash stream on stdout.
    Checksum {
        /// Destination file, block device, or `-`/`/dev/stdin`.
        file: String,
        /// Byte offset at which to start hashing (default 0).
        #[arg(long, default_value_t = 0)]
        start: u64,
        /// Byte offset at which to stop hashing (default: end of input).
        #[arg(long)]
        end: Option<u64>,
    },
    /// Reads a hash stream on stdin, compares against a local source object,
    /// and writes a data stream on stdout.
    Retrieve {
        /// Source file or block device. `-`/`/dev/stdin` is rejected.
        file: String,
    },
    /// Reads a data stream on stdin and applies it to a local destination
    /// object.
    Save {
        /// Destination file or block device. `-`/`/dev/stdin` is rejected.
        file: String,
    },
}
