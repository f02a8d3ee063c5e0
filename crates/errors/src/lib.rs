#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `errors` collects the error taxonomy shared by the `checksum`, `retrieve`
//! and `save` subcommands: a single [`BlockcopyError`] enum plus the
//! [`Subcommand`] tag used to format the one-line `ERROR (<subcommand>):
//! <message>` diagnostic every subcommand prints on failure.
//!
//! # Invariants
//!
//! - [`BlockcopyError::IncompleteRead`] is always reported separately from
//!   [`BlockcopyError::Worker`] so that callers can tell "a worker observed
//!   a hard fault" apart from "the upstream peer hung up early" — the two
//!   propagate differently through the error collector in `pipeline`.
//! - [`ExitCode::from`] never returns `0` for an `Err` value; `0` is reserved
//!   for a clean exit.

use std::fmt;

/// Errors produced anywhere in the blockcopy pipeline.
#[derive(Debug, thiserror::Error)]
pub enum BlockcopyError {
    /// Bad CLI arguments, `-` used where disallowed, or binary output
    /// refused on a TTY. Detected before any worker starts.
    #[error("{0}")]
    Usage(String),

    /// The input stream closed mid-record or before a `done` tag.
    ///
    /// Kept distinct from [`Self::Worker`] so a worker pool can finish
    /// in-flight batches cleanly instead of treating this as a hard fault.
    #[error("incomplete read: {0}")]
    IncompleteRead(String),

    /// A 4-byte tag outside the set defined for the stream in question.
    #[error("unknown command tag {tag:?}")]
    UnknownCommand {
        /// The raw tag bytes that were not recognised.
        tag: [u8; 4],
    },

    /// A record was well-formed but violated a protocol invariant, such as a
    /// declared `block_len` exceeding `BLOCK_SIZE`.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A read, write, or seek on a local file or pipe failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other fault raised by a reader, hasher, or writer thread.
    #[error("{0}")]
    Worker(String),
}

impl BlockcopyError {
    /// Maps this error to the process exit code its taxonomy implies.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::Usage(_) => ExitCode::Usage,
            Self::IncompleteRead(_) => ExitCode::IncompleteRead,
            Self::UnknownCommand { .. } | Self::Protocol(_) => ExitCode::Protocol,
            Self::Io(_) => ExitCode::Io,
            Self::Worker(_) => ExitCode::Worker,
        }
    }
}

/// Process exit codes used by the three subcommands.
///
/// These are not an attempt to mirror any other tool's numbering; they only
/// need to be stable, non-zero on failure, and distinguishable in scripts
/// that inspect `$?`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful completion.
    Ok = 0,
    /// Bad arguments or a refused TTY write.
    Usage = 1,
    /// A tag outside the protocol's known set was received.
    Protocol = 2,
    /// A local file/pipe read, write, or seek failed.
    Io = 11,
    /// The input stream closed before its terminating `done` tag.
    IncompleteRead = 12,
    /// A worker thread raised a fault other than the above.
    Worker = 14,
}

impl ExitCode {
    /// Returns the numeric exit status.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

/// The three subcommands, used only to tag diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subcommand {
    /// `blockcopy checksum`.
    Checksum,
    /// `blockcopy retrieve`.
    Retrieve,
    /// `blockcopy save`.
    Save,
}

impl Subcommand {
    /// The subcommand name as it appears on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checksum => "checksum",
            Self::Retrieve => "retrieve",
            Self::Save => "save",
        }
    }
}

impl fmt::Display for Subcommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats the one-line diagnostic every subcommand writes to stderr on
/// failure: `ERROR (<subcommand>): <message>`.
#[must_use]
pub fn diagnostic(subcommand: Subcommand, error: &BlockcopyError) -> String {
    format!("ERROR ({subcommand}): {error}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_read_maps_to_its_own_exit_code() {
        let err = BlockcopyError::IncompleteRead("hash stream closed before done".into());
        assert_eq!(err.exit_code(), ExitCode::IncompleteRead);
        assert_eq!(err.exit_code().as_i32(), 12);
    }

    #[test]
    fn diagnostic_includes_subcommand_and_message() {
        let err = BlockcopyError::Usage("refusing to write binary data to a terminal".into());
        let line = diagnostic(Subcommand::Checksum, &err);
        assert_eq!(
            line,
            "ERROR (checksum): refusing to write binary data to a terminal"
        );
    }

    #[test]
    fn every_exit_code_is_nonzero_except_ok() {
        assert_eq!(ExitCode::Ok.as_i32(), 0);
        for code in [
            ExitCode::Usage,
            ExitCode::Protocol,
            ExitCode::Io,
            ExitCode::IncompleteRead,
            ExitCode::Worker,
        ] {
            assert_ne!(code.as_i32(), 0);
        }
    }
}
