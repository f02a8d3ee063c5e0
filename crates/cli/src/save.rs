//! `blockcopy save FILE` (§4.2).
//!
//! The simplest of the three stages: a single thread reads the data stream
//! sequentially and writes each record's payload at its offset. No hashing,
//! no worker pool — the destination is opened read/write without
//! truncation so offsets beyond the current end-of-file extend it.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};

use errors::BlockcopyError;
use wire::data_stream::{self, DataRecord};

/// Parsed arguments for the `save` subcommand.
pub struct SaveArgs {
    /// Destination file or block device. `-`/`/dev/stdin` is rejected.
    pub file: String,
}

/// Runs `save`: applies the data stream read from `data_in` to
/// `args.file`.
pub fn run(args: SaveArgs, mut data_in: impl Read) -> Result<(), BlockcopyError> {
    if args.file == "-" || args.file == "/dev/stdin" {
        return Err(BlockcopyError::Usage(
            "save requires a seekable destination file; '-'/'/dev/stdin' is not accepted".into(),
        ));
    }

    let mut destination = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&args.file)?;

    loop {
        match data_stream::read_record(&mut data_in)? {
            None => {
                return Err(BlockcopyError::IncompleteRead(
                    "data stream closed before a done record".into(),
                ));
            }
            Some(DataRecord::Done) => return Ok(()),
            Some(DataRecord::Data { pos, payload }) => {
                destination.seek(SeekFrom::Start(pos))?;
                destination.write_all(&payload)?;
            }
        }
    }
}
