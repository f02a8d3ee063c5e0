#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `wire` implements the two binary protocols that connect the three
//! blockcopy subcommands (§4.1, §4.2 of the block copy protocol): the
//! **hash stream** (`checksum` → `retrieve`) and the **data stream**
//! (`retrieve` → `save`). Both are big-endian byte streams with no length
//! prefix and no version header; every record is self-delimiting via a
//! 4-byte ASCII tag.
//!
//! # Design
//!
//! Each stream gets its own module ([`hash_stream`], [`data_stream`])
//! exposing a `write_*` function per record kind plus a single `read_record`
//! that decodes the next record (or reports clean end-of-stream). Readers
//! and writers never buffer a whole stream; each record is encoded or
//! decoded against any `Read`/`Write` implementation, so the pipeline
//! crate can plug in a file, a pipe, or a `Vec<u8>` in tests interchangeably.
//!
//! # Invariants
//!
//! - [`BLOCK_SIZE`] bounds every `block_len`; only the last record of a
//!   stream may declare a shorter length.
//! - [`DIGEST_LEN`] is exactly 64, matching `checksums::strong::Sha3_512`.
//! - A truncated tag or field (the stream closes mid-record) is reported as
//!   [`errors::BlockcopyError::IncompleteRead`], never as a generic I/O
//!   error, so callers can apply the "drain but don't poison" policy from
//!   §4.4.
//! - A 4-byte tag outside the set a given stream recognises is reported as
//!   [`errors::BlockcopyError::UnknownCommand`].
//! - A declared `len`/`block_len` over [`BLOCK_SIZE`] is rejected as
//!   [`errors::BlockcopyError::Protocol`] before it is used to size an
//!   allocation; `len` always comes straight off the wire and must be
//!   bounds-checked before use.
//!
//! # Errors
//!
//! All decode functions return [`errors::BlockcopyError`]; encode functions
//! return [`std::io::Result`] since there is nothing to protocol-validate
//! when writing.

use std::io::{self, Read};

use errors::BlockcopyError;

pub mod data_stream;
pub mod hash_stream;

/// Maximum size of a block's payload, in bytes (128 KiB).
pub const BLOCK_SIZE: u32 = 128 * 1024;

/// Byte width of a `BlockHash` digest (SHA-3-512).
pub const DIGEST_LEN: usize = 64;

/// A block digest as it appears on the wire.
pub type Digest = [u8; DIGEST_LEN];

/// Outcome of attempting to read a 4-byte record tag.
enum TagRead {
    /// A complete tag was read.
    Tag([u8; 4]),
    /// The stream was already at a record boundary; nothing more to read.
    Eof,
}

/// Reads the next 4-byte tag, distinguishing a clean end-of-stream (no bytes
/// available at a record boundary) from a stream that closed partway
/// through a tag.
fn read_tag(r: &mut impl Read) -> Result<TagRead, BlockcopyError> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    loop {
        if filled == buf.len() {
            return Ok(TagRead::Tag(buf));
        }
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(TagRead::Eof),
            Ok(0) => {
                return Err(BlockcopyError::IncompleteRead(
                    "stream closed while reading a record tag".into(),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(BlockcopyError::Io(e)),
        }
    }
}

/// Reads a fixed-size field that must follow a recognised tag; a truncated
/// read here is always an incomplete record, never a generic I/O failure.
fn read_field(r: &mut impl Read, buf: &mut [u8]) -> Result<(), BlockcopyError> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            BlockcopyError::IncompleteRead("stream closed mid-record".into())
        } else {
            BlockcopyError::Io(e)
        }
    })
}

/// Reads a length-`len` payload that must follow a length field; truncation
/// here is also an incomplete record. Rejects a `len` over [`BLOCK_SIZE`]
/// before allocating, since `len` comes straight off an untrusted stream.
fn read_payload(r: &mut impl Read, len: u32) -> Result<Vec<u8>, BlockcopyError> {
    check_block_len(len)?;
    let mut payload = vec![0u8; len as usize];
    read_field(r, &mut payload)?;
    Ok(payload)
}

/// Rejects a declared block length over [`BLOCK_SIZE`] before it is used to
/// size an allocation.
pub(crate) fn check_block_len(len: u32) -> Result<(), BlockcopyError> {
    if len > BLOCK_SIZE {
        return Err(BlockcopyError::Protocol(format!(
            "block_len {len} exceeds BLOCK_SIZE ({BLOCK_SIZE})"
        )));
    }
    Ok(())
}
