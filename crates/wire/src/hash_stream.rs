//! The hash stream emitted by `checksum` and consumed by `retrieve` (§4.1).
//!
//! ```text
//! "Hash" pos:u64 len:u32 digest:64B   -- block at [pos, pos+len) hashes to digest
//! "hash" len:u32 digest:64B          -- deprecated, position is the reader's cursor
//! "rest" offset:u64                  -- send every source byte from offset onward
//! "done"                             -- end of stream
//! ```

use std::io::{self, Write};

use errors::BlockcopyError;

use crate::{check_block_len, read_field, read_tag, Digest, TagRead};

const TAG_HASH: [u8; 4] = *b"Hash";
const TAG_HASH_LEGACY: [u8; 4] = *b"hash";
const TAG_REST: [u8; 4] = *b"rest";
const TAG_DONE: [u8; 4] = *b"done";

/// One record of the hash stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HashRecord {
    /// `Hash(pos, len, digest)`: the destination holds `digest` at `[pos,
    /// pos+len)`. Emitted by every compliant producer.
    Hash {
        /// Start offset of the block, in bytes.
        pos: u64,
        /// Length of the block, in bytes (at most [`crate::BLOCK_SIZE`]).
        len: u32,
        /// SHA-3-512 digest of the block's bytes.
        digest: Digest,
    },
    /// Deprecated position-less form. Never emitted by this implementation;
    /// accepted for interoperability with older producers. The position is
    /// implied by the reader's running cursor.
    HashLegacy {
        /// Length of the block, in bytes.
        len: u32,
        /// SHA-3-512 digest of the block's bytes.
        digest: Digest,
    },
    /// `rest(offset)`: unconditionally transmit every source byte from
    /// `offset` to end-of-source. Emitted at most once, after all `Hash`
    /// records, only when the destination's post-read cursor is known.
    Rest {
        /// Offset from which the source should stream unconditionally.
        offset: u64,
    },
    /// End of stream.
    Done,
}

/// Writes a `Hash(pos, len, digest)` record.
pub fn write_hash(w: &mut impl Write, pos: u64, len: u32, digest: &Digest) -> io::Result<()> {
    w.write_all(&TAG_HASH)?;
    w.write_all(&pos.to_be_bytes())?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(digest)
}

/// Writes a `rest(offset)` record.
pub fn write_rest(w: &mut impl Write, offset: u64) -> io::Result<()> {
    w.write_all(&TAG_REST)?;
    w.write_all(&offset.to_be_bytes())
}

/// Writes the terminating `done` record.
pub fn write_done(w: &mut impl Write) -> io::Result<()> {
    w.write_all(&TAG_DONE)
}

/// Reads the next record of a hash stream.
///
/// Returns `Ok(None)` on a clean end-of-stream at a record boundary; callers
/// that expect a preceding `done` must treat that as an incomplete read
/// themselves, since this function has no notion of "stream so far".
///
/// # Errors
///
/// Returns [`BlockcopyError::IncompleteRead`] if the stream closes partway
/// through a record, and [`BlockcopyError::UnknownCommand`] for a tag
/// outside the four recognised here.
pub fn read_record(r: &mut impl std::io::Read) -> Result<Option<HashRecord>, BlockcopyError> {
    let tag = match read_tag(r)? {
        TagRead::Eof => return Ok(None),
        TagRead::Tag(tag) => tag,
    };

    match tag {
        TAG_HASH => {
            let mut pos_buf = [0u8; 8];
            read_field(r, &mut pos_buf)?;
            let mut len_buf = [0u8; 4];
            read_field(r, &mut len_buf)?;
            let mut digest = [0u8; crate::DIGEST_LEN];
            read_field(r, &mut digest)?;
            let len = u32::from_be_bytes(len_buf);
            check_block_len(len)?;
            Ok(Some(HashRecord::Hash {
                pos: u64::from_be_bytes(pos_buf),
                len,
                digest,
            }))
        }
        TAG_HASH_LEGACY => {
            let mut len_buf = [0u8; 4];
            read_field(r, &mut len_buf)?;
            let mut digest = [0u8; crate::DIGEST_LEN];
            read_field(r, &mut digest)?;
            let len = u32::from_be_bytes(len_buf);
            check_block_len(len)?;
            Ok(Some(HashRecord::HashLegacy { len, digest }))
        }
        TAG_REST => {
            let mut offset_buf = [0u8; 8];
            read_field(r, &mut offset_buf)?;
            Ok(Some(HashRecord::Rest {
                offset: u64::from_be_bytes(offset_buf),
            }))
        }
        TAG_DONE => Ok(Some(HashRecord::Done)),
        other => Err(BlockcopyError::UnknownCommand { tag: other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_of(data: &[u8]) -> Digest {
        use digest::Digest as _;
        sha3::Sha3_512::digest(data).into()
    }

    #[test]
    fn round_trips_hash_rest_done() {
        let digest = digest_of(b"------------");
        let mut buf = Vec::new();
        write_hash(&mut buf, 0, 12, &digest).unwrap();
        write_rest(&mut buf, 12).unwrap();
        write_done(&mut buf).unwrap();

        let mut cursor = buf.as_slice();
        assert_eq!(
            read_record(&mut cursor).unwrap(),
            Some(HashRecord::Hash {
                pos: 0,
                len: 12,
                digest
            })
        );
        assert_eq!(
            read_record(&mut cursor).unwrap(),
            Some(HashRecord::Rest { offset: 12 })
        );
        assert_eq!(read_record(&mut cursor).unwrap(), Some(HashRecord::Done));
        assert_eq!(read_record(&mut cursor).unwrap(), None);
    }

    #[test]
    fn accepts_legacy_position_less_form() {
        let digest = digest_of(b"abc");
        let mut buf = Vec::new();
        buf.extend_from_slice(&TAG_HASH_LEGACY);
        buf.extend_from_slice(&3u32.to_be_bytes());
        buf.extend_from_slice(&digest);

        let mut cursor = buf.as_slice();
        assert_eq!(
            read_record(&mut cursor).unwrap(),
            Some(HashRecord::HashLegacy { len: 3, digest })
        );
    }

    #[test]
    fn truncated_tag_is_incomplete_read_not_generic_io_error() {
        let mut cursor = b"Ha".as_slice();
        let err = read_record(&mut cursor).unwrap_err();
        assert!(matches!(err, BlockcopyError::IncompleteRead(_)));
    }

    #[test]
    fn truncated_field_after_valid_tag_is_incomplete_read() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&TAG_HASH);
        buf.extend_from_slice(&0u64.to_be_bytes());
        let mut cursor = buf.as_slice();
        let err = read_record(&mut cursor).unwrap_err();
        assert!(matches!(err, BlockcopyError::IncompleteRead(_)));
    }

    #[test]
    fn unrecognised_tag_is_unknown_command() {
        let mut cursor = b"XXXX".as_slice();
        let err = read_record(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            BlockcopyError::UnknownCommand { tag } if tag == *b"XXXX"
        ));
    }

    #[test]
    fn oversized_block_len_is_a_protocol_violation() {
        let digest = digest_of(b"abc");
        let mut buf = Vec::new();
        write_hash(&mut buf, 0, crate::BLOCK_SIZE + 1, &digest).unwrap();
        let mut cursor = buf.as_slice();
        let err = read_record(&mut cursor).unwrap_err();
        assert!(matches!(err, BlockcopyError::Protocol(_)));
    }

    #[test]
    fn oversized_legacy_block_len_is_a_protocol_violation() {
        let digest = digest_of(b"abc");
        let mut buf = Vec::new();
        buf.extend_from_slice(&TAG_HASH_LEGACY);
        buf.extend_from_slice(&(crate::BLOCK_SIZE + 1).to_be_bytes());
        buf.extend_from_slice(&digest);
        let mut cursor = buf.as_slice();
        let err = read_record(&mut cursor).unwrap_err();
        assert!(matches!(err, BlockcopyError::Protocol(_)));
    }
}
