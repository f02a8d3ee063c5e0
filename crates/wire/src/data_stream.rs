//! The data stream emitted by `retrieve` and consumed by `save` (§4.2).
//!
//! ```text
//! "data" pos:u64 len:u32 payload:len B   -- write payload at offset pos
//! "done"                                 -- end of stream
//! ```

use std::io::{self, Write};

use errors::BlockcopyError;

use crate::{read_field, read_payload, read_tag, TagRead};

const TAG_DATA: [u8; 4] = *b"data";
const TAG_DONE: [u8; 4] = *b"done";

/// One record of the data stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataRecord {
    /// `data(pos, len, payload)`: write `payload` at offset `pos` of the
    /// destination. `payload.len() == len as usize`.
    Data {
        /// Start offset to write at.
        pos: u64,
        /// Raw bytes to write.
        payload: Vec<u8>,
    },
    /// End of stream.
    Done,
}

/// Writes a `data(pos, len, payload)` record.
pub fn write_data(w: &mut impl Write, pos: u64, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len()).expect("payload never exceeds BLOCK_SIZE");
    w.write_all(&TAG_DATA)?;
    w.write_all(&pos.to_be_bytes())?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(payload)
}

/// Writes the terminating `done` record.
pub fn write_done(w: &mut impl Write) -> io::Result<()> {
    w.write_all(&TAG_DONE)
}

/// Reads the next record of a data stream.
///
/// Returns `Ok(None)` on a clean end-of-stream at a record boundary.
///
/// # Errors
///
/// Returns [`BlockcopyError::IncompleteRead`] if the stream closes partway
/// through a record, and [`BlockcopyError::UnknownCommand`] for any other
/// tag.
pub fn read_record(r: &mut impl std::io::Read) -> Result<Option<DataRecord>, BlockcopyError> {
    let tag = match read_tag(r)? {
        TagRead::Eof => return Ok(None),
        TagRead::Tag(tag) => tag,
    };

    match tag {
        TAG_DATA => {
            let mut pos_buf = [0u8; 8];
            read_field(r, &mut pos_buf)?;
            let mut len_buf = [0u8; 4];
            read_field(r, &mut len_buf)?;
            let len = u32::from_be_bytes(len_buf);
            let payload = read_payload(r, len)?;
            Ok(Some(DataRecord::Data {
                pos: u64::from_be_bytes(pos_buf),
                payload,
            }))
        }
        TAG_DONE => Ok(Some(DataRecord::Done)),
        other => Err(BlockcopyError::UnknownCommand { tag: other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_data_and_done() {
        let mut buf = Vec::new();
        write_data(&mut buf, 0, b"Hello World!").unwrap();
        write_done(&mut buf).unwrap();

        let mut cursor = buf.as_slice();
        assert_eq!(
            read_record(&mut cursor).unwrap(),
            Some(DataRecord::Data {
                pos: 0,
                payload: b"Hello World!".to_vec()
            })
        );
        assert_eq!(read_record(&mut cursor).unwrap(), Some(DataRecord::Done));
        assert_eq!(read_record(&mut cursor).unwrap(), None);
    }

    #[test]
    fn identical_content_produces_bare_done() {
        let mut buf = Vec::new();
        write_done(&mut buf).unwrap();
        assert_eq!(buf, b"done");
    }

    #[test]
    fn truncated_payload_is_incomplete_read() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&TAG_DATA);
        buf.extend_from_slice(&0u64.to_be_bytes());
        buf.extend_from_slice(&12u32.to_be_bytes());
        buf.extend_from_slice(b"short");
        let mut cursor = buf.as_slice();
        let err = read_record(&mut cursor).unwrap_err();
        assert!(matches!(err, BlockcopyError::IncompleteRead(_)));
    }

    #[test]
    fn unrecognised_tag_is_unknown_command() {
        let mut cursor = b"YYYY".as_slice();
        let err = read_record(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            BlockcopyError::UnknownCommand { tag } if tag == *b"YYYY"
        ));
    }

    #[test]
    fn oversized_declared_len_is_a_protocol_violation_not_an_allocation() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&TAG_DATA);
        buf.extend_from_slice(&0u64.to_be_bytes());
        buf.extend_from_slice(&(crate::BLOCK_SIZE + 1).to_be_bytes());
        let mut cursor = buf.as_slice();
        let err = read_record(&mut cursor).unwrap_err();
        assert!(matches!(err, BlockcopyError::Protocol(_)));
    }
}
