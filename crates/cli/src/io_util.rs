//! Small I/O helpers shared by the three subcommands.

use std::io::{self, Read};

use errors::BlockcopyError;
use is_terminal::IsTerminal;

/// Returns a [`BlockcopyError::Usage`] if `stream` is attached to a
/// terminal (§6 "Refuse-to-corrupt rule").
pub fn refuse_tty(stream: &impl IsTerminal, subcommand: &str) -> Result<(), BlockcopyError> {
    if stream.is_terminal() {
        return Err(BlockcopyError::Usage(format!(
            "refusing to write binary {subcommand} output to a terminal"
        )));
    }
    Ok(())
}

/// Fills `buf` by repeated reads, stopping early only at end-of-source.
/// Short reads that are not EOF (a pipe delivering fewer bytes than asked
/// for) are retried transparently. Returns the number of bytes actually
/// read, which is less than `buf.len()` only at end-of-source.
pub fn read_block(source: &mut impl Read, buf: &mut [u8]) -> Result<usize, BlockcopyError> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(BlockcopyError::Io(e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_block_retries_short_reads_until_buffer_full() {
        struct OneByteAtATime(Vec<u8>);
        impl Read for OneByteAtATime {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0.remove(0);
                Ok(1)
            }
        }

        let mut source = OneByteAtATime(b"hello".to_vec());
        let mut buf = [0u8; 5];
        let n = read_block(&mut source, &mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_block_reports_short_count_at_eof() {
        let mut source = b"hi".as_slice();
        let mut buf = [0u8; 5];
        let n = read_block(&mut source, &mut buf).unwrap();
        assert_eq!(n, 2);
    }
}
