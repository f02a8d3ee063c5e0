//! `blockcopy checksum FILE [--start N] [--end M]` (§4.1, §4.3).
//!
//! Reads the destination object sequentially, hashes each block with a pool
//! of workers, and writes a hash stream in the reader's order. The final
//! `rest`/`done` pair is written by the orchestrating thread once the
//! reader and every hasher have joined, which needs no mutex on the output
//! stream (§9 "Single mutex on the output stream held per-batch").

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use checksums::strong::{Sha3_512, StrongDigest};
use crossbeam_channel::Sender;
use errors::BlockcopyError;
use pipeline::{completion_pair, BlockMessage, ErrorCollector, SendMessage};
use wire::hash_stream;

use crate::io_util::read_block;

/// Parsed arguments for the `checksum` subcommand.
pub struct ChecksumArgs {
    /// Destination file, block device, or `-`/`/dev/stdin`.
    pub file: String,
    /// Inclusive start offset.
    pub start: u64,
    /// Exclusive end offset, or `None` for end-of-input.
    pub end: Option<u64>,
}

struct RawBlock {
    pos: u64,
    len: u32,
    bytes: Vec<u8>,
}

struct HashedBlock {
    pos: u64,
    len: u32,
    digest: wire::Digest,
}

/// A destination object opened for hashing: either a seekable file/block
/// device, or a non-seekable stream (`-`/`/dev/stdin`).
enum Source {
    Seekable(File),
    Stream(io::Stdin),
}

impl Source {
    fn open(file: &str) -> Result<Self, BlockcopyError> {
        if file == "-" || file == "/dev/stdin" {
            Ok(Self::Stream(io::stdin()))
        } else {
            Ok(Self::Seekable(File::open(file)?))
        }
    }

    fn seek_to_start(&mut self, start: u64) -> Result<(), BlockcopyError> {
        if start == 0 {
            return Ok(());
        }
        match self {
            Self::Seekable(f) => {
                f.seek(SeekFrom::Start(start))?;
                Ok(())
            }
            Self::Stream(_) => Err(BlockcopyError::Usage(
                "--start requires a seekable destination, not a stream".into(),
            )),
        }
    }

    /// The post-read cursor, or `None` if the source is not seekable (§4.3
    /// "On a non-seekable input... the reader tolerates this and omits the
    /// post-read `rest` directive").
    fn tell(&mut self) -> Option<u64> {
        match self {
            Self::Seekable(f) => f.stream_position().ok(),
            Self::Stream(_) => None,
        }
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Seekable(f) => f.read(buf),
            Self::Stream(s) => s.read(buf),
        }
    }
}

/// Runs `checksum`: writes the hash stream for `args.file` to `out`.
pub fn run(args: ChecksumArgs, out: &mut impl Write) -> Result<(), BlockcopyError> {
    let mut source = Source::open(&args.file)?;
    source.seek_to_start(args.start)?;

    let worker_count = pipeline::worker_count();
    let capacity = pipeline::queue_capacity(worker_count);
    let (block_tx, block_rx) =
        crossbeam_channel::bounded::<BlockMessage<RawBlock, HashedBlock>>(capacity);
    let (send_tx, send_rx) = crossbeam_channel::bounded::<SendMessage<HashedBlock>>(capacity);
    let collector = Arc::new(ErrorCollector::new());

    let hasher_handles = pipeline::spawn_hashers(
        worker_count,
        block_rx,
        Arc::clone(&collector),
        |_idx| {
            |block: &RawBlock| -> Result<Option<HashedBlock>, BlockcopyError> {
                let digest = Sha3_512::digest(&block.bytes);
                Ok(Some(HashedBlock {
                    pos: block.pos,
                    len: block.len,
                    digest,
                }))
            }
        },
    );

    let reader_collector = Arc::clone(&collector);
    let start = args.start;
    let end = args.end;
    let reader_handle = std::thread::spawn(move || {
        read_and_dispatch(
            source,
            start,
            end,
            worker_count,
            &block_tx,
            &send_tx,
            &reader_collector,
        )
    });

    pipeline::run_writer(&send_rx, &collector, |block: &HashedBlock| {
        hash_stream::write_hash(out, block.pos, block.len, &block.digest).map_err(BlockcopyError::Io)
    });

    let source_end_offset = reader_handle.join().expect("checksum reader thread panicked");
    for handle in hasher_handles {
        handle.join().expect("checksum hasher thread panicked");
    }

    collector.check_and_raise()?;

    if let Some(offset) = source_end_offset {
        hash_stream::write_rest(out, offset).map_err(BlockcopyError::Io)?;
    }
    hash_stream::write_done(out).map_err(BlockcopyError::Io)?;
    out.flush().map_err(BlockcopyError::Io)?;
    Ok(())
}

/// Reads blocks sequentially, batching them by [`pipeline::BATCH_LIMIT`],
/// and dispatches each batch's completion token before the batch itself
/// (§3 "Completion token"). Always enqueues the reader's sentinels on the
/// way out, even after an error, so hashers and the writer never deadlock.
fn read_and_dispatch(
    mut source: Source,
    start: u64,
    end: Option<u64>,
    worker_count: usize,
    block_tx: &Sender<BlockMessage<RawBlock, HashedBlock>>,
    send_tx: &Sender<SendMessage<HashedBlock>>,
    collector: &ErrorCollector,
) -> Option<u64> {
    let mut cursor = start;
    let mut batch: Vec<RawBlock> = Vec::with_capacity(pipeline::BATCH_LIMIT);

    let outcome: Result<(), BlockcopyError> = (|| {
        loop {
            if collector.has_error() {
                break;
            }
            let remaining = end.map(|e| e.saturating_sub(cursor));
            if remaining == Some(0) {
                break;
            }
            let want = remaining
                .map_or(wire::BLOCK_SIZE, |r| r.min(u64::from(wire::BLOCK_SIZE)) as u32)
                as usize;
            if want == 0 {
                break;
            }
            let mut buf = vec![0u8; want];
            let n = read_block(&mut source, &mut buf)?;
            if n == 0 {
                break;
            }
            buf.truncate(n);
            let block_len = n as u32;
            batch.push(RawBlock {
                pos: cursor,
                len: block_len,
                bytes: buf,
            });
            cursor += u64::from(block_len);

            let short_read = n < want;
            if batch.len() == pipeline::BATCH_LIMIT || short_read {
                dispatch_batch(&mut batch, block_tx, send_tx)?;
            }
            if short_read {
                break;
            }
        }
        if !batch.is_empty() {
            dispatch_batch(&mut batch, block_tx, send_tx)?;
        }
        Ok(())
    })();

    if let Err(err) = outcome {
        collector.collect(err);
    }

    for _ in 0..worker_count {
        let _ = block_tx.send(BlockMessage::Sentinel);
    }
    let _ = send_tx.send(SendMessage::Sentinel);

    source.tell()
}

fn dispatch_batch(
    batch: &mut Vec<RawBlock>,
    block_tx: &Sender<BlockMessage<RawBlock, HashedBlock>>,
    send_tx: &Sender<SendMessage<HashedBlock>>,
) -> Result<(), BlockcopyError> {
    let items = std::mem::take(batch);
    let (token, completion) = completion_pair();
    send_tx
        .send(SendMessage::Token(completion))
        .map_err(|_| BlockcopyError::Worker("send_queue closed unexpectedly".into()))?;
    block_tx
        .send(BlockMessage::Batch(items, token))
        .map_err(|_| BlockcopyError::Worker("block_queue closed unexpectedly".into()))?;
    Ok(())
}
