//! `blockcopy retrieve FILE` (§4.2, §4.3).
//!
//! Reads a hash stream from `hash_in`, compares each entry against the
//! local source object, and writes a data stream to `out`. Each hasher
//! thread opens its own handle onto the source so concurrent seeks never
//! race; the reader thread reads the hash stream sequentially and, for the
//! trailing `rest` directive, streams the remainder of the source itself,
//! bypassing the hasher pool entirely (§4.3 "In the rest phase, batches go
//! straight to `send_queue` with a pre-fired token").

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use checksums::strong::{Sha3_512, StrongDigest};
use crossbeam_channel::Sender;
use errors::BlockcopyError;
use pipeline::{completion_pair, BlockMessage, ErrorCollector, SendMessage};
use wire::hash_stream::HashRecord;
use wire::{data_stream, hash_stream};

use crate::io_util::read_block;

/// Parsed arguments for the `retrieve` subcommand.
pub struct RetrieveArgs {
    /// Local source file or block device. `-`/`/dev/stdin` is rejected.
    pub file: String,
}

struct ParsedHash {
    pos: u64,
    len: u32,
    digest: wire::Digest,
}

struct DataBlock {
    pos: u64,
    payload: Vec<u8>,
}

/// Runs `retrieve`: reads a hash stream from `hash_in`, writes a data
/// stream to `out`.
pub fn run<R>(args: RetrieveArgs, hash_in: R, out: &mut impl Write) -> Result<(), BlockcopyError>
where
    R: Read + Send + 'static,
{
    if args.file == "-" || args.file == "/dev/stdin" {
        return Err(BlockcopyError::Usage(
            "retrieve requires a seekable source file; '-'/'/dev/stdin' is not accepted".into(),
        ));
    }
    let source_path = args.file.clone();

    let worker_count = pipeline::worker_count();
    let mut source_handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        source_handles.push(File::open(&source_path)?);
    }

    let capacity = pipeline::queue_capacity(worker_count);
    let (block_tx, block_rx) =
        crossbeam_channel::bounded::<BlockMessage<ParsedHash, DataBlock>>(capacity);
    let (send_tx, send_rx) = crossbeam_channel::bounded::<SendMessage<DataBlock>>(capacity);
    let collector = Arc::new(ErrorCollector::new());

    let mut source_handles = source_handles.into_iter();
    let hasher_handles = pipeline::spawn_hashers(
        worker_count,
        block_rx,
        Arc::clone(&collector),
        move |_idx| {
            let mut source = source_handles
                .next()
                .expect("one source handle was opened per hasher thread");
            move |item: &ParsedHash| compare_and_maybe_read(&mut source, item)
        },
    );

    let reader_collector = Arc::clone(&collector);
    let rest_source_path = source_path.clone();
    let reader_handle = std::thread::spawn(move || {
        read_and_dispatch(
            hash_in,
            &rest_source_path,
            worker_count,
            &block_tx,
            &send_tx,
            &reader_collector,
        )
    });

    pipeline::run_writer(&send_rx, &collector, |block: &DataBlock| {
        data_stream::write_data(out, block.pos, &block.payload).map_err(BlockcopyError::Io)
    });

    reader_handle.join().expect("retrieve reader thread panicked");
    for handle in hasher_handles {
        handle.join().expect("retrieve hasher thread panicked");
    }

    let result = collector.check_and_raise();
    let _ = out.flush();
    result?;

    data_stream::write_done(out).map_err(BlockcopyError::Io)?;
    out.flush().map_err(BlockcopyError::Io)
}

/// Seeks `source` to `item.pos`, reads up to `item.len` bytes, and decides
/// whether a `data` record must be emitted (§4.2's three sub-cases).
fn compare_and_maybe_read(
    source: &mut File,
    item: &ParsedHash,
) -> Result<Option<DataBlock>, BlockcopyError> {
    source.seek(SeekFrom::Start(item.pos))?;
    let mut buf = vec![0u8; item.len as usize];
    let n = read_block(source, &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);
    if n < item.len as usize {
        return Ok(Some(DataBlock {
            pos: item.pos,
            payload: buf,
        }));
    }
    if Sha3_512::digest(&buf) == item.digest {
        Ok(None)
    } else {
        Ok(Some(DataBlock {
            pos: item.pos,
            payload: buf,
        }))
    }
}

/// Reads the hash stream sequentially, dispatching comparison batches to
/// the hasher pool and, on `rest`, streaming the remainder of the source
/// directly. Always enqueues the reader's sentinels on the way out.
fn read_and_dispatch(
    mut hash_in: impl Read,
    source_path: &str,
    worker_count: usize,
    block_tx: &Sender<BlockMessage<ParsedHash, DataBlock>>,
    send_tx: &Sender<SendMessage<DataBlock>>,
    collector: &ErrorCollector,
) {
    let mut cursor = 0u64;
    let mut batch: Vec<ParsedHash> = Vec::with_capacity(pipeline::BATCH_LIMIT);

    let outcome: Result<(), BlockcopyError> = (|| {
        loop {
            if collector.has_error() {
                break;
            }
            match hash_stream::read_record(&mut hash_in)? {
                None => {
                    if !batch.is_empty() {
                        dispatch_batch(&mut batch, block_tx, send_tx)?;
                    }
                    return Err(BlockcopyError::IncompleteRead(
                        "hash stream closed before a done record".into(),
                    ));
                }
                Some(HashRecord::Done) => break,
                Some(HashRecord::Hash { pos, len, digest }) => {
                    cursor = pos + u64::from(len);
                    batch.push(ParsedHash { pos, len, digest });
                    if batch.len() == pipeline::BATCH_LIMIT {
                        dispatch_batch(&mut batch, block_tx, send_tx)?;
                    }
                }
                Some(HashRecord::HashLegacy { len, digest }) => {
                    let pos = cursor;
                    cursor += u64::from(len);
                    batch.push(ParsedHash { pos, len, digest });
                    if batch.len() == pipeline::BATCH_LIMIT {
                        dispatch_batch(&mut batch, block_tx, send_tx)?;
                    }
                }
                Some(HashRecord::Rest { offset }) => {
                    if !batch.is_empty() {
                        dispatch_batch(&mut batch, block_tx, send_tx)?;
                    }
                    stream_rest(source_path, offset, send_tx)?;
                }
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
}

fn dispatch_batch(
    batch: &mut Vec<ParsedHash>,
    block_tx: &Sender<BlockMessage<ParsedHash, DataBlock>>,
    send_tx: &Sender<SendMessage<DataBlock>>,
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

/// Streams every remaining source byte from `offset` onward in
/// [`wire::BLOCK_SIZE`] chunks, batched by [`pipeline::BATCH_LIMIT`], each
/// sent straight to `send_queue` with an already-fulfilled token.
fn stream_rest(
    source_path: &str,
    offset: u64,
    send_tx: &Sender<SendMessage<DataBlock>>,
) -> Result<(), BlockcopyError> {
    let mut file = File::open(source_path)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut cursor = offset;
    let mut batch: Vec<DataBlock> = Vec::with_capacity(pipeline::BATCH_LIMIT);
    loop {
        let mut buf = vec![0u8; wire::BLOCK_SIZE as usize];
        let n = read_block(&mut file, &mut buf)?;
        if n == 0 {
            break;
        }
        buf.truncate(n);
        let short_read = n < wire::BLOCK_SIZE as usize;
        batch.push(DataBlock { pos: cursor, payload: buf });
        cursor += n as u64;
        if batch.len() == pipeline::BATCH_LIMIT || short_read {
            dispatch_prefired(&mut batch, send_tx)?;
        }
        if short_read {
            break;
        }
    }
    if !batch.is_empty() {
        dispatch_prefired(&mut batch, send_tx)?;
    }
    Ok(())
}

fn dispatch_prefired(
    batch: &mut Vec<DataBlock>,
    send_tx: &Sender<SendMessage<DataBlock>>,
) -> Result<(), BlockcopyError> {
    let items = std::mem::take(batch);
    let (token, completion) = completion_pair();
    token.fulfil(items);
    send_tx
        .send(SendMessage::Token(completion))
        .map_err(|_| BlockcopyError::Worker("send_queue closed unexpectedly".into()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dash_as_source() {
        let mut out = Vec::new();
        let err = run(
            RetrieveArgs { file: "-".into() },
            std::io::empty(),
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, BlockcopyError::Usage(_)));
    }

    #[test]
    fn identical_content_produces_bare_done_matching_seed_scenario_s2() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source");
        std::fs::write(&path, b"hi").unwrap();

        let mut hash_in = Vec::new();
        hash_stream::write_hash(&mut hash_in, 0, 2, &Sha3_512::digest(b"hi")).unwrap();
        hash_stream::write_rest(&mut hash_in, 2).unwrap();
        hash_stream::write_done(&mut hash_in).unwrap();

        let mut out = Vec::new();
        run(
            RetrieveArgs {
                file: path.to_string_lossy().into_owned(),
            },
            hash_in.as_slice(),
            &mut out,
        )
        .unwrap();

        assert_eq!(out, b"done");
    }

    #[test]
    fn tiny_copy_with_mismatch_matches_seed_scenario_s1() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source");
        std::fs::write(&path, b"Hello World!").unwrap();

        let mut hash_in = Vec::new();
        hash_stream::write_hash(&mut hash_in, 0, 12, &Sha3_512::digest(b"------------")).unwrap();
        hash_stream::write_rest(&mut hash_in, 12).unwrap();
        hash_stream::write_done(&mut hash_in).unwrap();

        let mut out = Vec::new();
        run(
            RetrieveArgs {
                file: path.to_string_lossy().into_owned(),
            },
            hash_in.as_slice(),
            &mut out,
        )
        .unwrap();

        let mut expected = Vec::new();
        data_stream::write_data(&mut expected, 0, b"Hello World!").unwrap();
        data_stream::write_done(&mut expected).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn truncated_hash_stream_is_incomplete_read_matching_seed_scenario_s6() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source");
        std::fs::write(&path, b"Hello World!").unwrap();

        let mut hash_in = Vec::new();
        hash_stream::write_hash(&mut hash_in, 0, 12, &Sha3_512::digest(b"------------")).unwrap();
        hash_stream::write_rest(&mut hash_in, 12).unwrap();
        // `done` deliberately omitted.

        let mut out = Vec::new();
        let err = run(
            RetrieveArgs {
                file: path.to_string_lossy().into_owned(),
            },
            hash_in.as_slice(),
            &mut out,
        )
        .unwrap_err();

        assert!(matches!(err, BlockcopyError::IncompleteRead(_)));
        let mut expected_prefix = Vec::new();
        data_stream::write_data(&mut expected_prefix, 0, b"Hello World!").unwrap();
        assert_eq!(out, expected_prefix);
    }

    #[test]
    fn mid_batch_truncation_still_flushes_pending_comparisons() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source");
        std::fs::write(&path, b"Hello World!").unwrap();

        // A single `Hash` record, well under `BATCH_LIMIT`, with no `rest`
        // or `done` to flush it: the stream just stops.
        let mut hash_in = Vec::new();
        hash_stream::write_hash(&mut hash_in, 0, 12, &Sha3_512::digest(b"------------")).unwrap();

        let mut out = Vec::new();
        let err = run(
            RetrieveArgs {
                file: path.to_string_lossy().into_owned(),
            },
            hash_in.as_slice(),
            &mut out,
        )
        .unwrap_err();

        assert!(matches!(err, BlockcopyError::IncompleteRead(_)));
        // The one pending, already-parsed `Hash` record must still have been
        // compared and its mismatch emitted downstream, even though the
        // stream never reached a batch boundary.
        let mut expected_prefix = Vec::new();
        data_stream::write_data(&mut expected_prefix, 0, b"Hello World!").unwrap();
        assert_eq!(out, expected_prefix);
    }

    #[test]
    fn destination_smaller_extends_via_rest_matching_seed_scenario_s4_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source");
        let content = "Test content.".repeat(4);
        std::fs::write(&path, content.as_bytes()).unwrap();
        let half = content.len() as u64 / 2;

        let mut hash_in = Vec::new();
        hash_stream::write_rest(&mut hash_in, half).unwrap();
        hash_stream::write_done(&mut hash_in).unwrap();

        let mut out = Vec::new();
        run(
            RetrieveArgs {
                file: path.to_string_lossy().into_owned(),
            },
            hash_in.as_slice(),
            &mut out,
        )
        .unwrap();

        let mut cursor = out.as_slice();
        let record = data_stream::read_record(&mut cursor).unwrap().unwrap();
        match record {
            data_stream::DataRecord::Data { pos, payload } => {
                assert_eq!(pos, half);
                assert_eq!(payload, content.as_bytes()[half as usize..].to_vec());
            }
            data_stream::DataRecord::Done => panic!("expected a data record before done"),
        }
        assert_eq!(data_stream::read_record(&mut cursor).unwrap(), Some(data_stream::DataRecord::Done));
    }
}
