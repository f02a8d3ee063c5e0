#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `pipeline` provides the three-stage reader / hasher-pool / writer
//! coordination shared by the `checksum` and `retrieve` subcommands (§4.3,
//! §5): a bounded `block_queue` feeding a pool of worker threads, a parallel
//! `send_queue` of completion tokens that preserves reader order at the
//! writer, and a process-local error collector.
//!
//! # Design
//!
//! This crate is deliberately generic over the batch item type (`T` for
//! `block_queue`, `O` for the hasher's output) so both subcommands, whose
//! per-block work differs (compute a digest vs. compare one and maybe read
//! source bytes), can share the queue plumbing and sentinel discipline.
//!
//! The key trick (§9 "Shared completion tokens between stages") is that the
//! reader enqueues a [`Completion`] on `send_queue` at the exact moment it
//! enqueues the matching batch on `block_queue` — *before* any hasher has
//! touched it. [`completion_pair`] is built on a single-slot
//! [`crossbeam_channel`], which gives the one-shot signal-plus-result-slot
//! semantics the design calls for without a bespoke primitive.
//!
//! # Invariants
//!
//! - [`worker_count`] never exceeds 8 regardless of `CPU_COUNT`.
//! - [`queue_capacity`] is always `3 * worker_count()`, bounding peak memory
//!   to roughly `3 * N * BATCH_LIMIT * BLOCK_SIZE` per process.
//! - A [`Completion`] is waited on exactly once; a [`CompletionToken`] is
//!   fulfilled exactly once. Neither type implements `Clone`.
//! - [`ErrorCollector::collect`] never overwrites an already-recorded hard
//!   error; the *first* hard error wins.
//! - An incomplete read never sets [`ErrorCollector::has_error`]; it is
//!   tracked on a separate flag so peer workers keep running to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::Receiver;
use errors::BlockcopyError;

/// Maximum number of blocks batched together between pipeline stages (§3).
pub const BATCH_LIMIT: usize = 16;

/// A message flowing through `block_queue`: either a batch of work carrying
/// the [`CompletionToken`] the hasher must fulfil, or the per-hasher
/// shutdown sentinel.
pub enum BlockMessage<T, O> {
    /// A non-empty batch of at most [`BATCH_LIMIT`] items, in reader order,
    /// paired with the token the hasher fulfils once every item in the batch
    /// has been processed.
    Batch(Vec<T>, CompletionToken<Vec<O>>),
    /// Shutdown sentinel. Exactly `N` of these are enqueued by the reader,
    /// once per hasher.
    Sentinel,
}

/// A message flowing through `send_queue`: a completion token paired with
/// the batch it represents, or the single writer shutdown sentinel.
pub enum SendMessage<O> {
    /// The writer blocks on this token, then emits its batch's records.
    Token(Completion<Vec<O>>),
    /// Shutdown sentinel. Exactly one of these is enqueued by the reader.
    Sentinel,
}

/// The number of hasher threads to run: `min(CPU_COUNT, 8)` (§5).
#[must_use]
pub fn worker_count() -> usize {
    num_cpus::get().clamp(1, 8)
}

/// The bound applied to both `block_queue` and `send_queue`: `3 * n` (§5).
#[must_use]
pub const fn queue_capacity(n: usize) -> usize {
    3 * n
}

/// The writer side of a completion token: fulfilled exactly once by the
/// hasher that owns it.
pub struct CompletionToken<T> {
    tx: crossbeam_channel::Sender<T>,
}

impl<T> CompletionToken<T> {
    /// Fills the token's result slot and fires its signal. Consumes the
    /// token since it may only be fulfilled once.
    pub fn fulfil(self, value: T) {
        // The writer always holds the matching `Completion`, so a closed
        // channel here would mean the writer thread panicked; either way
        // there is nothing further this hasher can do about it.
        let _ = self.tx.send(value);
    }
}

/// The reader side of a completion token: waited on exactly once by the
/// writer.
pub struct Completion<T> {
    rx: crossbeam_channel::Receiver<T>,
}

impl<T> Completion<T> {
    /// Blocks until the paired [`CompletionToken`] is fulfilled, then
    /// returns its value. Returns `None` only if the hasher that owned the
    /// token was dropped without fulfilling it (a worker panic).
    pub fn wait(self) -> Option<T> {
        self.rx.recv().ok()
    }
}

/// Creates a matching [`CompletionToken`] / [`Completion`] pair sharing a
/// single-slot channel.
#[must_use]
pub fn completion_pair<T>() -> (CompletionToken<T>, Completion<T>) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (CompletionToken { tx }, Completion { rx })
}

/// Runs one hasher of the worker pool on the calling thread until it sees
/// its sentinel (§4.3 "Hashers").
///
/// `work` is applied to every item of a dequeued batch, in order, and may
/// produce zero or one output per item — `retrieve`'s hashers emit nothing
/// for a block whose digest already matches, while `checksum`'s always emit
/// exactly one. The first failure aborts the batch: the error is recorded
/// on `collector` and the batch's token is dropped unfulfilled, which
/// unblocks the writer's [`Completion::wait`] with `None` instead of
/// hanging it forever. Once `collector.has_error()` is observed, subsequent
/// batches are drained without running `work` at all (§4.4 "Drain-on-error
/// discipline").
pub fn run_hasher<T, O>(
    block_rx: &Receiver<BlockMessage<T, O>>,
    collector: &ErrorCollector,
    mut work: impl FnMut(&T) -> Result<Option<O>, BlockcopyError>,
) {
    loop {
        match block_rx.recv() {
            Ok(BlockMessage::Sentinel) | Err(_) => return,
            Ok(BlockMessage::Batch(items, token)) => {
                if collector.has_error() {
                    continue;
                }
                let mut outputs = Vec::with_capacity(items.len());
                let mut aborted = false;
                for item in &items {
                    match work(item) {
                        Ok(Some(output)) => outputs.push(output),
                        Ok(None) => {}
                        Err(err) => {
                            collector.collect(err);
                            aborted = true;
                            break;
                        }
                    }
                }
                if !aborted {
                    token.fulfil(outputs);
                }
            }
        }
    }
}

/// Runs the writer role on the calling thread until it sees its sentinel
/// (§4.3 "Writer"), emitting batch outputs in reader order.
///
/// `emit` is applied to every output item of a batch, in order. Once an
/// abandoned token ([`Completion::wait`] returning `None`, meaning the
/// hasher that owned it aborted on error) or an `emit` failure is observed,
/// remaining messages are drained without emitting anything further, so the
/// reader never blocks on a full `send_queue`.
pub fn run_writer<O>(
    send_rx: &Receiver<SendMessage<O>>,
    collector: &ErrorCollector,
    mut emit: impl FnMut(&O) -> Result<(), BlockcopyError>,
) {
    loop {
        match send_rx.recv() {
            Ok(SendMessage::Sentinel) | Err(_) => return,
            Ok(SendMessage::Token(completion)) => {
                if collector.has_error() {
                    drop(completion.wait());
                    continue;
                }
                let Some(outputs) = completion.wait() else {
                    continue;
                };
                for output in &outputs {
                    if let Err(err) = emit(output) {
                        collector.collect(err);
                        break;
                    }
                }
            }
        }
    }
}

/// Spawns `count` hasher threads, each running [`run_hasher`].
///
/// `make_work` is called once per thread, with its zero-based index, to
/// build that thread's own work closure — e.g. so `retrieve`'s hashers can
/// each open an independent handle onto the source object instead of
/// sharing one file position across threads.
pub fn spawn_hashers<T, O, F>(
    count: usize,
    block_rx: Receiver<BlockMessage<T, O>>,
    collector: Arc<ErrorCollector>,
    mut make_work: impl FnMut(usize) -> F,
) -> Vec<thread::JoinHandle<()>>
where
    T: Send + 'static,
    O: Send + 'static,
    F: FnMut(&T) -> Result<Option<O>, BlockcopyError> + Send + 'static,
{
    (0..count)
        .map(|idx| {
            let block_rx = block_rx.clone();
            let collector = Arc::clone(&collector);
            let work = make_work(idx);
            thread::spawn(move || run_hasher(&block_rx, &collector, work))
        })
        .collect()
}

/// Process-local error collector shared by the reader, hasher pool, and
/// writer (§4.4).
///
/// Holds at least the first hard error raised by any worker, plus an
/// independent "incomplete read" flag. The two are tracked separately so
/// that an incomplete upstream read lets in-flight workers finish cleanly
/// instead of poisoning the whole pipeline (§4.4, "Incomplete-read is
/// distinguished from general failure").
#[derive(Default)]
pub struct ErrorCollector {
    worker_error: Mutex<Option<BlockcopyError>>,
    incomplete_read: AtomicBool,
}

impl ErrorCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error raised by a worker.
    ///
    /// [`BlockcopyError::IncompleteRead`] only raises the dedicated flag
    /// checked by [`Self::has_incomplete_read`]; it never sets
    /// [`Self::has_error`]. Every other variant is recorded as the hard
    /// error, first one wins.
    pub fn collect(&self, err: BlockcopyError) {
        if let BlockcopyError::IncompleteRead(ref msg) = err {
            tracing::debug!(message = %msg, "incomplete read recorded");
            self.incomplete_read.store(true, Ordering::SeqCst);
            return;
        }
        let mut slot = self.worker_error.lock().expect("error collector mutex poisoned");
        if slot.is_none() {
            tracing::debug!(error = %err, "worker error recorded");
            *slot = Some(err);
        }
    }

    /// Cheap, non-blocking check for a hard (non-incomplete-read) error.
    /// Workers poll this at batch boundaries to abort promptly while still
    /// draining their input queue to the sentinel (§4.4 "Drain-on-error
    /// discipline").
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.worker_error
            .lock()
            .expect("error collector mutex poisoned")
            .is_some()
    }

    /// Whether an incomplete read was recorded, independent of
    /// [`Self::has_error`].
    #[must_use]
    pub fn has_incomplete_read(&self) -> bool {
        self.incomplete_read.load(Ordering::SeqCst)
    }

    /// Called once by the orchestrator after every worker has joined. If a
    /// hard error was recorded it takes priority and is returned; otherwise
    /// an incomplete read (if any) is surfaced as
    /// [`BlockcopyError::IncompleteRead`].
    pub fn check_and_raise(&self) -> Result<(), BlockcopyError> {
        if let Some(err) = self
            .worker_error
            .lock()
            .expect("error collector mutex poisoned")
            .take()
        {
            return Err(err);
        }
        if self.incomplete_read.load(Ordering::SeqCst) {
            return Err(BlockcopyError::IncompleteRead(
                "input stream closed before its terminating done record".into(),
            ));
        }
        Ok(())
    }
}
