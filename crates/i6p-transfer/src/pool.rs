//! Parallel stream pool and worker fleets.
//!
//! A single stream rarely saturates a fat link; a bounded pool of streams
//! plus a small fleet of workers does. The pool opens streams lazily up to
//! `max_size` and recycles released ones. Writers and readers run as tokio
//! tasks and observe a `CancellationToken` so a caller can tear the whole
//! fleet down promptly without leaking streams or tasks.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::batch::{try_read_batch, write_batch, Batch};
use crate::chunker::Chunk;
use crate::compress::{decompress_chunk, CompressedChunk};
use crate::TransferError;

/// Default maximum number of parallel streams.
pub const DEFAULT_POOL_SIZE: usize = 8;
/// Default worker task count.
pub const DEFAULT_WORKERS: usize = 4;

/// Opens new bidirectional streams on demand. Implemented by sessions and,
/// in tests, by in-memory duplex factories.
pub trait StreamOpener: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn open_stream(&self) -> impl Future<Output = std::io::Result<Self::Stream>> + Send;
}

// ── StreamPool ────────────────────────────────────────────────────────────────

struct PoolState<S> {
    idle: VecDeque<S>,
    closed: bool,
}

/// Bounded pool of reusable streams.
///
/// `created` counts live streams. Claims happen under the state lock so
/// concurrent acquirers cannot push past `max_size`; the counter itself is
/// atomic so a drop guard can give a claim back without locking.
pub struct StreamPool<O: StreamOpener> {
    opener: O,
    max_size: usize,
    created: AtomicUsize,
    state: Mutex<PoolState<O::Stream>>,
    returned: Notify,
}

/// Holds one claimed slot of `created` while a stream open is in flight.
/// If the open fails, or the acquiring future is dropped before the open
/// resolves, dropping the guard returns the slot and wakes a waiter.
struct CreatedSlot<'a, O: StreamOpener> {
    pool: &'a StreamPool<O>,
    armed: bool,
}

impl<'a, O: StreamOpener> CreatedSlot<'a, O> {
    fn claim(pool: &'a StreamPool<O>) -> Self {
        pool.created.fetch_add(1, Ordering::Relaxed);
        Self { pool, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<O: StreamOpener> Drop for CreatedSlot<'_, O> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.created.fetch_sub(1, Ordering::Relaxed);
            self.pool.returned.notify_one();
        }
    }
}

impl<O: StreamOpener> StreamPool<O> {
    /// Zero `max_size` falls back to [`DEFAULT_POOL_SIZE`].
    pub fn new(opener: O, max_size: usize) -> Self {
        Self {
            opener,
            max_size: if max_size == 0 {
                DEFAULT_POOL_SIZE
            } else {
                max_size
            },
            created: AtomicUsize::new(0),
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                closed: false,
            }),
            returned: Notify::new(),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Gets a stream: a pooled idle one, a freshly opened one while under
    /// the cap, or waits for a release. Dropping the future is a prompt
    /// cancel and leaks nothing.
    pub async fn acquire(&self) -> Result<O::Stream, TransferError> {
        loop {
            // Arm the notification before checking state so a release
            // between the check and the await is not lost.
            let returned = self.returned.notified();
            tokio::pin!(returned);
            returned.as_mut().enable();

            let slot = {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(TransferError::PoolClosed);
                }
                if let Some(stream) = state.idle.pop_front() {
                    return Ok(stream);
                }
                if self.created.load(Ordering::Relaxed) < self.max_size {
                    Some(CreatedSlot::claim(self))
                } else {
                    None
                }
            };

            if let Some(slot) = slot {
                // The guard gives the slot back if the open errors out or
                // this future is dropped while the open is still pending.
                let stream = self.opener.open_stream().await?;
                slot.disarm();
                tracing::trace!("stream pool opened a new stream");
                return Ok(stream);
            }

            returned.as_mut().await;
        }
    }

    /// Returns a stream to the pool, or closes it when the idle set is full
    /// or the pool already closed.
    pub async fn release(&self, stream: O::Stream) {
        let to_close = {
            let mut state = self.state.lock().await;
            if state.closed || state.idle.len() >= self.max_size {
                Some(stream)
            } else {
                state.idle.push_back(stream);
                None
            }
        };
        if let Some(stream) = to_close {
            self.created.fetch_sub(1, Ordering::Relaxed);
            close_stream(stream).await;
        }
        self.returned.notify_one();
    }

    /// Idempotent. Drains and closes every pooled stream; subsequent
    /// `acquire` calls fail with `PoolClosed`.
    pub async fn close(&self) {
        let drained: Vec<O::Stream> = {
            let mut state = self.state.lock().await;
            if state.closed {
                return;
            }
            state.closed = true;
            state.idle.drain(..).collect()
        };
        tracing::debug!(drained = drained.len(), "stream pool closed");
        for stream in drained {
            close_stream(stream).await;
        }
        self.returned.notify_waiters();
    }

    /// Streams currently idle in the pool.
    pub async fn idle_count(&self) -> usize {
        self.state.lock().await.idle.len()
    }

    /// Streams created and not yet closed.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

async fn close_stream<S: AsyncWrite + Unpin>(mut stream: S) {
    let _ = stream.shutdown().await;
}

// ── ParallelWriter ────────────────────────────────────────────────────────────

/// Worker fleet sending chunks across pooled streams, one single-chunk
/// batch per write.
pub struct ParallelWriter {
    chunk_tx: mpsc::Sender<CompressedChunk>,
    err_rx: mpsc::Receiver<TransferError>,
    workers: Vec<JoinHandle<()>>,
}

impl ParallelWriter {
    /// Spawns the workers. Zero `workers` falls back to [`DEFAULT_WORKERS`].
    pub fn start<O: StreamOpener>(
        pool: Arc<StreamPool<O>>,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        let worker_count = if workers == 0 { DEFAULT_WORKERS } else { workers };
        let (chunk_tx, chunk_rx) = mpsc::channel::<CompressedChunk>(worker_count * 2);
        let (err_tx, err_rx) = mpsc::channel::<TransferError>(worker_count);
        let chunk_rx = Arc::new(Mutex::new(chunk_rx));

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let pool = Arc::clone(&pool);
            let chunk_rx = Arc::clone(&chunk_rx);
            let err_tx = err_tx.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => return,
                        chunk = async { chunk_rx.lock().await.recv().await } => chunk,
                    };
                    let Some(chunk) = next else { return };
                    if let Err(err) = send_chunk(&pool, chunk, &cancel).await {
                        // Only the first error matters; drop the rest.
                        let _ = err_tx.try_send(err);
                    }
                }
            }));
        }

        Self {
            chunk_tx,
            err_rx,
            workers: handles,
        }
    }

    /// Queues a chunk, blocking while every worker is busy. Reports the
    /// first worker error observed so far, if any.
    pub async fn send(&mut self, chunk: CompressedChunk) -> Result<(), TransferError> {
        if let Ok(err) = self.err_rx.try_recv() {
            return Err(err);
        }
        self.chunk_tx
            .send(chunk)
            .await
            .map_err(|_| TransferError::Cancelled)
    }

    /// Closes the queue, joins every worker, and surfaces the first error.
    pub async fn wait(self) -> Result<(), TransferError> {
        let Self {
            chunk_tx,
            mut err_rx,
            workers,
        } = self;
        drop(chunk_tx);
        for handle in workers {
            let _ = handle.await;
        }
        match err_rx.try_recv() {
            Ok(err) => Err(err),
            Err(_) => Ok(()),
        }
    }
}

async fn send_chunk<O: StreamOpener>(
    pool: &StreamPool<O>,
    chunk: CompressedChunk,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let mut stream = tokio::select! {
        _ = cancel.cancelled() => return Err(TransferError::Cancelled),
        acquired = pool.acquire() => acquired?,
    };
    let mut batch = Batch::new();
    batch.add(chunk);
    let result = write_batch(&mut stream, &batch).await;
    pool.release(stream).await;
    result
}

// ── ParallelReader ────────────────────────────────────────────────────────────

/// Reader fleet draining length-prefixed batches from inbound streams.
///
/// Decompressed chunks land on the result channel. A chunk that fails
/// decompression is reported on the error channel and reading continues;
/// a stream error stops that stream's reader after reporting the error.
/// Clean EOF stops the reader silently.
pub struct ParallelReader {
    result_tx: mpsc::Sender<Chunk>,
    err_tx: mpsc::Sender<TransferError>,
    readers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl ParallelReader {
    /// Returns the reader plus its result and error channels. Zero `buffer`
    /// falls back to twice the default worker count.
    pub fn new(
        buffer: usize,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<Chunk>, mpsc::Receiver<TransferError>) {
        let buffer = if buffer == 0 {
            DEFAULT_WORKERS * 2
        } else {
            buffer
        };
        let (result_tx, result_rx) = mpsc::channel(buffer);
        let (err_tx, err_rx) = mpsc::channel(DEFAULT_WORKERS);
        (
            Self {
                result_tx,
                err_tx,
                readers: Vec::new(),
                cancel,
            },
            result_rx,
            err_rx,
        )
    }

    /// Spawns a task draining one stream until EOF, error, or cancellation.
    pub fn start_reader<S>(&mut self, stream: S)
    where
        S: AsyncRead + Unpin + Send + 'static,
    {
        let result_tx = self.result_tx.clone();
        let err_tx = self.err_tx.clone();
        let cancel = self.cancel.clone();
        self.readers.push(tokio::spawn(async move {
            let mut stream = stream;
            loop {
                let batch = tokio::select! {
                    _ = cancel.cancelled() => return,
                    read = try_read_batch(&mut stream) => match read {
                        Ok(Some(batch)) => batch,
                        Ok(None) => return,
                        Err(err) => {
                            let _ = err_tx.try_send(err);
                            return;
                        }
                    },
                };
                for cc in &batch.chunks {
                    match decompress_chunk(cc) {
                        Ok(chunk) => {
                            tokio::select! {
                                _ = cancel.cancelled() => return,
                                sent = result_tx.send(chunk) => {
                                    if sent.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                        // Local recovery: report and keep draining.
                        Err(err) => {
                            let _ = err_tx.try_send(err);
                        }
                    }
                }
            }
        }));
    }

    /// Joins every reader. The result channel closes once the last reader
    /// and this handle have dropped their senders.
    pub async fn wait(self) {
        let Self {
            result_tx,
            err_tx,
            readers,
            ..
        } = self;
        drop(result_tx);
        drop(err_tx);
        for handle in readers {
            let _ = handle.await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
