use crate::handler::{Handler, HandlerError};
use crate::record::{Level, Record};
use async_trait::async_trait;
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

/// Asynchronous destination for finalized [`Record`]s.
///
/// Implementations move batches to wherever the bytes should end up (a
/// file, an aggregator-agnostic writer, a test collector). `send` is called
/// from the background task that owns the batching loop, never from the
/// application thread.
#[async_trait]
pub trait AsyncSink: Send + Sync {
    /// Send a single record to the underlying destination.
    async fn send(&self, record: &Record) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any internal buffering. Default is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

/// A sink that drops every record. Useful for measuring the overhead of
/// the pipeline itself and for tests that don't care about persistence.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl AsyncSink for NoopSink {
    async fn send(&self, _record: &Record) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

/// Handler that decouples formatting/transport from the caller's thread.
///
/// `handle` clones the finalized record into a bounded channel and returns
/// immediately; a background task batches records and forwards them to an
/// [`AsyncSink`], retrying transient failures with exponential backoff.
/// When the channel is full the record is counted and dropped rather than
/// blocking the log call.
pub struct AsyncHandler {
    sender: mpsc::Sender<Record>,
    min_level: Level,
    /// Records offered to the handler (before the level gate is applied by
    /// the logger, after it when used directly).
    pub total_records: Arc<AtomicU64>,
    /// Successfully picked up by the background task.
    pub enqueued_records: Arc<AtomicU64>,
    /// Dropped because the channel was full or the sink gave up.
    pub dropped_records: Arc<AtomicU64>,
}

/// Batches that still fail after this many backoff rounds are dropped, so
/// one poisoned record cannot wedge the pipeline.
const MAX_SEND_ATTEMPTS: u32 = 3;

impl AsyncHandler {
    /// Spawn the background pipeline. Minimal thresholds are enforced for
    /// `buffer`, `batch_size` and `flush_interval` to avoid degenerate
    /// configurations. The returned [`JoinHandle`] completes once every
    /// sender clone is dropped and the final batch is flushed.
    pub fn new(
        sink: Arc<dyn AsyncSink>,
        buffer: usize,
        batch_size: usize,
        flush_interval: Duration,
    ) -> (Self, JoinHandle<()>) {
        let buffer = buffer.max(16);
        let batch_size = batch_size.max(1);
        let flush_interval = flush_interval.max(Duration::from_millis(10));

        let (tx, mut rx) = mpsc::channel::<Record>(buffer);

        let total_records = Arc::new(AtomicU64::new(0));
        let enqueued_records = Arc::new(AtomicU64::new(0));
        let dropped_records = Arc::new(AtomicU64::new(0));

        let enqueued_bg = Arc::clone(&enqueued_records);
        let dropped_bg = Arc::clone(&dropped_records);

        let handle = tokio::spawn(async move {
            let mut batch: Vec<Record> = Vec::with_capacity(batch_size);
            let backoff = Duration::from_millis(100);
            let max_backoff = Duration::from_secs(10);

            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(record) => {
                            batch.push(record);
                            enqueued_bg.fetch_add(1, Ordering::Relaxed);
                            if batch.len() >= batch_size {
                                send_batch(&*sink, &mut batch, backoff, max_backoff, &dropped_bg).await;
                            }
                        }
                        None => {
                            send_batch(&*sink, &mut batch, backoff, max_backoff, &dropped_bg).await;
                            if let Err(err) = sink.flush().await {
                                eprintln!("flatlog: sink flush failed on shutdown: {err}");
                            }
                            return;
                        }
                    },
                    _ = sleep(flush_interval) => {
                        send_batch(&*sink, &mut batch, backoff, max_backoff, &dropped_bg).await;
                    }
                }
            }
        });

        (
            Self {
                sender: tx,
                min_level: Level::Trace,
                total_records,
                enqueued_records,
                dropped_records,
            },
            handle,
        )
    }

    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }
}

async fn send_batch(
    sink: &dyn AsyncSink,
    batch: &mut Vec<Record>,
    mut backoff: Duration,
    max_backoff: Duration,
    dropped: &AtomicU64,
) {
    if batch.is_empty() {
        return;
    }

    for attempt in 1..=MAX_SEND_ATTEMPTS {
        let mut last_err: Option<Box<dyn Error + Send + Sync>> = None;
        for record in batch.iter() {
            if let Err(err) = sink.send(record).await {
                last_err = Some(err);
                break;
            }
        }

        match last_err {
            None => {
                batch.clear();
                return;
            }
            Some(err) if attempt == MAX_SEND_ATTEMPTS => {
                eprintln!(
                    "flatlog: dropping batch of {} records after {attempt} attempts: {err}",
                    batch.len()
                );
                dropped.fetch_add(batch.len() as u64, Ordering::Relaxed);
                batch.clear();
                return;
            }
            Some(err) => {
                eprintln!("flatlog: sink send failed, retrying in {backoff:?}: {err}");
                sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, max_backoff);
            }
        }
    }
}

impl Handler for AsyncHandler {
    fn handle(&self, record: &Record) -> Result<(), HandlerError> {
        self.total_records.fetch_add(1, Ordering::Relaxed);
        match self.sender.try_send(record.clone()) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.dropped_records.fetch_add(1, Ordering::Relaxed);
                Err(HandlerError::ChannelFull)
            }
        }
    }

    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }
}
