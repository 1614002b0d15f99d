//! Generic accumulate/flush batch writer. `TradeWriter`, `OrderbookDeltaWriter`,
//! `OrderbookSnapshotWriter`, and `TickerWriter` below are thin bindings of
//! this state machine to one row type and the matching `Store` method.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::bounded_channel;
use crate::config::WriterConfig;
use crate::connection::backoff::ReconnectPolicy;
use crate::errors::StoreError;

/// Retry pacing for a failed batch insert. Not separately configurable: the
/// spec only calls for "exponential backoff" on write failure, not distinct
/// tuning knobs from the connection reconnect policy.
const RETRY_BASE: Duration = Duration::from_millis(100);
const RETRY_MAX: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
pub struct WriterStats {
    pub inserts: AtomicU64,
    pub errors: AtomicU64,
    pub batches: AtomicU64,
    pub drops: AtomicU64,
}

impl WriterStats {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.inserts.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
            self.batches.load(Ordering::Relaxed),
            self.drops.load(Ordering::Relaxed),
        )
    }
}

type InsertFn<T> = Box<dyn Fn(Vec<T>) -> BoxFuture<'static, Result<(), StoreError>> + Send + Sync>;

pub struct BatchWriter<T> {
    name: &'static str,
    config: WriterConfig,
    receiver: bounded_channel::Receiver<T>,
    insert: InsertFn<T>,
    stats: Arc<WriterStats>,
}

impl<T: Clone + Send + 'static> BatchWriter<T> {
    pub fn new(name: &'static str, config: WriterConfig, receiver: bounded_channel::Receiver<T>, insert: InsertFn<T>) -> Self {
        Self {
            name,
            config,
            receiver,
            insert,
            stats: Arc::new(WriterStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<WriterStats> {
        self.stats.clone()
    }

    /// Run the accumulate/flush loop until `token` is cancelled or the
    /// input channel closes, flushing whatever's buffered one last time
    /// before returning either way.
    pub async fn run(mut self, token: CancellationToken) {
        let mut buffer: Vec<T> = Vec::with_capacity(self.config.max_batch_size);
        let mut flush_timer = tokio::time::interval(self.config.max_batch_delay);
        flush_timer.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    self.flush(std::mem::take(&mut buffer)).await;
                    return;
                }
                _ = flush_timer.tick() => {
                    self.flush(std::mem::take(&mut buffer)).await;
                }
                row = self.receiver.recv() => {
                    match row {
                        None => {
                            self.flush(std::mem::take(&mut buffer)).await;
                            return;
                        }
                        Some(row) => {
                            buffer.push(row);
                            if buffer.len() >= self.config.max_batch_size {
                                self.flush(std::mem::take(&mut buffer)).await;
                            }
                        }
                    }
                }
            }
        }
    }

    async fn flush(&self, rows: Vec<T>) {
        if rows.is_empty() {
            return;
        }
        let count = rows.len();
        let policy = ReconnectPolicy::new(RETRY_BASE, RETRY_MAX, 2.0);

        let mut attempt = 0u32;
        loop {
            match (self.insert)(rows.clone()).await {
                Ok(()) => {
                    self.stats.inserts.fetch_add(count as u64, Ordering::Relaxed);
                    self.stats.batches.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) if attempt >= self.config.max_retries => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    self.stats.drops.fetch_add(count as u64, Ordering::Relaxed);
                    error!(writer = self.name, error = %e, attempt, rows = count, "dropping batch after exhausting retries");
                    return;
                }
                Err(e) => {
                    warn!(writer = self.name, error = %e, attempt, rows = count, "batch insert failed, retrying");
                    tokio::time::sleep(policy.next_delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::bounded_channel::OverflowPolicy;

    use super::*;

    fn writer_config() -> WriterConfig {
        WriterConfig {
            max_batch_size: 3,
            max_batch_delay: Duration::from_millis(50),
            input_channel_capacity: 16,
            max_retries: 2,
        }
    }

    #[tokio::test]
    async fn test_flushes_on_batch_size() {
        let (tx, rx) = bounded_channel::bounded(16, OverflowPolicy::DropOldest);
        let flushed: Arc<Mutex<Vec<Vec<i32>>>> = Arc::new(Mutex::new(Vec::new()));
        let flushed_for_closure = flushed.clone();

        let writer = BatchWriter::new(
            "test",
            writer_config(),
            rx,
            Box::new(move |rows: Vec<i32>| {
                let flushed = flushed_for_closure.clone();
                Box::pin(async move {
                    flushed.lock().unwrap().push(rows);
                    Ok(())
                }) as BoxFuture<'static, Result<(), StoreError>>
            }),
        );
        let stats = writer.stats();
        let token = CancellationToken::new();
        let handle = tokio::spawn(writer.run(token.clone()));

        tx.send(1).await;
        tx.send(2).await;
        tx.send(3).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        token.cancel();
        handle.await.unwrap();

        assert_eq!(flushed.lock().unwrap().as_slice(), &[vec![1, 2, 3]]);
        assert_eq!(stats.snapshot(), (3, 0, 1, 0));
    }

    #[tokio::test]
    async fn test_drops_batch_after_exhausting_retries() {
        let (tx, rx) = bounded_channel::bounded(16, OverflowPolicy::DropOldest);
        let writer = BatchWriter::new(
            "test",
            writer_config(),
            rx,
            Box::new(|_rows: Vec<i32>| {
                Box::pin(async move { Err(StoreError::Other("nope".to_string())) }) as BoxFuture<'static, Result<(), StoreError>>
            }),
        );
        let stats = writer.stats();
        let token = CancellationToken::new();
        let handle = tokio::spawn(writer.run(token.clone()));

        tx.send(1).await;
        tx.send(2).await;
        tx.send(3).await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        token.cancel();
        handle.await.unwrap();

        let (inserts, errors, batches, drops) = stats.snapshot();
        assert_eq!(inserts, 0);
        assert_eq!(errors, 1);
        assert_eq!(batches, 0);
        assert_eq!(drops, 3);
    }
}
