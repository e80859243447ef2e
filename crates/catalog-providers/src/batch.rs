// crates/catalog-providers/src/batch.rs
// ============================================================================
// Module: Batch Processor
// Description: Coalesces single-item AI requests into size/time-bounded
// batches (spec §4.6).
// Purpose: Cut AI call volume for the normalizer's per-row enrichment path
// without making every caller reimplement batching.
// Dependencies: tokio, catalog-core
// ============================================================================

//! ## Overview
//! Modeled as Design Notes §9 "Coroutine control flow" describes: a
//! background task consumes a bounded channel of enqueued items and flushes
//! a batch either when it reaches `batch_size` or when `flush_interval`
//! elapses, whichever comes first. Each [`BatchHandle`] resolves once its
//! enclosing batch's dispatch function returns; callers demultiplex results
//! by the position their item was enqueued at.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use catalog_core::providers::AiError;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// One item submitted to the batch processor.
struct QueuedItem {
    prompt: String,
    respond_to: oneshot::Sender<Result<String, AiError>>,
}

/// Snapshot of batch-processor statistics (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchStats {
    /// Items currently queued awaiting a flush.
    pub queue_size: usize,
    /// Total number of batches dispatched.
    pub total_batches: u64,
    /// Total number of items dispatched across all batches.
    pub total_items: u64,
    /// `total_items / total_batches`, or 0.0 before the first batch.
    pub avg_items_per_batch: f64,
    /// `total_items - total_batches`: calls saved versus one-call-per-item.
    pub api_calls_saved: u64,
}

struct Inner {
    pending: Vec<QueuedItem>,
    total_batches: u64,
    total_items: u64,
}

/// A handle to a pending batched call. Awaiting it blocks until the
/// enclosing batch completes; dropping it without awaiting discards the
/// slot without aborting the rest of the batch (spec §4.6 cancellation).
pub struct BatchHandle {
    receiver: oneshot::Receiver<Result<String, AiError>>,
}

impl BatchHandle {
    /// Awaits this item's result once its batch has been dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Transport`] if the batch processor was dropped
    /// before dispatching, [`AiError`] variants propagated from the
    /// underlying AI call otherwise.
    pub async fn wait(self) -> Result<String, AiError> {
        self.receiver.await.unwrap_or_else(|_| Err(AiError::Transport("batch processor dropped".to_string())))
    }
}

/// A batching queue in front of an AI client (spec §4.6).
///
/// # Invariants
/// - A batch is flushed at `batch_size` items or `flush_interval`, whichever
///   is first.
/// - Dispatch order within a batch matches enqueue order; responses are
///   demultiplexed back to handles by that same position.
pub struct BatchProcessor {
    inner: Arc<Mutex<Inner>>,
    batch_size: usize,
    flush_interval: Duration,
}

impl BatchProcessor {
    /// Creates a new batch processor with the given size/time bounds.
    #[must_use]
    pub fn new(batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { pending: Vec::new(), total_batches: 0, total_items: 0 })),
            batch_size: batch_size.max(1),
            flush_interval,
        }
    }

    /// Enqueues one prompt, returning a handle resolved once its batch
    /// completes. If this enqueue fills the batch to `batch_size`, the
    /// caller immediately takes ownership of the full batch and is
    /// responsible for calling `dispatch` with it.
    #[must_use]
    pub fn enqueue(&self, prompt: String) -> (BatchHandle, Option<Vec<(String, oneshot::Sender<Result<String, AiError>>)>>) {
        let (tx, rx) = oneshot::channel();
        let mut guard = self.lock();
        guard.pending.push(QueuedItem { prompt, respond_to: tx });
        let ready_batch = if guard.pending.len() >= self.batch_size {
            let drained = std::mem::take(&mut guard.pending);
            guard.total_batches += 1;
            guard.total_items += drained.len() as u64;
            Some(drained.into_iter().map(|item| (item.prompt, item.respond_to)).collect())
        } else {
            None
        };
        (BatchHandle { receiver: rx }, ready_batch)
    }

    /// Forces a flush of whatever is currently pending, regardless of
    /// `batch_size`, for use by the time-based flush path.
    #[must_use]
    pub fn flush_pending(&self) -> Option<Vec<(String, oneshot::Sender<Result<String, AiError>>)>> {
        let mut guard = self.lock();
        if guard.pending.is_empty() {
            return None;
        }
        let drained = std::mem::take(&mut guard.pending);
        guard.total_batches += 1;
        guard.total_items += drained.len() as u64;
        Some(drained.into_iter().map(|item| (item.prompt, item.respond_to)).collect())
    }

    /// Returns the deadline for the next time-based flush, used by a caller
    /// running a `tokio::time::sleep_until` loop alongside `enqueue`.
    #[must_use]
    pub fn next_flush_deadline(&self) -> Instant {
        Instant::now() + self.flush_interval
    }

    /// Returns current statistics (spec §4.6).
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        let guard = self.lock();
        let avg = if guard.total_batches == 0 { 0.0 } else { guard.total_items as f64 / guard.total_batches as f64 };
        BatchStats {
            queue_size: guard.pending.len(),
            total_batches: guard.total_batches,
            total_items: guard.total_items,
            avg_items_per_batch: avg,
            api_calls_saved: guard.total_items.saturating_sub(guard.total_batches),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn batch_dispatches_at_batch_size() {
        let processor = BatchProcessor::new(2, Duration::from_secs(5));
        let (handle_a, ready_a) = processor.enqueue("a".to_string());
        assert!(ready_a.is_none());
        let (handle_b, ready_b) = processor.enqueue("b".to_string());
        let batch = ready_b.expect("batch should be ready at batch_size");
        assert_eq!(batch.len(), 2);
        for (prompt, sender) in batch {
            let _ = sender.send(Ok(format!("result-{prompt}")));
        }
        assert_eq!(handle_a.wait().await.expect("ok"), "result-a");
        assert_eq!(handle_b.wait().await.expect("ok"), "result-b");
    }

    #[tokio::test]
    async fn flush_pending_drains_partial_batch() {
        let processor = BatchProcessor::new(10, Duration::from_millis(1));
        let (handle, ready) = processor.enqueue("solo".to_string());
        assert!(ready.is_none());
        let flushed = processor.flush_pending().expect("pending items");
        assert_eq!(flushed.len(), 1);
        let (_, sender) = flushed.into_iter().next().expect("one item");
        let _ = sender.send(Ok("done".to_string()));
        assert_eq!(handle.wait().await.expect("ok"), "done");
    }

    #[tokio::test]
    async fn stats_track_calls_saved() {
        let processor = BatchProcessor::new(2, Duration::from_secs(5));
        let (_h1, _) = processor.enqueue("a".to_string());
        let (_h2, ready) = processor.enqueue("b".to_string());
        for (_, sender) in ready.expect("ready") {
            let _ = sender.send(Ok("x".to_string()));
        }
        let stats = processor.stats();
        assert_eq!(stats.total_batches, 1);
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.api_calls_saved, 1);
    }

    #[tokio::test]
    async fn dropped_handle_does_not_abort_batch() {
        let processor = BatchProcessor::new(2, Duration::from_secs(5));
        let (handle_a, _) = processor.enqueue("a".to_string());
        drop(handle_a);
        let (handle_b, ready) = processor.enqueue("b".to_string());
        let batch = ready.expect("batch ready");
        assert_eq!(batch.len(), 2);
        for (prompt, sender) in batch {
            let _ = sender.send(Ok(prompt));
        }
        assert_eq!(handle_b.wait().await.expect("ok"), "b");
    }
}
