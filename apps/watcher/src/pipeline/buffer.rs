//! Hand-off queue between probers (producers) and collectors (consumers).
//!
//! Samples from one prober come out in the order they were published.
//! There is no ordering across endpoints.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use flume::{Receiver, Sender};
use tracing::warn;

use crate::monitoring::Sample;

/// Default length step between two "buffer is growing" warnings
pub const DEFAULT_WARN_STEP: usize = 10_000;

struct Watermark {
    step: usize,
    level: AtomicUsize,
}

/// Cloneable handle to a shared sample channel.
///
/// Unbounded by default. With a capacity, [`SampleBuffer::publish`] waits for
/// room instead of dropping.
#[derive(Clone)]
pub struct SampleBuffer {
    sender: Sender<Sample>,
    receiver: Receiver<Sample>,
    watermark: Arc<Watermark>,
}

impl SampleBuffer {
    pub fn new(capacity: Option<usize>) -> Self {
        Self::with_warn_step(capacity, DEFAULT_WARN_STEP)
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::new(Some(capacity))
    }

    pub fn with_warn_step(capacity: Option<usize>, warn_step: usize) -> Self {
        let (sender, receiver) = match capacity {
            Some(capacity) => flume::bounded(capacity.max(1)),
            None => flume::unbounded(),
        };

        Self {
            sender,
            receiver,
            watermark: Arc::new(Watermark { step: warn_step.max(1), level: AtomicUsize::new(0) }),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.sender.capacity()
    }

    pub fn warn_step(&self) -> usize {
        self.watermark.step
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Append a sample, waiting for room when the buffer is bounded and full
    pub async fn publish(&self, sample: Sample) {
        // Every handle owns a receiver, so the channel stays open.
        if let Err(error) = self.sender.send_async(sample).await {
            warn!(%error, "sample buffer closed, sample lost");
            return;
        }
        self.note_length(self.sender.len());
    }

    /// Take up to `max` samples from the front without waiting
    pub fn pop_batch(&self, max: usize) -> Vec<Sample> {
        let batch: Vec<Sample> = self.receiver.try_iter().take(max).collect();

        if !batch.is_empty() {
            let remaining = self.receiver.len();
            self.watermark.level.store(remaining / self.watermark.step, Ordering::Relaxed);
        }
        batch
    }

    /// Log once per newly crossed multiple of the warn step
    fn note_length(&self, len: usize) -> bool {
        let level = len / self.watermark.step;
        if level == 0 {
            return false;
        }
        let previous = self.watermark.level.fetch_max(level, Ordering::Relaxed);
        if level > previous {
            warn!(
                buffered = len,
                "sample buffer keeps growing, collectors are falling behind the probers"
            );
            return true;
        }
        false
    }
}
