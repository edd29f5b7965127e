use crate::Core::futex::{futex_wait, futex_wake};
use crate::Core::pool::PooledRecord;
use crate::Core::queue::MpscQueue;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU32, Ordering::SeqCst};
use std::time::{Duration, Instant};

/// The queue shared by all workers and the consumer, plus a wake-up word
/// for a consumer parked in [`RecordChannel::recv_timeout`].
#[derive(Debug, Default)]
pub struct RecordChannel {
    queue: MpscQueue<PooledRecord>,
    /// Bumped after every published batch.
    signal: CachePadded<AtomicU32>,
    /// Consumers currently parked on `signal`; wakes are skipped while zero.
    waiters: CachePadded<AtomicU32>,
}

impl RecordChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `records` as one contiguous run and wake a parked consumer.
    pub fn publish<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = PooledRecord>,
    {
        let count = self.queue.enqueue_batch(records);
        if count > 0 {
            self.signal.fetch_add(1, SeqCst);
            if self.waiters.load(SeqCst) > 0 {
                futex_wake(&self.signal);
            }
        }
        count
    }

    /// Non-blocking pull.
    #[inline]
    pub fn try_recv(&self) -> Option<PooledRecord> {
        self.queue.dequeue()
    }

    /// Pull a record, waiting up to `timeout` for one to be published.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<PooledRecord> {
        if let Some(record) = self.queue.dequeue() {
            return Some(record);
        }

        let deadline = Instant::now() + timeout;
        loop {
            self.waiters.fetch_add(1, SeqCst);
            let seen = self.signal.load(SeqCst);
            // Re-check after announcing ourselves so a publish between the
            // first dequeue and the park cannot be missed.
            if let Some(record) = self.queue.dequeue() {
                self.waiters.fetch_sub(1, SeqCst);
                return Some(record);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.waiters.fetch_sub(1, SeqCst);
                return None;
            }
            futex_wait(&self.signal, seen, Some(remaining));
            self.waiters.fetch_sub(1, SeqCst);

            if let Some(record) = self.queue.dequeue() {
                return Some(record);
            }
        }
    }

    /// Approximate number of queued records.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn queue(&self) -> &MpscQueue<PooledRecord> {
        &self.queue
    }
}
