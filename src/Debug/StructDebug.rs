use crate::Core::pool::RecordPool;
use crate::Core::queue::MpscQueue;
use crate::Ingestion::IngestionEngine;
use std::fmt;

/// Debug function for RecordPool
///
/// Shows sizing counters only; slots are never walked while the pool is live.
pub fn debug_record_pool(pool: &RecordPool, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RecordPool")
        .field("batch_size", &pool.batch_size())
        .field("segments", &pool.segments())
        .field("capacity", &pool.capacity())
        .field("available", &pool.available())
        .finish()
}

/// Debug function for MpscQueue
///
/// Producers may be linking nodes concurrently, so only the approximate
/// length is shown.
pub fn debug_mpsc_queue<T>(queue: &MpscQueue<T>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MpscQueue")
        .field("len", &queue.len())
        .finish_non_exhaustive()
}

/// Debug function for IngestionEngine
///
/// Shows:
/// - Endpoint and lifecycle state
/// - Per-worker reports
/// - Pool and queue counters
pub fn debug_ingestion_engine(engine: &IngestionEngine, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("IngestionEngine")
        .field("endpoint", &engine.endpoint())
        .field("state", &engine.state())
        .field("workers", &engine.worker_reports())
        .field("queued", &engine.queued())
        .field("pool", engine.pool())
        .finish()
}
